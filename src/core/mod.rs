//! Shared utilities used across features.

mod age;
mod scheduled;

pub use age::format_age;
pub use scheduled::ScheduledTask;
