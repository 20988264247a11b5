//! Connectivity monitoring.

mod monitor;

pub use monitor::{NetworkMonitor, DEFAULT_DEBOUNCE};
