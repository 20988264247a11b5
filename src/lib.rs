//! booking-outbox - offline writes for a logistics booking client
//!
//! Business writes made while the booking service is unreachable are
//! persisted in a local `SQLite` outbox and replayed in order, once each,
//! when connectivity returns. The UI reads a projection of the queue that
//! shows provisional results until the service confirms them.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod features;
pub mod logging;
pub mod output;
pub mod remote;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use engine::{Outbox, SubmitOutcome};
pub use error::OutboxError;
