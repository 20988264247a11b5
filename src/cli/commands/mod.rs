//! Command implementations for booking-outbox.
//!
//! Each command takes the initialised [`Outbox`](crate::engine::Outbox) and
//! returns the text to print.

mod draft;
mod queue;

pub use draft::draft;
pub use queue::{discard, enqueue, list, prune, retry, show, status, submit, sync};

use async_trait::async_trait;
use serde_json::Value;

use crate::cli::args::Commands;
use crate::error::OutboxError;
use crate::remote::ConnectivityProbe;

/// Whether a command talks to the booking service and needs a live
/// connectivity probe.
#[must_use]
pub const fn needs_network(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Submit(_) | Commands::Sync | Commands::Status
    )
}

/// Probe for commands that only touch local state.
pub struct LocalOnly;

#[async_trait]
impl ConnectivityProbe for LocalOnly {
    async fn is_reachable(&self) -> bool {
        false
    }
}

/// Parse a JSON argument, reading it from a file when it starts with `@`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the text is not JSON.
pub fn read_json_arg(arg: &str) -> Result<Value, OutboxError> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => arg.to_string(),
    };

    serde_json::from_str(&text).map_err(|e| OutboxError::Parse(format!("Invalid JSON: {e}")))
}
