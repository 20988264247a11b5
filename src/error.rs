//! Error types for booking-outbox.

use thiserror::Error;

use crate::remote::RemoteError;

/// Errors raised by the outbox engine and its collaborators.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// Queue or draft storage could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration could not be loaded, saved or resolved.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested operation or draft does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation has been dispatched and must resolve before it can change.
    #[error("Operation {0} is in flight and cannot be changed")]
    InFlight(String),

    /// The requested transition is not valid from the current status.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A payload or stored record could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The remote service rejected a direct write.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for OutboxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<rusqlite::Error> for OutboxError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_errors_become_parse_errors() {
        let err: OutboxError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, OutboxError::Parse(_)));
    }

    #[test]
    fn test_in_flight_message_names_operation() {
        let err = OutboxError::InFlight("abc".to_string());
        assert_eq!(
            err.to_string(),
            "Operation abc is in flight and cannot be changed"
        );
    }
}
