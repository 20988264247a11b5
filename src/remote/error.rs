//! Errors returned by the remote write API.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single remote write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Transport or connectivity failure before a response arrived.
    #[error("Network error: {0}")]
    Network(String),

    /// No response within the request timeout.
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// The service answered with a 5xx or 429.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The service rejected the payload's shape or values.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The service refused the write for a domain reason.
    #[error("Rejected: {0}")]
    Business(String),

    /// Anything the adapter could not place in a category.
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// The reason to surface to the user, without the category prefix.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Network(message)
            | Self::Validation(message)
            | Self::Business(message)
            | Self::Other(message)
            | Self::Server { message, .. } => message.clone(),
            Self::Timeout(after) => format!("no response after {after:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strips_category() {
        let err = RemoteError::Validation("pickup date is in the past".to_string());
        assert_eq!(err.reason(), "pickup date is in the past");
        assert_eq!(err.to_string(), "Validation failed: pickup date is in the past");
    }

    #[test]
    fn test_server_error_display() {
        let err = RemoteError::Server {
            status: 503,
            message: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "Server error (503): maintenance");
    }
}
