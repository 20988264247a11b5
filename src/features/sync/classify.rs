//! Retryable versus terminal failure classification.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::remote::RemoteError;

/// Messages that point at the transport rather than the request.
static NETWORK_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(timed? ?out|timeout|network|failed to fetch|connection (refused|reset|closed|aborted)|dns|unreachable|offline|socket hang ?up)\b",
    )
    .unwrap_or_else(|e| panic!("Invalid network signature regex: {e}"))
});

/// What to do with a failed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient: keep the operation and try again later.
    Retryable,
    /// Permanent: the request itself was refused.
    Terminal,
}

impl ErrorClass {
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Retryable)
    }
}

/// Classify a remote failure.
///
/// Anything that fails while the device is offline is retryable, whatever
/// the error says. Uncategorised errors are retryable only when their
/// message looks like a transport failure.
#[must_use]
pub fn classify(error: &RemoteError, online: bool) -> ErrorClass {
    if !online {
        return ErrorClass::Retryable;
    }

    match error {
        RemoteError::Network(_) | RemoteError::Timeout(_) | RemoteError::Server { .. } => {
            ErrorClass::Retryable
        },
        RemoteError::Validation(_) | RemoteError::Business(_) => ErrorClass::Terminal,
        RemoteError::Other(message) if NETWORK_SIGNATURE.is_match(message) => {
            ErrorClass::Retryable
        },
        RemoteError::Other(_) => ErrorClass::Terminal,
    }
}
