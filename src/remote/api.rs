//! Seams to the remote booking service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::RemoteError;
use crate::features::sync::OperationType;

/// Authoritative result of a confirmed write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteReceipt {
    /// Server-issued identifier shown to the user (e.g. a receipt number).
    pub reference: String,
    /// Full response body, which supersedes the optimistic snapshot.
    pub body: Value,
}

impl RemoteReceipt {
    /// Build a receipt from a response body, picking the first identifier
    /// field the service provides.
    #[must_use]
    pub fn from_body(body: Value) -> Option<Self> {
        let reference = ["receipt_number", "receiptNumber", "reference", "id"]
            .iter()
            .find_map(|key| match body.get(*key)? {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })?;

        Some(Self { reference, body })
    }
}

/// One endpoint per operation type; the idempotency key is the operation id
/// so a replayed request can be recognised by the service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteWriteApi: Send + Sync {
    /// Submit a single business write.
    async fn submit(
        &self,
        operation_type: OperationType,
        payload: &Value,
        idempotency_key: &str,
    ) -> Result<RemoteReceipt, RemoteError>;
}

/// Platform connectivity signal used to seed the network monitor.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Whether the remote service can currently be reached.
    async fn is_reachable(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_receipt_prefers_receipt_number() {
        let receipt =
            RemoteReceipt::from_body(json!({"id": 17, "receipt_number": "BK-2024-0042"})).unwrap();
        assert_eq!(receipt.reference, "BK-2024-0042");
    }

    #[test]
    fn test_receipt_falls_back_to_numeric_id() {
        let receipt = RemoteReceipt::from_body(json!({"id": 17})).unwrap();
        assert_eq!(receipt.reference, "17");
    }

    #[test]
    fn test_receipt_requires_identifier() {
        assert!(RemoteReceipt::from_body(json!({"ok": true})).is_none());
        assert!(RemoteReceipt::from_body(json!({"reference": ""})).is_none());
    }
}
