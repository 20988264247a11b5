//! Operation types for the outbox queue.
//!
//! Defines the business writes that can be queued and their lifecycle
//! status. Payloads stay opaque JSON.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OutboxError;

/// Prefix of the provisional reference shown before confirmation.
pub const PLACEHOLDER_PREFIX: &str = "PENDING-";

/// Remote writes that can be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    /// Create a new booking
    CreateBooking,
    /// Amend an existing booking
    UpdateBooking,
    /// Cancel a booking
    CancelBooking,
    /// Register a new customer
    CreateCustomer,
}

impl OperationType {
    /// All supported operation types.
    pub const ALL: [Self; 4] = [
        Self::CreateBooking,
        Self::UpdateBooking,
        Self::CancelBooking,
        Self::CreateCustomer,
    ];

    /// Get the display name for this operation type.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::CreateBooking => "Create Booking",
            Self::UpdateBooking => "Update Booking",
            Self::CancelBooking => "Cancel Booking",
            Self::CreateCustomer => "Create Customer",
        }
    }

    /// Stable tag persisted in the queue.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreateBooking => "CREATE_BOOKING",
            Self::UpdateBooking => "UPDATE_BOOKING",
            Self::CancelBooking => "CANCEL_BOOKING",
            Self::CreateCustomer => "CREATE_CUSTOMER",
        }
    }

    /// Remote endpoint path, relative to the service base URL.
    #[must_use]
    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::CreateBooking => "bookings",
            Self::UpdateBooking => "bookings/update",
            Self::CancelBooking => "bookings/cancel",
            Self::CreateCustomer => "customers",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for OperationType {
    type Err = OutboxError;

    /// Accepts the persisted tag as well as `create-booking` style names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_uppercase();
        Self::ALL
            .into_iter()
            .find(|ot| ot.as_str() == normalized)
            .ok_or_else(|| OutboxError::Parse(format!("Unknown operation type: {s}")))
    }
}

/// Status of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting to be dispatched
    Pending,
    /// Dispatched and awaiting the remote result
    Syncing,
    /// Confirmed by the remote service
    Completed,
    /// Terminally failed; needs retry or discard
    Failed,
}

impl OperationStatus {
    /// Check if this status is terminal (no more automatic action).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Stable tag persisted in the queue.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = OutboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "syncing" => Ok(Self::Syncing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(OutboxError::Parse(format!("Unknown operation status: {s}"))),
        }
    }
}

/// Caller-supplied extras recorded alongside the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnqueueMetadata {
    /// Provisional result rendered until the write is confirmed.
    pub optimistic_data: Value,
    /// Short human label, e.g. "Booking for ACME Ltd".
    pub description: Option<String>,
}

impl EnqueueMetadata {
    /// Metadata carrying only an optimistic snapshot.
    #[must_use]
    pub const fn optimistic(optimistic_data: Value) -> Self {
        Self {
            optimistic_data,
            description: None,
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A queued business write with its sync metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Unique, immutable id; also the idempotency key
    pub id: String,
    /// Which remote write this represents
    pub operation_type: OperationType,
    /// Opaque business data to submit
    pub payload: Value,
    /// Provisional result shown until confirmation
    pub optimistic_data: Value,
    /// Optional human label
    pub description: Option<String>,
    /// Current status
    pub status: OperationStatus,
    /// Number of resolved dispatches
    pub attempts: u32,
    /// When the operation was queued
    pub created_at: DateTime<Utc>,
    /// When it was last dispatched
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Last failure description
    pub error: Option<String>,
    /// Server-issued reference once completed
    pub confirmed_reference: Option<String>,
    /// Authoritative response once completed
    pub confirmed_data: Option<Value>,
}

impl PendingOperation {
    /// Reference to show the user: the server's once confirmed, otherwise
    /// the `PENDING-` placeholder.
    #[must_use]
    pub fn display_reference(&self) -> String {
        match (&self.status, &self.confirmed_reference) {
            (OperationStatus::Completed, Some(reference)) => reference.clone(),
            _ => placeholder_reference(&self.id),
        }
    }

    /// The data the UI should render: authoritative when available.
    #[must_use]
    pub fn current_data(&self) -> &Value {
        self.confirmed_data.as_ref().unwrap_or(&self.optimistic_data)
    }
}

/// `PENDING-` followed by the last 8 characters of the id, upper-cased.
#[must_use]
pub fn placeholder_reference(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    let suffix: String = chars[chars.len().saturating_sub(8)..].iter().collect();
    format!("{PLACEHOLDER_PREFIX}{}", suffix.to_uppercase())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_operation() -> PendingOperation {
        PendingOperation {
            id: "a1b2c3d4e5f6".to_string(),
            operation_type: OperationType::CreateBooking,
            payload: json!({"customer_id": "C-1"}),
            optimistic_data: json!({"status": "provisional"}),
            description: None,
            status: OperationStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
            last_attempt_at: None,
            error: None,
            confirmed_reference: None,
            confirmed_data: None,
        }
    }

    #[test]
    fn test_placeholder_reference() {
        assert_eq!(placeholder_reference("a1b2c3d4e5f6"), "PENDING-C3D4E5F6");
        assert_eq!(placeholder_reference("abc"), "PENDING-ABC");
    }

    #[test]
    fn test_display_reference_switches_on_completion() {
        let mut op = sample_operation();
        assert_eq!(op.display_reference(), "PENDING-C3D4E5F6");

        op.status = OperationStatus::Completed;
        op.confirmed_reference = Some("BK-000981".to_string());
        assert_eq!(op.display_reference(), "BK-000981");
    }

    #[test]
    fn test_current_data_prefers_confirmed() {
        let mut op = sample_operation();
        assert_eq!(op.current_data(), &json!({"status": "provisional"}));

        op.confirmed_data = Some(json!({"status": "confirmed"}));
        assert_eq!(op.current_data(), &json!({"status": "confirmed"}));
    }

    #[test]
    fn test_operation_type_parsing() {
        assert_eq!(
            "CREATE_BOOKING".parse::<OperationType>().unwrap(),
            OperationType::CreateBooking
        );
        assert_eq!(
            "cancel-booking".parse::<OperationType>().unwrap(),
            OperationType::CancelBooking
        );
        assert!("ship-it".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_operation_type_serializes_as_tag() {
        let json = serde_json::to_string(&OperationType::CreateCustomer).unwrap();
        assert_eq!(json, "\"CREATE_CUSTOMER\"");
    }

    #[test]
    fn test_operation_status_terminal() {
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(!OperationStatus::Syncing.is_terminal());
    }
}
