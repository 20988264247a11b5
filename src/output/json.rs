//! JSON output formatting for booking-outbox.

use serde::Serialize;
use serde_json::json;

use crate::engine::SubmitOutcome;
use crate::error::OutboxError;
use crate::features::drafts::DraftLoad;
use crate::features::sync::{DrainReport, OperationView, QueueStats};

/// Format operations as JSON
///
/// # Errors
///
/// Returns `OutboxError::Parse` if JSON serialization fails.
pub fn format_operations_json(operations: &[OperationView]) -> Result<String, OutboxError> {
    let output = json!({
        "count": operations.len(),
        "items": operations
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format queue counts as JSON
///
/// # Errors
///
/// Returns `OutboxError::Parse` if JSON serialization fails.
pub fn format_status_json(stats: &QueueStats, online: bool) -> Result<String, OutboxError> {
    let output = json!({
        "online": online,
        "pending": stats.pending,
        "syncing": stats.syncing,
        "completed": stats.completed,
        "failed": stats.failed,
        "oldest_pending": stats.oldest_pending.map(|t| t.to_rfc3339()),
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format a drain pass as JSON
///
/// # Errors
///
/// Returns `OutboxError::Parse` if JSON serialization fails.
pub fn format_drain_json(report: &DrainReport, online: bool) -> Result<String, OutboxError> {
    let output = json!({
        "online": online,
        "completed": report.completed,
        "retried": report.retried,
        "failed": report.failed,
        "stop": format!("{:?}", report.stop),
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format a submit result as JSON
///
/// # Errors
///
/// Returns `OutboxError::Parse` if JSON serialization fails.
pub fn format_submit_json(outcome: &SubmitOutcome) -> Result<String, OutboxError> {
    let output = match outcome {
        SubmitOutcome::Confirmed(receipt) => json!({
            "status": "confirmed",
            "reference": receipt.reference,
            "data": receipt.body,
        }),
        SubmitOutcome::Queued { id, reference } => json!({
            "status": "queued",
            "id": id,
            "reference": reference,
        }),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format a draft lookup as JSON
///
/// # Errors
///
/// Returns `OutboxError::Parse` if JSON serialization fails.
pub fn format_draft_json(form: &str, load: &DraftLoad) -> Result<String, OutboxError> {
    let output = match load {
        DraftLoad::None => json!({"form": form, "draft": null}),
        DraftLoad::Resumable(draft) => json!({"form": form, "draft": draft}),
        DraftLoad::Expired { saved_at } => json!({
            "form": form,
            "draft": null,
            "expired_at": saved_at.to_rfc3339(),
        }),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Generic JSON formatter for any serializable type
///
/// # Errors
///
/// Returns `OutboxError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, OutboxError> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::features::sync::DrainStop;
    use crate::remote::RemoteReceipt;

    #[test]
    fn test_status_json() {
        let stats = QueueStats {
            pending: 2,
            failed: 1,
            ..QueueStats::default()
        };
        let value: Value = serde_json::from_str(&format_status_json(&stats, false).unwrap()).unwrap();
        assert_eq!(value["pending"], 2);
        assert_eq!(value["online"], false);
        assert!(value["oldest_pending"].is_null());
    }

    #[test]
    fn test_submit_json() {
        let queued = SubmitOutcome::Queued {
            id: "a1b2c3d4e5f6".into(),
            reference: "PENDING-C3D4E5F6".into(),
        };
        let value: Value = serde_json::from_str(&format_submit_json(&queued).unwrap()).unwrap();
        assert_eq!(value["status"], "queued");
        assert_eq!(value["reference"], "PENDING-C3D4E5F6");

        let confirmed = SubmitOutcome::Confirmed(RemoteReceipt {
            reference: "BK-1".into(),
            body: json!({"id": 1}),
        });
        let value: Value = serde_json::from_str(&format_submit_json(&confirmed).unwrap()).unwrap();
        assert_eq!(value["status"], "confirmed");
        assert_eq!(value["data"]["id"], 1);
    }

    #[test]
    fn test_drain_json() {
        let report = DrainReport {
            completed: 3,
            stop: DrainStop::QueueEmpty,
            ..DrainReport::default()
        };
        let value: Value = serde_json::from_str(&format_drain_json(&report, true).unwrap()).unwrap();
        assert_eq!(value["completed"], 3);
        assert_eq!(value["stop"], "QueueEmpty");
    }
}
