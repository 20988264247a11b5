use chrono::Utc;
use colored::{ColoredString, Colorize};

use crate::core::format_age;
use crate::engine::SubmitOutcome;
use crate::features::drafts::DraftLoad;
use crate::features::sync::{DrainReport, DrainStop, OperationStatus, OperationView, QueueStats};

fn status_badge(status: OperationStatus) -> ColoredString {
    match status {
        OperationStatus::Pending => "pending".yellow(),
        OperationStatus::Syncing => "syncing".cyan(),
        OperationStatus::Completed => "completed".green(),
        OperationStatus::Failed => "failed".red(),
    }
}

fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// Format a list of operations as a table
pub fn format_operations_pretty(operations: &[OperationView]) -> String {
    if operations.is_empty() {
        return "No operations in queue.".to_string();
    }

    let now = Utc::now();
    let mut lines = Vec::new();

    lines.push(format!("Operations ({})", operations.len()).bold().to_string());
    lines.push("─".repeat(72));
    lines.push(format!(
        "{:<18} {:<16} {:<10} {:>3}  {}",
        "Reference", "Type", "Status", "Try", "Queued"
    ));
    lines.push("─".repeat(72));

    for op in operations {
        // Pad before coloring so escape codes don't skew the columns.
        let status = status_badge(op.status);
        let status_padding = " ".repeat(10usize.saturating_sub(op.status.as_str().len()));

        lines.push(format!(
            "{:<18} {:<16} {status}{status_padding} {:>3}  {}",
            op.reference,
            op.operation_type.display_name(),
            op.attempts,
            format_age(op.created_at, now).dimmed()
        ));

        if let Some(description) = &op.description {
            lines.push(format!("{:19}{}", "", description.dimmed()));
        }
        if let Some(error) = &op.error {
            lines.push(format!("{:19}{}", "", shorten(error, 52).red()));
        }
    }

    lines.join("\n")
}

/// Format one operation with all its fields
pub fn format_operation_pretty(op: &OperationView) -> String {
    let now = Utc::now();
    let mut output = format!("{} {}\n", op.reference.bold(), status_badge(op.status));

    output.push_str(&format!("  {}: {}\n", "ID".dimmed(), op.id));
    output.push_str(&format!(
        "  {}: {}\n",
        "Type".dimmed(),
        op.operation_type.display_name()
    ));
    if let Some(description) = &op.description {
        output.push_str(&format!("  {}: {description}\n", "Description".dimmed()));
    }
    output.push_str(&format!("  {}: {}\n", "Attempts".dimmed(), op.attempts));
    output.push_str(&format!(
        "  {}: {}\n",
        "Queued".dimmed(),
        format_age(op.created_at, now)
    ));
    if let Some(last) = op.last_attempt_at {
        output.push_str(&format!(
            "  {}: {}\n",
            "Last attempt".dimmed(),
            format_age(last, now)
        ));
    }
    if let Some(error) = &op.error {
        output.push_str(&format!("  {}: {}\n", "Error".dimmed(), error.red()));
    }
    output.push_str(&format!("  {}: {}", "Data".dimmed(), op.data));

    output
}

/// Format queue counts and connectivity
pub fn format_status_pretty(stats: &QueueStats, online: bool) -> String {
    let mut lines = Vec::new();

    lines.push("Outbox Status".bold().to_string());
    lines.push("─".repeat(40));

    lines.push(format!(
        "  Network:    {}",
        if online { "online".green() } else { "offline".yellow() }
    ));
    lines.push(format!(
        "  Pending:    {} {}",
        stats.pending,
        if stats.pending > 0 {
            "operations waiting".dimmed()
        } else {
            "".dimmed()
        }
    ));
    lines.push(format!("  Syncing:    {}", stats.syncing));
    lines.push(format!(
        "  Completed:  {} {}",
        stats.completed,
        "operations".dimmed()
    ));
    lines.push(format!(
        "  Failed:     {} {}",
        stats.failed,
        if stats.failed > 0 {
            "operations need attention".red()
        } else {
            "".normal()
        }
    ));

    if let Some(oldest) = stats.oldest_pending {
        lines.push(format!(
            "  Oldest:     {}",
            format_age(oldest, Utc::now()).dimmed()
        ));
    }

    if stats.pending > 0 {
        lines.push(String::new());
        lines.push(
            "Run 'booking-outbox sync' to replay pending operations"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format the result of a drain pass
pub fn format_drain_pretty(report: &DrainReport) -> String {
    let summary = match report.stop {
        DrainStop::Offline if report.completed + report.failed + report.retried == 0 => {
            return "Service unreachable; operations stay queued.".yellow().to_string();
        },
        DrainStop::AlreadyDraining => return "A sync is already running.".to_string(),
        DrainStop::Blocked => "stopped: an operation is still in flight".yellow(),
        DrainStop::Offline => "stopped: connection lost".yellow(),
        DrainStop::QueueEmpty => "queue empty".dimmed(),
        DrainStop::Stopped => "stopped: shutting down".yellow(),
    };

    if report.completed + report.failed + report.retried == 0 {
        return "No pending operations to sync.".to_string();
    }

    let mut lines = vec![format!("Sync finished ({summary})")];
    lines.push(format!("  {} {} confirmed", "✓".green(), report.completed));
    if report.retried > 0 {
        lines.push(format!("  {} {} retried", "↻".yellow(), report.retried));
    }
    if report.failed > 0 {
        lines.push(format!("  {} {} failed", "✗".red(), report.failed));
    }

    lines.join("\n")
}

/// Format the result of a submit
pub fn format_submit_pretty(outcome: &SubmitOutcome) -> String {
    match outcome {
        SubmitOutcome::Confirmed(receipt) => {
            format!("{} Confirmed: {}", "✓".green(), receipt.reference.bold())
        },
        SubmitOutcome::Queued { reference, .. } => format!(
            "{} Queued as {} {}",
            "⏳".yellow(),
            reference.bold(),
            "(will sync when the service is reachable)".dimmed()
        ),
    }
}

/// Format a draft lookup
pub fn format_draft_pretty(form: &str, load: &DraftLoad) -> String {
    match load {
        DraftLoad::None => format!("No draft saved for '{form}'."),
        DraftLoad::Expired { saved_at } => format!(
            "Draft for '{form}' from {} was too old and has been discarded.",
            format_age(*saved_at, Utc::now())
        ),
        DraftLoad::Resumable(draft) => format!(
            "{} {}\n  {}",
            format!("Draft for '{form}'").bold(),
            format!("saved {}", format_age(draft.saved_at, Utc::now())).dimmed(),
            draft.data
        ),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::features::sync::OperationType;

    fn view(status: OperationStatus) -> OperationView {
        OperationView {
            id: "a1b2c3d4e5f6".into(),
            operation_type: OperationType::CreateBooking,
            status,
            attempts: 2,
            error: Some("pickup date is in the past".into()),
            optimistic_data: json!({}),
            reference: "PENDING-C3D4E5F6".into(),
            data: json!({}),
            description: Some("Booking for ACME".into()),
            created_at: Utc::now(),
            last_attempt_at: None,
        }
    }

    #[test]
    fn test_operations_table() {
        colored::control::set_override(false);
        let output = format_operations_pretty(&[view(OperationStatus::Failed)]);
        assert!(output.contains("PENDING-C3D4E5F6"));
        assert!(output.contains("Create Booking"));
        assert!(output.contains("failed"));
        assert!(output.contains("pickup date is in the past"));
        assert!(output.contains("Booking for ACME"));
    }

    #[test]
    fn test_empty_operations() {
        assert_eq!(format_operations_pretty(&[]), "No operations in queue.");
    }

    #[test]
    fn test_shorten() {
        assert_eq!(shorten("short", 10), "short");
        assert_eq!(shorten("a much longer message", 10), "a much ...");
    }

    #[test]
    fn test_drain_with_nothing_to_do() {
        assert_eq!(
            format_drain_pretty(&DrainReport::default()),
            "No pending operations to sync."
        );
    }
}
