//! Output formatting for booking-outbox.
//!
//! This module provides formatters for displaying queue state in various formats.

mod json;
mod pretty;

use crate::cli::args::OutputFormat;
use crate::engine::SubmitOutcome;
use crate::error::OutboxError;
use crate::features::drafts::DraftLoad;
use crate::features::sync::{DrainReport, OperationView, QueueStats};

pub use json::*;
pub use pretty::*;

/// Format operations based on output format
///
/// # Errors
///
/// Returns `OutboxError::Parse` if JSON serialization fails.
pub fn format_operations(
    operations: &[OperationView],
    format: OutputFormat,
) -> Result<String, OutboxError> {
    match format {
        OutputFormat::Pretty => Ok(format_operations_pretty(operations)),
        OutputFormat::Json => format_operations_json(operations),
    }
}

/// Format a single operation based on output format
///
/// # Errors
///
/// Returns `OutboxError::Parse` if JSON serialization fails.
pub fn format_operation(op: &OperationView, format: OutputFormat) -> Result<String, OutboxError> {
    match format {
        OutputFormat::Pretty => Ok(format_operation_pretty(op)),
        OutputFormat::Json => to_json(op),
    }
}

/// Format queue counts based on output format
///
/// # Errors
///
/// Returns `OutboxError::Parse` if JSON serialization fails.
pub fn format_status(
    stats: &QueueStats,
    online: bool,
    format: OutputFormat,
) -> Result<String, OutboxError> {
    match format {
        OutputFormat::Pretty => Ok(format_status_pretty(stats, online)),
        OutputFormat::Json => format_status_json(stats, online),
    }
}

/// Format a drain pass based on output format
///
/// # Errors
///
/// Returns `OutboxError::Parse` if JSON serialization fails.
pub fn format_drain(
    report: &DrainReport,
    online: bool,
    format: OutputFormat,
) -> Result<String, OutboxError> {
    match format {
        OutputFormat::Pretty => Ok(format_drain_pretty(report)),
        OutputFormat::Json => format_drain_json(report, online),
    }
}

/// Format a submit result based on output format
///
/// # Errors
///
/// Returns `OutboxError::Parse` if JSON serialization fails.
pub fn format_submit(outcome: &SubmitOutcome, format: OutputFormat) -> Result<String, OutboxError> {
    match format {
        OutputFormat::Pretty => Ok(format_submit_pretty(outcome)),
        OutputFormat::Json => format_submit_json(outcome),
    }
}

/// Format a draft lookup based on output format
///
/// # Errors
///
/// Returns `OutboxError::Parse` if JSON serialization fails.
pub fn format_draft(form: &str, load: &DraftLoad, format: OutputFormat) -> Result<String, OutboxError> {
    match format {
        OutputFormat::Pretty => Ok(format_draft_pretty(form, load)),
        OutputFormat::Json => format_draft_json(form, load),
    }
}
