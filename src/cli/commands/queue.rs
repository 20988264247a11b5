//! Queue command implementations.

use serde_json::json;

use super::read_json_arg;
use crate::cli::args::{OutputFormat, SubmitArgs, WriteArgs};
use crate::engine::Outbox;
use crate::error::OutboxError;
use crate::features::sync::{EnqueueMetadata, OperationStatus, OperationType};
use crate::output::{
    format_drain, format_operation, format_operations, format_status, format_submit, to_json,
};

fn write_parts(args: WriteArgs) -> Result<(OperationType, serde_json::Value, EnqueueMetadata), OutboxError> {
    let payload = read_json_arg(&args.payload)?;
    let optimistic_data = match args.optimistic.as_deref() {
        Some(arg) => read_json_arg(arg)?,
        None => payload.clone(),
    };

    Ok((
        args.operation,
        payload,
        EnqueueMetadata {
            optimistic_data,
            description: args.description,
        },
    ))
}

/// Queue a write without trying it.
///
/// # Errors
///
/// Returns an error if the payload is not JSON or cannot be stored.
pub fn enqueue(outbox: &Outbox, args: WriteArgs, format: OutputFormat) -> Result<String, OutboxError> {
    let (operation_type, payload, metadata) = write_parts(args)?;
    let id = outbox.enqueue(operation_type, payload, metadata)?;

    let view = outbox
        .status()
        .get(&id)?
        .ok_or_else(|| OutboxError::NotFound(format!("Operation {id}")))?;

    match format {
        OutputFormat::Json => to_json(&view),
        OutputFormat::Pretty => Ok(format!(
            "Queued {} as {} (ID: {})",
            operation_type.display_name(),
            view.reference,
            id
        )),
    }
}

/// Send a write, queueing it if needed.
///
/// # Errors
///
/// Returns an error if the service rejects the write or it cannot be queued.
pub async fn submit(
    outbox: &Outbox,
    args: SubmitArgs,
    format: OutputFormat,
) -> Result<String, OutboxError> {
    let form = args.form;
    let (operation_type, payload, metadata) = write_parts(args.write)?;

    let outcome = match form.as_deref() {
        Some(form) => {
            outbox
                .submit_form(form, operation_type, payload, metadata)
                .await?
        },
        None => outbox.submit(operation_type, payload, metadata).await?,
    };

    format_submit(&outcome, format)
}

/// List operations, optionally by status.
///
/// # Errors
///
/// Returns an error if the queue cannot be read.
pub fn list(
    outbox: &Outbox,
    status: Option<OperationStatus>,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<String, OutboxError> {
    let operations: Vec<_> = outbox
        .list_operations()?
        .into_iter()
        .filter(|op| status.map_or(true, |s| op.status == s))
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    format_operations(&operations, format)
}

/// Show one operation.
///
/// # Errors
///
/// Returns `NotFound` for an unknown id.
pub fn show(outbox: &Outbox, id: &str, format: OutputFormat) -> Result<String, OutboxError> {
    let view = outbox
        .status()
        .get(id)?
        .ok_or_else(|| OutboxError::NotFound(format!("Operation {id}")))?;

    format_operation(&view, format)
}

/// Show queue counts and connectivity.
///
/// # Errors
///
/// Returns an error if the queue cannot be read.
pub fn status(outbox: &Outbox, format: OutputFormat) -> Result<String, OutboxError> {
    let stats = outbox.status().stats()?;
    format_status(&stats, outbox.is_online(), format)
}

/// Replay pending operations once.
///
/// # Errors
///
/// Returns an error if the queue cannot be read or updated.
pub async fn sync(outbox: &Outbox, format: OutputFormat) -> Result<String, OutboxError> {
    let report = outbox.sync_now().await?;
    format_drain(&report, outbox.is_online(), format)
}

/// Re-queue failed operations.
///
/// # Errors
///
/// Returns an error if neither an id nor `--all` is given, or the retry is
/// refused.
pub fn retry(
    outbox: &Outbox,
    id: Option<String>,
    all: bool,
    format: OutputFormat,
) -> Result<String, OutboxError> {
    let ids: Vec<String> = if let Some(id) = id {
        vec![id]
    } else if all {
        outbox
            .queue()
            .list_by_status(OperationStatus::Failed)?
            .into_iter()
            .map(|op| op.id)
            .collect()
    } else {
        return Err(OutboxError::Config(
            "Specify --all or provide an operation ID".to_string(),
        ));
    };

    for id in &ids {
        outbox.retry(id)?;
    }

    match format {
        OutputFormat::Json => to_json(&json!({"reset": ids})),
        OutputFormat::Pretty => Ok(format!("Reset {} failed operations for retry", ids.len())),
    }
}

/// Discard an operation.
///
/// # Errors
///
/// Returns `InFlight` while the operation is syncing, `NotFound` if unknown.
pub fn discard(outbox: &Outbox, id: &str, format: OutputFormat) -> Result<String, OutboxError> {
    outbox.discard(id)?;

    match format {
        OutputFormat::Json => to_json(&json!({"discarded": id})),
        OutputFormat::Pretty => Ok(format!("Discarded operation {id}")),
    }
}

/// Remove one finished operation, or completed ones past retention.
///
/// # Errors
///
/// Returns `InvalidState` for an operation that has not finished.
pub fn prune(
    outbox: &Outbox,
    id: Option<String>,
    older_than: Option<u32>,
    format: OutputFormat,
) -> Result<String, OutboxError> {
    if let Some(id) = id {
        if !outbox.queue().prune(&id)? {
            return Err(OutboxError::NotFound(format!("Operation {id}")));
        }
        return match format {
            OutputFormat::Json => to_json(&json!({"pruned": [id]})),
            OutputFormat::Pretty => Ok(format!("Pruned operation {id}")),
        };
    }

    let retention = older_than.map_or_else(
        || outbox.config().sync.completed_retention(),
        |hours| chrono::Duration::hours(i64::from(hours)),
    );
    let count = outbox.queue().prune_completed(retention)?;

    match format {
        OutputFormat::Json => to_json(&json!({"pruned": count})),
        OutputFormat::Pretty => Ok(format!(
            "Pruned {count} completed operations older than {} hours",
            retention.num_hours()
        )),
    }
}
