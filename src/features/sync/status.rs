//! Read-side projection of the queue for the UI.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use super::operation::{OperationStatus, OperationType, PendingOperation};
use super::queue::{OperationQueue, QueueStats};
use crate::error::OutboxError;

/// What the UI renders for one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationView {
    pub id: String,
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    pub status: OperationStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub optimistic_data: Value,
    /// `PENDING-…` until confirmed, then the server reference.
    pub reference: String,
    /// Authoritative data when confirmed, optimistic otherwise.
    pub data: Value,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl From<&PendingOperation> for OperationView {
    fn from(op: &PendingOperation) -> Self {
        Self {
            id: op.id.clone(),
            operation_type: op.operation_type,
            status: op.status,
            attempts: op.attempts,
            error: op.error.clone(),
            optimistic_data: op.optimistic_data.clone(),
            reference: op.display_reference(),
            data: op.current_data().clone(),
            description: op.description.clone(),
            created_at: op.created_at,
            last_attempt_at: op.last_attempt_at,
        }
    }
}

#[derive(Default)]
struct Snapshot {
    revision: Option<u64>,
    operations: Arc<Vec<PendingOperation>>,
}

/// Cached view over the queue, rebuilt when the queue revision moves.
pub struct StatusStore {
    queue: Arc<OperationQueue>,
    snapshot: Mutex<Snapshot>,
}

impl StatusStore {
    #[must_use]
    pub fn new(queue: Arc<OperationQueue>) -> Self {
        Self {
            queue,
            snapshot: Mutex::new(Snapshot::default()),
        }
    }

    /// Change notifications; await `changed()` and re-read.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.queue.subscribe()
    }

    fn operations(&self) -> Result<Arc<Vec<PendingOperation>>, OutboxError> {
        let revision = self.queue.revision();
        let mut snapshot = self.snapshot.lock();
        if snapshot.revision != Some(revision) {
            snapshot.operations = Arc::new(self.queue.list()?);
            snapshot.revision = Some(revision);
        }
        Ok(Arc::clone(&snapshot.operations))
    }

    /// Drop the cache so the next read goes to storage.
    pub fn refresh(&self) {
        self.snapshot.lock().revision = None;
    }

    /// Every retained operation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn list_operations(&self) -> Result<Vec<OperationView>, OutboxError> {
        Ok(self.operations()?.iter().map(OperationView::from).collect())
    }

    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn get(&self, id: &str) -> Result<Option<OperationView>, OutboxError> {
        Ok(self
            .operations()?
            .iter()
            .find(|op| op.id == id)
            .map(OperationView::from))
    }

    /// Whether this operation is the one in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn is_syncing(&self, id: &str) -> Result<bool, OutboxError> {
        Ok(self
            .operations()?
            .iter()
            .any(|op| op.id == id && op.status == OperationStatus::Syncing))
    }

    /// Failure reason of a terminally failed operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn failure(&self, id: &str) -> Result<Option<String>, OutboxError> {
        Ok(self
            .operations()?
            .iter()
            .find(|op| op.id == id && op.status == OperationStatus::Failed)
            .and_then(|op| op.error.clone()))
    }

    /// Counts by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn stats(&self) -> Result<QueueStats, OutboxError> {
        let operations = self.operations()?;
        let mut stats = QueueStats::default();
        for op in operations.iter() {
            match op.status {
                OperationStatus::Pending => {
                    stats.pending += 1;
                    stats.oldest_pending.get_or_insert(op.created_at);
                },
                OperationStatus::Syncing => stats.syncing += 1,
                OperationStatus::Completed => stats.completed += 1,
                OperationStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    /// Put a failed operation back in the queue.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `InvalidState` from the queue.
    pub fn retry(&self, id: &str) -> Result<(), OutboxError> {
        self.queue.retry(id)
    }

    /// Remove an operation without further attempts.
    ///
    /// # Errors
    ///
    /// Returns `InFlight` while the operation is syncing.
    pub fn discard(&self, id: &str) -> Result<(), OutboxError> {
        self.queue.discard(id)
    }
}
