//! Durable, ordered operation queue.
//!
//! Every mutation is a single statement or a short transaction under the
//! connection lock, so readers never observe a half-written record. Each
//! successful mutation bumps a revision counter that projections watch.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::operation::{EnqueueMetadata, OperationStatus, OperationType, PendingOperation};
use crate::error::OutboxError;
use crate::remote::RemoteReceipt;
use crate::storage::Database;

const COLUMNS: &str = "id, operation_type, payload, optimistic_data, description, status, \
                       attempts, created_at, last_attempt_at, error, confirmed_reference, \
                       confirmed_data";

/// Queue of offline operations backed by `SQLite`.
pub struct OperationQueue {
    db: Arc<Database>,
    revision: watch::Sender<u64>,
}

impl OperationQueue {
    /// Create a queue over an open database.
    #[must_use]
    pub fn with_database(db: Arc<Database>) -> Self {
        let (revision, _) = watch::channel(0);
        Self { db, revision }
    }

    /// Subscribe to queue changes; the value is a revision counter.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Current revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Persist a new pending operation and return its id.
    ///
    /// The row is committed before this returns; an error means nothing was
    /// queued.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the operation cannot be saved.
    pub fn enqueue(
        &self,
        operation_type: OperationType,
        payload: Value,
        metadata: EnqueueMetadata,
    ) -> Result<String, OutboxError> {
        self.enqueue_with_id(
            Uuid::new_v4().simple().to_string(),
            operation_type,
            payload,
            metadata,
        )
    }

    /// Persist a new pending operation under an id the caller already used
    /// as an idempotency key, e.g. for a direct write that timed out.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the operation cannot be saved or the
    /// id is already queued.
    pub fn enqueue_with_id(
        &self,
        id: String,
        operation_type: OperationType,
        payload: Value,
        metadata: EnqueueMetadata,
    ) -> Result<String, OutboxError> {
        let created_at = Utc::now();

        self.db
            .connection()
            .execute(
                r"INSERT INTO operations
                  (id, operation_type, payload, optimistic_data, description, status, attempts, created_at)
                  VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, ?6)",
                params![
                    id,
                    operation_type.as_str(),
                    payload.to_string(),
                    metadata.optimistic_data.to_string(),
                    metadata.description,
                    timestamp(created_at),
                ],
            )
            .map_err(|e| OutboxError::Persistence(format!("Failed to enqueue operation: {e}")))?;

        info!(operation_id = %id, operation_type = operation_type.as_str(), "Operation queued");
        self.bump();
        Ok(id)
    }

    /// Oldest operation still waiting to be dispatched.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn next_pending(&self) -> Result<Option<PendingOperation>, OutboxError> {
        let conn = self.db.connection();
        conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM operations
                 WHERE status = 'pending'
                 ORDER BY created_at ASC, seq ASC
                 LIMIT 1"
            ),
            [],
            row_to_operation,
        )
        .optional()
        .map_err(|e| OutboxError::Persistence(format!("Failed to query next pending: {e}")))
    }

    /// Move a pending operation to `syncing`.
    ///
    /// Returns `false` without changing anything if the operation is not
    /// pending or another operation is already in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_syncing(&self, id: &str) -> Result<bool, OutboxError> {
        let rows = self
            .db
            .connection()
            .execute(
                r"UPDATE operations SET status = 'syncing', last_attempt_at = ?2
                  WHERE id = ?1 AND status = 'pending'
                    AND NOT EXISTS (SELECT 1 FROM operations WHERE status = 'syncing')",
                params![id, timestamp(Utc::now())],
            )
            .map_err(|e| OutboxError::Persistence(format!("Failed to mark syncing: {e}")))?;

        self.changed(rows, id, "syncing")
    }

    /// Record a confirmed write.
    ///
    /// Only an operation currently `syncing` can complete, so a second
    /// confirmation of the same operation is refused and returns `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_completed(&self, id: &str, receipt: &RemoteReceipt) -> Result<bool, OutboxError> {
        let rows = self
            .db
            .connection()
            .execute(
                r"UPDATE operations SET
                  status = 'completed',
                  attempts = attempts + 1,
                  error = NULL,
                  confirmed_reference = ?2,
                  confirmed_data = ?3
                  WHERE id = ?1 AND status = 'syncing'",
                params![id, receipt.reference, receipt.body.to_string()],
            )
            .map_err(|e| OutboxError::Persistence(format!("Failed to mark completed: {e}")))?;

        self.changed(rows, id, "completed")
    }

    /// Record a failed dispatch.
    ///
    /// A retryable failure puts the operation back to `pending`; otherwise it
    /// becomes terminally `failed`. Either way the attempt is counted.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_failed(&self, id: &str, error: &str, retryable: bool) -> Result<bool, OutboxError> {
        let status = if retryable {
            OperationStatus::Pending
        } else {
            OperationStatus::Failed
        };

        let rows = self
            .db
            .connection()
            .execute(
                r"UPDATE operations SET
                  status = ?2,
                  attempts = attempts + 1,
                  error = ?3
                  WHERE id = ?1 AND status = 'syncing'",
                params![id, status.as_str(), error],
            )
            .map_err(|e| OutboxError::Persistence(format!("Failed to mark failed: {e}")))?;

        self.changed(rows, id, status.as_str())
    }

    /// Remove a completed or failed operation.
    ///
    /// Returns `false` if no such operation exists.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the operation is still pending or syncing.
    pub fn prune(&self, id: &str) -> Result<bool, OutboxError> {
        let conn = self.db.connection();
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| OutboxError::Persistence(format!("Failed to begin prune: {e}")))?;

        let Some(status) = status_of(&tx, id)? else {
            return Ok(false);
        };
        if !status.is_terminal() {
            return Err(OutboxError::InvalidState(format!(
                "Operation {id} is {status}; only completed or failed operations can be pruned"
            )));
        }

        tx.execute("DELETE FROM operations WHERE id = ?1", [id])
            .map_err(|e| OutboxError::Persistence(format!("Failed to prune operation: {e}")))?;
        tx.commit()
            .map_err(|e| OutboxError::Persistence(format!("Failed to commit prune: {e}")))?;
        drop(conn);

        debug!(operation_id = id, "Operation pruned");
        self.bump();
        Ok(true)
    }

    /// Delete an operation that is not in flight, without further attempts.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `InFlight` while syncing.
    pub fn discard(&self, id: &str) -> Result<(), OutboxError> {
        let conn = self.db.connection();
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| OutboxError::Persistence(format!("Failed to begin discard: {e}")))?;

        match status_of(&tx, id)? {
            None => return Err(OutboxError::NotFound(format!("Operation {id}"))),
            Some(OperationStatus::Syncing) => return Err(OutboxError::InFlight(id.to_string())),
            Some(_) => {},
        }

        tx.execute("DELETE FROM operations WHERE id = ?1", [id])
            .map_err(|e| OutboxError::Persistence(format!("Failed to discard operation: {e}")))?;
        tx.commit()
            .map_err(|e| OutboxError::Persistence(format!("Failed to commit discard: {e}")))?;
        drop(conn);

        info!(operation_id = id, "Operation discarded");
        self.bump();
        Ok(())
    }

    /// Return a terminally failed operation to `pending` with a fresh
    /// attempt budget. It keeps its original place in the order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `InvalidState` unless failed.
    pub fn retry(&self, id: &str) -> Result<(), OutboxError> {
        let conn = self.db.connection();
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| OutboxError::Persistence(format!("Failed to begin retry: {e}")))?;

        match status_of(&tx, id)? {
            None => return Err(OutboxError::NotFound(format!("Operation {id}"))),
            Some(OperationStatus::Failed) => {},
            Some(status) => {
                return Err(OutboxError::InvalidState(format!(
                    "Operation {id} is {status}; only failed operations can be retried"
                )))
            },
        }

        tx.execute(
            r"UPDATE operations SET
              status = 'pending',
              attempts = 0,
              error = NULL,
              last_attempt_at = NULL
              WHERE id = ?1",
            [id],
        )
        .map_err(|e| OutboxError::Persistence(format!("Failed to reset operation: {e}")))?;
        tx.commit()
            .map_err(|e| OutboxError::Persistence(format!("Failed to commit retry: {e}")))?;
        drop(conn);

        info!(operation_id = id, "Operation reset for retry");
        self.bump();
        Ok(())
    }

    /// Return operations left `syncing` by an interrupted run to `pending`.
    ///
    /// Their outcome is unknown; the replay carries the same idempotency key.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn recover_interrupted(&self) -> Result<usize, OutboxError> {
        let rows = self
            .db
            .connection()
            .execute(
                "UPDATE operations SET status = 'pending' WHERE status = 'syncing'",
                [],
            )
            .map_err(|e| {
                OutboxError::Persistence(format!("Failed to recover interrupted operations: {e}"))
            })?;

        if rows > 0 {
            warn!(count = rows, "Recovered operations interrupted mid-sync");
            self.bump();
        }
        Ok(rows)
    }

    /// Delete completed operations confirmed longer ago than `max_age`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `max_age` is not positive or reaches
    /// past the representable calendar, and a persistence error if the
    /// delete fails.
    pub fn prune_completed(&self, max_age: chrono::Duration) -> Result<usize, OutboxError> {
        if max_age <= chrono::Duration::zero() {
            return Err(OutboxError::Config(format!(
                "Retention must be positive, got {} hours",
                max_age.num_hours()
            )));
        }
        let cutoff = Utc::now().checked_sub_signed(max_age).ok_or_else(|| {
            OutboxError::Config(format!(
                "Retention of {} hours is out of range",
                max_age.num_hours()
            ))
        })?;

        let rows = self
            .db
            .connection()
            .execute(
                r"DELETE FROM operations
                  WHERE status = 'completed'
                    AND COALESCE(last_attempt_at, created_at) < ?1",
                [timestamp(cutoff)],
            )
            .map_err(|e| OutboxError::Persistence(format!("Failed to prune completed: {e}")))?;

        if rows > 0 {
            debug!(count = rows, "Pruned completed operations");
            self.bump();
        }
        Ok(rows)
    }

    /// Get a specific operation by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: &str) -> Result<Option<PendingOperation>, OutboxError> {
        let conn = self.db.connection();
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM operations WHERE id = ?1"),
            [id],
            row_to_operation,
        )
        .optional()
        .map_err(|e| OutboxError::Persistence(format!("Failed to query operation: {e}")))
    }

    /// All operations in submission order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self) -> Result<Vec<PendingOperation>, OutboxError> {
        self.query_many(
            &format!("SELECT {COLUMNS} FROM operations ORDER BY created_at ASC, seq ASC"),
            &[],
        )
    }

    /// Operations with a given status, in submission order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_by_status(
        &self,
        status: OperationStatus,
    ) -> Result<Vec<PendingOperation>, OutboxError> {
        self.query_many(
            &format!(
                "SELECT {COLUMNS} FROM operations WHERE status = ?1 ORDER BY created_at ASC, seq ASC"
            ),
            &[&status.as_str()],
        )
    }

    fn query_many(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<PendingOperation>, OutboxError> {
        let conn = self.db.connection();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| OutboxError::Persistence(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params, row_to_operation)
            .map_err(|e| OutboxError::Persistence(format!("Failed to query operations: {e}")))?;

        let mut operations = Vec::new();
        for row in rows {
            operations.push(row.map_err(|e| OutboxError::Persistence(e.to_string()))?);
        }

        Ok(operations)
    }

    /// Check if there are any pending operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn has_pending(&self) -> Result<bool, OutboxError> {
        let count: i64 = self
            .db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM operations WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| OutboxError::Persistence(format!("Failed to check pending: {e}")))?;

        Ok(count > 0)
    }

    /// Get queue statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stats(&self) -> Result<QueueStats, OutboxError> {
        let conn = self.db.connection();

        let mut stats = QueueStats::default();
        {
            let mut stmt = conn
                .prepare("SELECT status, COUNT(*) FROM operations GROUP BY status")
                .map_err(|e| OutboxError::Persistence(format!("Failed to prepare stats: {e}")))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(|e| OutboxError::Persistence(format!("Failed to count operations: {e}")))?;

            for row in rows {
                let (status, count) = row.map_err(|e| OutboxError::Persistence(e.to_string()))?;
                match status.parse::<OperationStatus>()? {
                    OperationStatus::Pending => stats.pending = count,
                    OperationStatus::Syncing => stats.syncing = count,
                    OperationStatus::Completed => stats.completed = count,
                    OperationStatus::Failed => stats.failed = count,
                }
            }
        }

        let oldest_pending: Option<String> = conn
            .query_row(
                "SELECT created_at FROM operations WHERE status = 'pending' ORDER BY created_at ASC, seq ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| OutboxError::Persistence(format!("Failed to get oldest pending: {e}")))?;

        stats.oldest_pending = oldest_pending
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc));

        Ok(stats)
    }

    fn changed(&self, rows: usize, id: &str, status: &str) -> Result<bool, OutboxError> {
        if rows == 0 {
            debug!(operation_id = id, status, "Transition not applied");
            return Ok(false);
        }
        debug!(operation_id = id, status, "Operation transitioned");
        self.bump();
        Ok(true)
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Number of pending operations
    pub pending: i64,
    /// Number of operations in flight (0 or 1)
    pub syncing: i64,
    /// Number of completed operations
    pub completed: i64,
    /// Number of failed operations
    pub failed: i64,
    /// Oldest pending operation timestamp
    pub oldest_pending: Option<DateTime<Utc>>,
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn status_of(conn: &Connection, id: &str) -> Result<Option<OperationStatus>, OutboxError> {
    let status: Option<String> = conn
        .query_row("SELECT status FROM operations WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| OutboxError::Persistence(format!("Failed to read status: {e}")))?;

    status.map(|s| s.parse()).transpose()
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_time(idx: usize, s: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_json(idx: usize, s: &str) -> Result<Value, rusqlite::Error> {
    serde_json::from_str(s).map_err(|e| conversion_error(idx, e))
}

fn row_to_operation(row: &Row<'_>) -> Result<PendingOperation, rusqlite::Error> {
    let operation_type: String = row.get(1)?;
    let payload: String = row.get(2)?;
    let optimistic_data: String = row.get(3)?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(7)?;
    let last_attempt_at: Option<String> = row.get(8)?;
    let confirmed_data: Option<String> = row.get(11)?;

    Ok(PendingOperation {
        id: row.get(0)?,
        operation_type: operation_type
            .parse()
            .map_err(|e| conversion_error(1, e))?,
        payload: parse_json(2, &payload)?,
        optimistic_data: parse_json(3, &optimistic_data)?,
        description: row.get(4)?,
        status: status.parse().map_err(|e| conversion_error(5, e))?,
        attempts: row.get(6)?,
        created_at: parse_time(7, &created_at)?,
        last_attempt_at: last_attempt_at
            .as_deref()
            .map(|s| parse_time(8, s))
            .transpose()?,
        error: row.get(9)?,
        confirmed_reference: row.get(10)?,
        confirmed_data: confirmed_data
            .as_deref()
            .map(|s| parse_json(11, s))
            .transpose()?,
    })
}
