//! `SQLite` database connection shared by the queue and draft stores.
//!
//! The database is stored at `~/.booking-outbox/outbox.db` and contains:
//! - The pending operation queue
//! - Form drafts kept for crash recovery

use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;

use crate::config::Paths;
use crate::error::OutboxError;

use super::migrations;

/// Handle to the outbox database.
///
/// The connection sits behind a mutex so every statement runs to completion
/// before another caller can read, which keeps records whole for readers.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open `outbox.db` under the data root, creating the root if needed.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the file cannot be opened or the
    /// schema cannot be brought up to date.
    pub fn open() -> Result<Self, OutboxError> {
        let paths = Paths::new()?;
        paths.ensure_dirs()?;
        Self::open_at(&paths.database)
    }

    /// Open (or create) the database file at `path` in WAL mode with full
    /// synchronous commits.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the file cannot be opened, the journal
    /// cannot be configured, or migrations fail.
    pub fn open_at(path: &std::path::Path) -> Result<Self, OutboxError> {
        let conn = Connection::open(path).map_err(|e| {
            OutboxError::Persistence(format!("Failed to open database {}: {e}", path.display()))
        })?;

        // A commit must survive power loss before enqueue returns.
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = FULL;")
            .map_err(|e| OutboxError::Persistence(format!("Failed to configure journal: {e}")))?;

        Self::from_connection(conn)
    }

    /// Throwaway database for tests and dry runs.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if migrations fail.
    pub fn open_in_memory() -> Result<Self, OutboxError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            OutboxError::Persistence(format!("Failed to open in-memory database: {e}"))
        })?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, OutboxError> {
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Schema version recorded in `PRAGMA user_version`.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the pragma cannot be read.
    pub fn schema_version(&self) -> Result<i32, OutboxError> {
        migrations::get_version(&self.conn.lock())
    }

    /// Lock and borrow the underlying connection.
    ///
    /// Callers must drop the guard before awaiting anything.
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}
