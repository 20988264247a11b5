//! Database migrations for booking-outbox.
//!
//! Each migration is a function that upgrades the schema by one version.
//! Migrations are run automatically when the database is opened.

use rusqlite::Connection;

use crate::error::OutboxError;

/// Current schema version.
const CURRENT_VERSION: i32 = 2;

/// Get the current schema version from the database.
///
/// Returns 0 if no version has been set (new database).
pub fn get_version(conn: &Connection) -> Result<i32, OutboxError> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| OutboxError::Persistence(format!("Failed to get schema version: {e}")))?;

    Ok(version)
}

/// Set the schema version in the database.
fn set_version(conn: &Connection, version: i32) -> Result<(), OutboxError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| OutboxError::Persistence(format!("Failed to set schema version: {e}")))
}

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<(), OutboxError> {
    let current = get_version(conn)?;

    if current >= CURRENT_VERSION {
        return Ok(());
    }

    for version in (current + 1)..=CURRENT_VERSION {
        run_migration(conn, version)?;
        set_version(conn, version)?;
    }

    Ok(())
}

/// Run a specific migration.
fn run_migration(conn: &Connection, version: i32) -> Result<(), OutboxError> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(OutboxError::Persistence(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: operation queue.
///
/// `seq` breaks ties between operations created in the same instant. The
/// partial unique index rejects a second `syncing` row outright.
fn migrate_v1(conn: &Connection) -> Result<(), OutboxError> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS operations (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            operation_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            optimistic_data TEXT NOT NULL DEFAULT 'null',
            description TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            last_attempt_at TEXT,
            error TEXT,
            confirmed_reference TEXT,
            confirmed_data TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_operations_status
        ON operations(status, created_at, seq);

        CREATE UNIQUE INDEX IF NOT EXISTS idx_operations_single_syncing
        ON operations(status) WHERE status = 'syncing';
        ",
    )
    .map_err(|e| OutboxError::Persistence(format!("Migration v1 failed: {e}")))
}

/// Migration v2: form drafts, one per form.
fn migrate_v2(conn: &Connection) -> Result<(), OutboxError> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS drafts (
            form TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            saved_at TEXT NOT NULL
        );
        ",
    )
    .map_err(|e| OutboxError::Persistence(format!("Migration v2 failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_create_tables() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);

        conn.execute(
            "INSERT INTO operations (id, operation_type, payload, created_at)
             VALUES ('abc123', 'CREATE_BOOKING', '{}', '2024-01-01T10:00:00Z')",
            [],
        )
        .unwrap();

        conn.execute(
            "INSERT INTO drafts (form, data, saved_at) VALUES ('booking', '{}', '2024-01-01T10:00:00Z')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_second_syncing_row_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        conn.execute(
            "INSERT INTO operations (id, operation_type, payload, created_at, status)
             VALUES ('a', 'CREATE_BOOKING', '{}', '2024-01-01T10:00:00Z', 'syncing')",
            [],
        )
        .unwrap();

        let second = conn.execute(
            "INSERT INTO operations (id, operation_type, payload, created_at, status)
             VALUES ('b', 'CREATE_BOOKING', '{}', '2024-01-01T10:00:01Z', 'syncing')",
            [],
        );
        assert!(second.is_err());
    }

    #[test]
    fn test_migration_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_get_version_new_database() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_version(&conn).unwrap(), 0);
    }
}
