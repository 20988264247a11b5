//! Path resolution for booking-outbox configuration and data files.
//!
//! All data is stored in `~/.booking-outbox/` unless `BOOKING_OUTBOX_HOME`
//! points elsewhere:
//! - `config.yaml` - Main configuration file
//! - `outbox.db` - SQLite database for the operation queue and drafts

use std::path::PathBuf;

use crate::error::OutboxError;

/// Environment variable overriding the data root.
pub const HOME_ENV: &str = "BOOKING_OUTBOX_HOME";

/// Paths to configuration and data files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.booking-outbox/`
    pub root: PathBuf,
    /// Config file: `~/.booking-outbox/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.booking-outbox/outbox.db`
    pub database: PathBuf,
}

impl Paths {
    /// Resolve paths from `BOOKING_OUTBOX_HOME` or the user's home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if neither variable is set.
    pub fn new() -> Result<Self, OutboxError> {
        if let Ok(root) = std::env::var(HOME_ENV) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }

        let home = std::env::var("HOME")
            .map_err(|_| OutboxError::Config("Could not determine home directory".to_string()))?;

        Ok(Self::with_root(PathBuf::from(home).join(".booking-outbox")))
    }

    /// Create paths with a custom root directory (useful for testing).
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("outbox.db"),
            root,
        }
    }

    /// Ensure the root directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), OutboxError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                OutboxError::Config(format!(
                    "Failed to create directory {}: {e}",
                    self.root.display()
                ))
            })?;
        }

        Ok(())
    }
}
