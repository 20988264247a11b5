//! Persisted form drafts, one per form.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::OutboxError;
use crate::storage::Database;

/// A saved form-in-progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Draft {
    pub form: String,
    pub data: Value,
    pub saved_at: DateTime<Utc>,
}

/// Outcome of looking for a draft to resume.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftLoad {
    /// Nothing saved for this form.
    None,
    /// A recent draft the user can pick up again.
    Resumable(Draft),
    /// A draft older than the age limit; it has been deleted.
    Expired { saved_at: DateTime<Utc> },
}

/// Whether a draft is worth keeping: any non-blank string, non-zero number
/// or `true`, at any depth.
#[must_use]
pub fn has_meaningful_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() > 0.0),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => items.iter().any(has_meaningful_content),
        Value::Object(fields) => fields.values().any(has_meaningful_content),
    }
}

/// Draft storage for a single form.
pub struct DraftStore {
    db: Arc<Database>,
    form: String,
    max_age: chrono::Duration,
}

impl DraftStore {
    #[must_use]
    pub fn new(db: Arc<Database>, form: impl Into<String>, max_age: chrono::Duration) -> Self {
        Self {
            db,
            form: form.into(),
            max_age,
        }
    }

    /// Form this store is keyed on.
    #[must_use]
    pub fn form(&self) -> &str {
        &self.form
    }

    /// Replace the saved draft. Empty forms are not saved.
    ///
    /// Returns whether anything was written.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the draft cannot be written.
    pub fn save_draft(&self, data: &Value) -> Result<bool, OutboxError> {
        if !has_meaningful_content(data) {
            debug!(form = %self.form, "Draft has no content, not saving");
            return Ok(false);
        }

        self.db
            .connection()
            .execute(
                r"INSERT INTO drafts (form, data, saved_at) VALUES (?1, ?2, ?3)
                  ON CONFLICT(form) DO UPDATE SET data = excluded.data, saved_at = excluded.saved_at",
                params![
                    self.form,
                    data.to_string(),
                    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
                ],
            )
            .map_err(|e| OutboxError::Persistence(format!("Failed to save draft: {e}")))?;

        debug!(form = %self.form, "Draft saved");
        Ok(true)
    }

    /// Delete the saved draft.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the delete fails.
    pub fn clear_draft(&self) -> Result<bool, OutboxError> {
        let rows = self
            .db
            .connection()
            .execute("DELETE FROM drafts WHERE form = ?1", [&self.form])
            .map_err(|e| OutboxError::Persistence(format!("Failed to clear draft: {e}")))?;

        Ok(rows > 0)
    }

    /// Whether a draft is stored, expired or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn has_draft(&self) -> Result<bool, OutboxError> {
        Ok(self.last_saved_at()?.is_some())
    }

    /// When the draft was last written.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn last_saved_at(&self) -> Result<Option<DateTime<Utc>>, OutboxError> {
        Ok(self.read()?.map(|draft| draft.saved_at))
    }

    /// Decide whether the stored draft can be resumed. Expired drafts are
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be read or deleted.
    pub fn load(&self) -> Result<DraftLoad, OutboxError> {
        let Some(draft) = self.read()? else {
            return Ok(DraftLoad::None);
        };

        if Utc::now() - draft.saved_at > self.max_age {
            self.clear_draft()?;
            info!(form = %self.form, saved_at = %draft.saved_at, "Expired draft discarded");
            return Ok(DraftLoad::Expired {
                saved_at: draft.saved_at,
            });
        }

        Ok(DraftLoad::Resumable(draft))
    }

    fn read(&self) -> Result<Option<Draft>, OutboxError> {
        let row: Option<(String, String)> = self
            .db
            .connection()
            .query_row(
                "SELECT data, saved_at FROM drafts WHERE form = ?1",
                [&self.form],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| OutboxError::Persistence(format!("Failed to read draft: {e}")))?;

        let Some((data, saved_at)) = row else {
            return Ok(None);
        };

        let saved_at = DateTime::parse_from_rfc3339(&saved_at)
            .map_err(|e| OutboxError::Parse(format!("Invalid draft timestamp: {e}")))?
            .with_timezone(&Utc);

        Ok(Some(Draft {
            form: self.form.clone(),
            data: serde_json::from_str(&data)?,
            saved_at,
        }))
    }
}
