//! Debounced draft auto-save.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use super::store::DraftStore;
use crate::core::ScheduledTask;
use crate::error::OutboxError;

/// Saves the latest form state once edits pause for the debounce window.
pub struct AutoSaver {
    store: Arc<DraftStore>,
    debounce: Duration,
    timer: ScheduledTask,
    latest: Arc<Mutex<Option<Value>>>,
}

impl AutoSaver {
    #[must_use]
    pub fn new(store: Arc<DraftStore>, debounce: Duration) -> Self {
        Self {
            store,
            debounce,
            timer: ScheduledTask::new(),
            latest: Arc::new(Mutex::new(None)),
        }
    }

    /// Record an edit; the save happens after `debounce` without further
    /// edits. Must be called inside a tokio runtime.
    pub fn on_edit(&self, data: Value) {
        *self.latest.lock() = Some(data);

        let store = Arc::clone(&self.store);
        let latest = Arc::clone(&self.latest);
        self.timer.arm(self.debounce, async move {
            let data = latest.lock().take();
            if let Some(data) = data {
                if let Err(e) = store.save_draft(&data) {
                    warn!(form = store.form(), error = %e, "Draft auto-save failed");
                }
            }
        });
    }

    /// Whether an edit is waiting to be saved.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.latest.lock().is_some()
    }

    /// Save any unsaved edit now.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the save fails.
    pub fn flush(&self) -> Result<bool, OutboxError> {
        self.timer.cancel();
        let data = self.latest.lock().take();
        match data {
            Some(data) => self.store.save_draft(&data),
            None => Ok(false),
        }
    }

    /// Drop unsaved edits and the stored draft, e.g. after submission.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the draft cannot be deleted.
    pub fn discard(&self) -> Result<(), OutboxError> {
        self.timer.cancel();
        self.latest.lock().take();
        self.store.clear_draft()?;
        Ok(())
    }
}
