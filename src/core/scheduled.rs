//! Cancellable one-shot timers.
//!
//! A [`ScheduledTask`] holds at most one armed job. Arming again replaces the
//! previous job, which is how debouncing falls out: every new event pushes the
//! deadline back and only the last one fires.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// A slot for a single delayed job (arm / cancel / fire-once).
#[derive(Debug, Default)]
pub struct ScheduledTask {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduledTask {
    /// Create an empty, unarmed task slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` once after `delay`, cancelling any job armed earlier.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&self, delay: Duration, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
        });

        if let Some(previous) = self.handle.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Cancel the armed job.
    ///
    /// Returns `true` if a job was waiting and will now never run.
    pub fn cancel(&self) -> bool {
        self.handle.lock().take().is_some_and(|handle| {
            let waiting = !handle.is_finished();
            handle.abort();
            waiting
        })
    }

    /// Whether a job is armed and has not fired yet.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
