//! Connectivity state with flap suppression.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::ScheduledTask;
use crate::remote::ConnectivityProbe;

/// Default window a raw connectivity change must hold before it is published.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Single source of truth for online/offline state.
///
/// Raw reports go through [`report`](Self::report); subscribers only see a
/// change once it has held for the debounce window. A report that returns to
/// the published state inside the window cancels the pending change.
pub struct NetworkMonitor {
    published: Arc<watch::Sender<bool>>,
    debounce: Duration,
    pending: ScheduledTask,
}

impl NetworkMonitor {
    #[must_use]
    pub fn new(initial: bool, debounce: Duration) -> Self {
        let (published, _) = watch::channel(initial);
        Self {
            published: Arc::new(published),
            debounce,
            pending: ScheduledTask::new(),
        }
    }

    /// Seed the initial state from a connectivity probe.
    pub async fn from_probe(probe: &dyn ConnectivityProbe, debounce: Duration) -> Self {
        let online = probe.is_reachable().await;
        info!(online, "Initial connectivity");
        Self::new(online, debounce)
    }

    /// Current published state.
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.published.borrow()
    }

    /// Receiver of published transitions. Dropping it unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.published.subscribe()
    }

    /// Whether a change is waiting out the debounce window.
    #[must_use]
    pub fn has_pending_change(&self) -> bool {
        self.pending.is_armed()
    }

    /// Feed a raw connectivity observation.
    pub fn report(&self, online: bool) {
        if online == self.is_online() {
            if self.pending.cancel() {
                debug!(online, "Connectivity blip suppressed");
            }
            return;
        }

        if self.debounce.is_zero() {
            publish(&self.published, online);
            return;
        }

        // Two states only: an armed change already targets `online`.
        if self.pending.is_armed() {
            return;
        }

        let published = Arc::clone(&self.published);
        self.pending.arm(self.debounce, async move {
            publish(&published, online);
        });
    }

    /// Publish a state immediately, skipping the debounce window.
    pub fn force(&self, online: bool) {
        self.pending.cancel();
        publish(&self.published, online);
    }

    /// Ask the probe again and report what it says.
    pub async fn recheck(&self, probe: &dyn ConnectivityProbe) {
        let online = probe.is_reachable().await;
        self.report(online);
    }
}

fn publish(sender: &watch::Sender<bool>, online: bool) {
    let changed = sender.send_if_modified(|state| {
        if *state == online {
            false
        } else {
            *state = online;
            true
        }
    });

    if changed {
        if online {
            info!("Connectivity restored");
        } else {
            warn!("Connectivity lost");
        }
    }
}
