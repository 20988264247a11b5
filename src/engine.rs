//! The assembled outbox: queue, processor, monitor and status projection.
//!
//! [`Outbox`] is built explicitly with [`Outbox::init`] and torn down with
//! [`Outbox::shutdown`]; nothing here is global.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::OutboxError;
use crate::features::drafts::{AutoSaver, DraftStore};
use crate::features::network::NetworkMonitor;
use crate::features::sync::{
    classify, placeholder_reference, DrainReport, EnqueueMetadata, OperationQueue,
    OperationType, OperationView, StatusStore, SyncProcessor, SyncWorker,
};
use crate::remote::{ConnectivityProbe, RemoteReceipt, RemoteWriteApi};
use crate::storage::Database;

/// Extra time `shutdown` allows beyond one request timeout.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Result of [`Outbox::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The service accepted the write directly.
    Confirmed(RemoteReceipt),
    /// The write was queued for later; `reference` is the placeholder to show.
    Queued { id: String, reference: String },
}

impl SubmitOutcome {
    /// Reference to show the user right away.
    #[must_use]
    pub fn reference(&self) -> &str {
        match self {
            Self::Confirmed(receipt) => &receipt.reference,
            Self::Queued { reference, .. } => reference,
        }
    }
}

/// Offline-capable write gateway.
pub struct Outbox {
    config: Config,
    db: Arc<Database>,
    queue: Arc<OperationQueue>,
    remote: Arc<dyn RemoteWriteApi>,
    network: Arc<NetworkMonitor>,
    processor: Arc<SyncProcessor>,
    status: StatusStore,
    worker: SyncWorker,
}

impl Outbox {
    /// Wire up the engine over an open database.
    ///
    /// Operations left in flight by a previous run are returned to the
    /// queue, completed operations past retention are pruned, and the
    /// connectivity state is seeded from `probe`. Background sync is not
    /// started; see [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be recovered or the retry
    /// settings are invalid.
    #[instrument(skip_all)]
    pub async fn init(
        config: Config,
        db: Arc<Database>,
        remote: Arc<dyn RemoteWriteApi>,
        probe: &dyn ConnectivityProbe,
    ) -> Result<Self, OutboxError> {
        let policy = config.sync.retry_policy()?;
        let queue = Arc::new(OperationQueue::with_database(Arc::clone(&db)));

        queue.recover_interrupted()?;
        queue.prune_completed(config.sync.completed_retention())?;

        let network = Arc::new(NetworkMonitor::from_probe(probe, config.network.debounce()).await);

        let processor = Arc::new(SyncProcessor::new(
            Arc::clone(&queue),
            Arc::clone(&remote),
            network.subscribe(),
            policy,
        ));
        let worker = SyncWorker::new(
            Arc::clone(&processor),
            network.subscribe(),
            queue.subscribe(),
        )
        .with_join_timeout(config.remote.timeout() + SHUTDOWN_GRACE);
        let status = StatusStore::new(Arc::clone(&queue));

        info!(online = network.is_online(), "Outbox initialised");

        Ok(Self {
            config,
            db,
            queue,
            remote,
            network,
            processor,
            status,
            worker,
        })
    }

    /// Start background sync.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if it is already running.
    pub fn start(&mut self) -> Result<(), OutboxError> {
        self.worker.start()
    }

    /// Stop background sync and release the engine.
    ///
    /// Waits for a dispatched write to resolve and be recorded before
    /// returning, so it is never replayed by the next run.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker does not stop cleanly or the queue
    /// cannot be updated. After a failed stop the in-flight row is left
    /// `syncing` for the next [`init`](Self::init) to recover.
    pub async fn shutdown(mut self) -> Result<(), OutboxError> {
        self.worker.stop().await?;

        // A `sync_now` future dropped by its caller mid-call leaves its row `syncing`.
        self.queue.recover_interrupted()?;
        info!("Outbox shut down");
        Ok(())
    }

    /// Attempt a write directly, queueing it when that is not possible.
    ///
    /// The write is queued if the device is offline, if earlier writes are
    /// still waiting (so it cannot overtake them), or if the direct attempt
    /// fails with a retryable error. The same id serves as idempotency key
    /// for the direct attempt and the queued replay.
    ///
    /// # Errors
    ///
    /// Returns `Remote` for a terminal rejection (nothing is queued) and a
    /// persistence error if queueing fails.
    #[instrument(skip(self, payload, metadata))]
    pub async fn submit(
        &self,
        operation_type: OperationType,
        payload: Value,
        metadata: EnqueueMetadata,
    ) -> Result<SubmitOutcome, OutboxError> {
        let id = Uuid::new_v4().simple().to_string();

        if !self.network.is_online() {
            info!("Offline, queueing write");
            return self.queue_write(id, operation_type, payload, metadata);
        }

        let stats = self.queue.stats()?;
        if stats.pending + stats.syncing > 0 {
            info!(waiting = stats.pending + stats.syncing, "Earlier writes queued, queueing behind them");
            return self.queue_write(id, operation_type, payload, metadata);
        }

        match self.remote.submit(operation_type, &payload, &id).await {
            Ok(receipt) => {
                info!(reference = %receipt.reference, "Write confirmed directly");
                Ok(SubmitOutcome::Confirmed(receipt))
            },
            Err(err) if classify(&err, self.network.is_online()).is_retryable() => {
                warn!(error = %err, "Direct write failed, queueing");
                self.queue_write(id, operation_type, payload, metadata)
            },
            Err(err) => Err(err.into()),
        }
    }

    /// [`submit`](Self::submit), clearing the form's draft once the write
    /// is confirmed or queued.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit); the draft is kept on error.
    pub async fn submit_form(
        &self,
        form: &str,
        operation_type: OperationType,
        payload: Value,
        metadata: EnqueueMetadata,
    ) -> Result<SubmitOutcome, OutboxError> {
        let outcome = self.submit(operation_type, payload, metadata).await?;
        self.drafts(form).clear_draft()?;
        Ok(outcome)
    }

    fn queue_write(
        &self,
        id: String,
        operation_type: OperationType,
        payload: Value,
        metadata: EnqueueMetadata,
    ) -> Result<SubmitOutcome, OutboxError> {
        let id = self
            .queue
            .enqueue_with_id(id, operation_type, payload, metadata)?;
        let reference = placeholder_reference(&id);
        Ok(SubmitOutcome::Queued { id, reference })
    }

    /// Queue a write without trying it directly.
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
        self.queue.enqueue(operation_type, payload, metadata)
    }

    /// Run one drain pass now.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read or updated.
    pub async fn sync_now(&self) -> Result<DrainReport, OutboxError> {
        self.processor.drain().await
    }

    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn list_operations(&self) -> Result<Vec<OperationView>, OutboxError> {
        self.status.list_operations()
    }

    /// # Errors
    ///
    /// Returns `NotFound` or `InvalidState` for operations that are not failed.
    pub fn retry(&self, id: &str) -> Result<(), OutboxError> {
        self.status.retry(id)
    }

    /// # Errors
    ///
    /// Returns `InFlight` for the operation being synced.
    pub fn discard(&self, id: &str) -> Result<(), OutboxError> {
        self.status.discard(id)
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.network.is_online()
    }

    /// Connectivity transitions; dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe_online(&self) -> watch::Receiver<bool> {
        self.network.subscribe()
    }

    /// Draft storage for a form.
    #[must_use]
    pub fn drafts(&self, form: &str) -> DraftStore {
        DraftStore::new(Arc::clone(&self.db), form, self.config.drafts.max_age())
    }

    /// Debounced auto-saver for a form.
    #[must_use]
    pub fn autosaver(&self, form: &str) -> AutoSaver {
        AutoSaver::new(
            Arc::new(self.drafts(form)),
            self.config.drafts.autosave_debounce(),
        )
    }

    #[must_use]
    pub const fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    #[must_use]
    pub const fn queue(&self) -> &Arc<OperationQueue> {
        &self.queue
    }

    #[must_use]
    pub const fn status(&self) -> &StatusStore {
        &self.status
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::features::sync::OperationStatus;
    use crate::remote::{MockRemoteWriteApi, RemoteError};

    struct Probe(bool);

    #[async_trait]
    impl ConnectivityProbe for Probe {
        async fn is_reachable(&self) -> bool {
            self.0
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.network.debounce_ms = 0;
        config.sync.jitter_factor = 0.0;
        config
    }

    async fn outbox(remote: MockRemoteWriteApi, online: bool) -> Outbox {
        Outbox::init(
            config(),
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(remote),
            &Probe(online),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_online_confirms_directly() {
        let mut remote = MockRemoteWriteApi::new();
        remote.expect_submit().times(1).returning(|_, _, _| {
            Ok(RemoteReceipt {
                reference: "BK-1".into(),
                body: json!({}),
            })
        });
        let outbox = outbox(remote, true).await;

        let outcome = outbox
            .submit(OperationType::CreateBooking, json!({}), EnqueueMetadata::default())
            .await
            .unwrap();

        assert_eq!(outcome.reference(), "BK-1");
        assert!(outbox.list_operations().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_offline_queues_with_placeholder() {
        let mut remote = MockRemoteWriteApi::new();
        remote.expect_submit().never();
        let outbox = outbox(remote, false).await;

        let outcome = outbox
            .submit(OperationType::CreateBooking, json!({}), EnqueueMetadata::default())
            .await
            .unwrap();

        let SubmitOutcome::Queued { id, reference } = outcome else {
            panic!("expected queued outcome");
        };
        assert_eq!(reference, placeholder_reference(&id));
        assert_eq!(
            outbox.queue().get(&id).unwrap().unwrap().status,
            OperationStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_retryable_direct_failure_queues_same_id() {
        let seen = Arc::new(parking_lot::Mutex::new(String::new()));
        let seen_by_mock = Arc::clone(&seen);
        let mut remote = MockRemoteWriteApi::new();
        remote.expect_submit().times(1).returning(move |_, _, key| {
            *seen_by_mock.lock() = key.to_string();
            Err(RemoteError::Timeout(Duration::from_secs(15)))
        });
        let outbox = outbox(remote, true).await;

        let outcome = outbox
            .submit(OperationType::CancelBooking, json!({}), EnqueueMetadata::default())
            .await
            .unwrap();

        let SubmitOutcome::Queued { id, .. } = outcome else {
            panic!("expected queued outcome");
        };
        assert_eq!(*seen.lock(), id);
    }

    #[tokio::test]
    async fn test_terminal_direct_failure_is_not_queued() {
        let mut remote = MockRemoteWriteApi::new();
        remote
            .expect_submit()
            .times(1)
            .returning(|_, _, _| Err(RemoteError::Validation("bad date".into())));
        let outbox = outbox(remote, true).await;

        let err = outbox
            .submit(OperationType::CreateBooking, json!({}), EnqueueMetadata::default())
            .await
            .unwrap_err();

        assert!(matches!(err, OutboxError::Remote(RemoteError::Validation(_))));
        assert!(outbox.list_operations().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_queues_behind_waiting_writes() {
        let mut remote = MockRemoteWriteApi::new();
        remote.expect_submit().never();
        let outbox = outbox(remote, true).await;

        outbox
            .enqueue(OperationType::CreateCustomer, json!({}), EnqueueMetadata::default())
            .unwrap();
        let outcome = outbox
            .submit(OperationType::CreateBooking, json!({}), EnqueueMetadata::default())
            .await
            .unwrap();

        assert!(matches!(outcome, SubmitOutcome::Queued { .. }));
        assert_eq!(outbox.list_operations().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_submit_form_clears_draft() {
        let mut remote = MockRemoteWriteApi::new();
        remote.expect_submit().never();
        let outbox = outbox(remote, false).await;

        let drafts = outbox.drafts("booking");
        drafts.save_draft(&json!({"origin": "Hamburg"})).unwrap();

        outbox
            .submit_form(
                "booking",
                OperationType::CreateBooking,
                json!({"origin": "Hamburg"}),
                EnqueueMetadata::default(),
            )
            .await
            .unwrap();

        assert!(!drafts.has_draft().unwrap());
    }

    #[tokio::test]
    async fn test_init_recovers_interrupted_operation() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let queue = OperationQueue::with_database(Arc::clone(&db));
        let id = queue
            .enqueue(OperationType::CreateBooking, json!({}), EnqueueMetadata::default())
            .unwrap();
        queue.mark_syncing(&id).unwrap();

        let outbox = Outbox::init(config(), db, Arc::new(MockRemoteWriteApi::new()), &Probe(false))
            .await
            .unwrap();

        assert_eq!(
            outbox.queue().get(&id).unwrap().unwrap().status,
            OperationStatus::Pending
        );
        outbox.shutdown().await.unwrap();
    }
}
