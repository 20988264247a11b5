//! Drains the operation queue against the remote write API.
//!
//! One operation is in flight at a time, strictly in queue order. A
//! retryable failure puts the head operation back to `pending` and the
//! processor waits out its backoff before dispatching it again, so nothing
//! overtakes an operation that is waiting.
//!
//! A dispatched call is never abandoned: a stop request is only honoured
//! between operations or during a backoff wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::classify::classify;
use super::queue::OperationQueue;
use super::retry::RetryPolicy;
use crate::error::OutboxError;
use crate::remote::RemoteWriteApi;

/// Engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Draining,
}

/// Why a drain pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainStop {
    /// No pending operations remain.
    #[default]
    QueueEmpty,
    /// Connectivity is down, or dropped during a backoff wait.
    Offline,
    /// Another drain was already running; this request was a no-op.
    AlreadyDraining,
    /// An operation is still marked in flight.
    Blocked,
    /// A stop was requested; the last dispatched call resolved first.
    Stopped,
}

/// Summary of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    pub stop: DrainStop,
}

impl DrainReport {
    const fn stopped(stop: DrainStop) -> Self {
        Self {
            completed: 0,
            retried: 0,
            failed: 0,
            stop,
        }
    }
}

/// Resets the draining flag however the pass ends, including cancellation.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Dispatches queued operations one at a time.
pub struct SyncProcessor {
    queue: Arc<OperationQueue>,
    remote: Arc<dyn RemoteWriteApi>,
    network: watch::Receiver<bool>,
    policy: RetryPolicy,
    draining: AtomicBool,
}

impl SyncProcessor {
    #[must_use]
    pub fn new(
        queue: Arc<OperationQueue>,
        remote: Arc<dyn RemoteWriteApi>,
        network: watch::Receiver<bool>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            remote,
            network,
            policy,
            draining: AtomicBool::new(false),
        }
    }

    /// Current engine state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        if self.draining.load(Ordering::Acquire) {
            EngineState::Draining
        } else {
            EngineState::Idle
        }
    }

    fn is_online(&self) -> bool {
        *self.network.borrow()
    }

    /// Retry policy in use.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Process pending operations until the queue is empty or connectivity
    /// is lost.
    ///
    /// Calling this while a drain is already running returns immediately
    /// with [`DrainStop::AlreadyDraining`].
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read or updated. Remote
    /// failures are recorded on the operation, not returned.
    pub async fn drain(&self) -> Result<DrainReport, OutboxError> {
        self.drain_until(&CancellationToken::new()).await
    }

    /// [`drain`](Self::drain), ending early once `stop` is cancelled.
    ///
    /// `stop` is checked before each dispatch and races only the backoff
    /// wait, so an operation in `syncing` always gets its result recorded.
    ///
    /// # Errors
    ///
    /// Same as [`drain`](Self::drain).
    #[instrument(skip_all)]
    pub async fn drain_until(&self, stop: &CancellationToken) -> Result<DrainReport, OutboxError> {
        if !self.is_online() {
            debug!("Offline, not draining");
            return Ok(DrainReport::stopped(DrainStop::Offline));
        }

        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain already in progress");
            return Ok(DrainReport::stopped(DrainStop::AlreadyDraining));
        }
        let _guard = DrainGuard(&self.draining);

        let mut report = DrainReport::default();
        loop {
            if stop.is_cancelled() {
                report.stop = DrainStop::Stopped;
                break;
            }

            if !self.is_online() {
                report.stop = DrainStop::Offline;
                break;
            }

            let Some(operation) = self.queue.next_pending()? else {
                report.stop = DrainStop::QueueEmpty;
                break;
            };

            if !self.queue.mark_syncing(&operation.id)? {
                warn!(operation_id = %operation.id, "Another operation is in flight");
                report.stop = DrainStop::Blocked;
                break;
            }

            let attempts = operation.attempts + 1;
            debug!(operation_id = %operation.id, attempts, "Dispatching operation");

            match self
                .remote
                .submit(operation.operation_type, &operation.payload, &operation.id)
                .await
            {
                Ok(receipt) => {
                    if self.queue.mark_completed(&operation.id, &receipt)? {
                        info!(
                            operation_id = %operation.id,
                            reference = %receipt.reference,
                            attempts,
                            "Operation confirmed"
                        );
                        report.completed += 1;
                    }
                },
                Err(err) => {
                    let class = classify(&err, self.is_online());
                    let reason = err.reason();

                    if class.is_retryable() && self.policy.should_retry(attempts) {
                        self.queue.mark_failed(&operation.id, &reason, true)?;
                        report.retried += 1;

                        let delay = self.policy.delay_for(attempts);
                        warn!(
                            operation_id = %operation.id,
                            attempts,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %err,
                            "Dispatch failed, backing off"
                        );

                        if let Some(interrupted) = self.backoff(delay, stop).await {
                            info!(reason = ?interrupted, "Backoff interrupted");
                            report.stop = interrupted;
                            break;
                        }
                    } else {
                        self.queue.mark_failed(&operation.id, &reason, false)?;
                        report.failed += 1;
                        error!(
                            operation_id = %operation.id,
                            attempts,
                            error = %err,
                            "Operation failed terminally"
                        );
                    }
                },
            }
        }

        debug!(?report, "Drain finished");
        Ok(report)
    }

    /// Wait out a backoff delay. Returns why the wait was cut short, if it
    /// was.
    async fn backoff(&self, delay: Duration, stop: &CancellationToken) -> Option<DrainStop> {
        tokio::select! {
            () = tokio::time::sleep(delay) => None,
            () = went_offline(self.network.clone()) => Some(DrainStop::Offline),
            () = stop.cancelled() => Some(DrainStop::Stopped),
        }
    }
}

/// Resolves once the watched state reads offline.
async fn went_offline(mut network: watch::Receiver<bool>) {
    loop {
        if !*network.borrow_and_update() {
            return;
        }
        if network.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Background task that drains on startup, on every online transition and
/// on every queue change.
pub struct SyncWorker {
    processor: Arc<SyncProcessor>,
    network: watch::Receiver<bool>,
    queue: watch::Receiver<u64>,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl SyncWorker {
    #[must_use]
    pub fn new(
        processor: Arc<SyncProcessor>,
        network: watch::Receiver<bool>,
        queue: watch::Receiver<u64>,
    ) -> Self {
        Self {
            processor,
            network,
            queue,
            cancellation: CancellationToken::new(),
            task_handle: None,
            join_timeout: Duration::from_secs(5),
        }
    }

    /// Whether the background task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Bound on how long [`stop`](Self::stop) waits for an in-flight call.
    #[must_use]
    pub const fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }

    /// Spawn the background task. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the worker is already running.
    pub fn start(&mut self) -> Result<(), OutboxError> {
        if self.is_running() {
            return Err(OutboxError::InvalidState(
                "Sync worker already running".to_string(),
            ));
        }

        self.cancellation = CancellationToken::new();

        let processor = Arc::clone(&self.processor);
        let network = self.network.clone();
        let queue = self.queue.clone();
        let cancel = self.cancellation.clone();

        self.task_handle = Some(tokio::spawn(async move {
            Self::run(processor, network, queue, cancel).await;
        }));

        info!("Sync worker started");
        Ok(())
    }

    /// Ask the background task to stop and wait for it to finish. A call
    /// already dispatched runs to completion first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the task panicked or did not stop in time.
    pub async fn stop(&mut self) -> Result<(), OutboxError> {
        let Some(handle) = self.task_handle.take() else {
            return Ok(());
        };

        self.cancellation.cancel();

        match tokio::time::timeout(self.join_timeout, handle).await {
            Ok(Ok(())) => {
                info!("Sync worker stopped");
                Ok(())
            },
            Ok(Err(e)) => {
                warn!(error = %e, "Sync worker task panicked");
                Err(OutboxError::InvalidState(
                    "Sync worker task panicked".to_string(),
                ))
            },
            Err(_) => {
                warn!("Sync worker did not stop within timeout");
                Err(OutboxError::InvalidState(
                    "Sync worker stop timed out".to_string(),
                ))
            },
        }
    }

    async fn run(
        processor: Arc<SyncProcessor>,
        mut network: watch::Receiver<bool>,
        mut queue: watch::Receiver<u64>,
        cancel: CancellationToken,
    ) {
        network.borrow_and_update();
        queue.borrow_and_update();

        while !cancel.is_cancelled() {
            Self::drain_logged(&processor, &cancel).await;

            tokio::select! {
                () = cancel.cancelled() => break,
                changed = network.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *network.borrow_and_update();
                    info!(online, "Connectivity changed");
                },
                changed = queue.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    queue.borrow_and_update();
                },
            }
        }

        debug!("Sync worker loop exited");
    }

    async fn drain_logged(processor: &SyncProcessor, cancel: &CancellationToken) {
        match processor.drain_until(cancel).await {
            Ok(report) if report.completed + report.failed + report.retried > 0 => {
                info!(
                    completed = report.completed,
                    failed = report.failed,
                    retried = report.retried,
                    "Drain pass finished"
                );
            },
            Ok(_) => {},
            Err(e) => error!(error = %e, "Drain pass aborted"),
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;
    use crate::features::sync::{EnqueueMetadata, OperationStatus, OperationType};
    use crate::remote::{MockRemoteWriteApi, RemoteError, RemoteReceipt};
    use crate::storage::Database;

    fn queue() -> Arc<OperationQueue> {
        Arc::new(OperationQueue::with_database(Arc::new(
            Database::open_in_memory().unwrap(),
        )))
    }

    fn enqueue(queue: &OperationQueue, n: u32) -> String {
        queue
            .enqueue(
                OperationType::CreateBooking,
                json!({"n": n}),
                EnqueueMetadata::default(),
            )
            .unwrap()
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(60))
            .unwrap()
            .with_jitter_factor(0.0)
    }

    fn ok_receipt(key: &str) -> Result<RemoteReceipt, RemoteError> {
        Ok(RemoteReceipt {
            reference: format!("BK-{}", &key[..6]),
            body: json!({"id": key}),
        })
    }

    #[tokio::test]
    async fn test_drain_completes_in_order() {
        let queue = queue();
        let ids: Vec<_> = (0..3).map(|n| enqueue(&queue, n)).collect();

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_by_mock = Arc::clone(&seen);
        let mut remote = MockRemoteWriteApi::new();
        remote.expect_submit().times(3).returning(move |_, _, key| {
            seen_by_mock.lock().push(key.to_string());
            ok_receipt(key)
        });

        let (_tx, rx) = watch::channel(true);
        let processor = SyncProcessor::new(Arc::clone(&queue), Arc::new(remote), rx, policy());

        let report = processor.drain().await.unwrap();
        assert_eq!(report.completed, 3);
        assert_eq!(report.stop, DrainStop::QueueEmpty);
        assert_eq!(*seen.lock(), ids);
        assert_eq!(processor.state(), EngineState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_then_success() {
        let queue = queue();
        let id = enqueue(&queue, 1);

        let mut calls = 0;
        let mut remote = MockRemoteWriteApi::new();
        remote.expect_submit().times(4).returning(move |_, _, key| {
            calls += 1;
            if calls <= 3 {
                Err(RemoteError::Timeout(Duration::from_secs(15)))
            } else {
                ok_receipt(key)
            }
        });

        let (_tx, rx) = watch::channel(true);
        let processor = SyncProcessor::new(Arc::clone(&queue), Arc::new(remote), rx, policy());

        let report = processor.drain().await.unwrap();
        assert_eq!(report.retried, 3);
        assert_eq!(report.completed, 1);

        let op = queue.get(&id).unwrap().unwrap();
        assert_eq!(op.status, OperationStatus::Completed);
        assert_eq!(op.attempts, 4);
    }

    #[tokio::test]
    async fn test_validation_error_fails_immediately() {
        let queue = queue();
        let first = enqueue(&queue, 1);
        let second = enqueue(&queue, 2);

        let mut remote = MockRemoteWriteApi::new();
        remote
            .expect_submit()
            .times(2)
            .returning(move |_, payload, key| {
                if payload["n"] == 1 {
                    Err(RemoteError::Validation("pickup date is in the past".into()))
                } else {
                    ok_receipt(key)
                }
            });

        let (_tx, rx) = watch::channel(true);
        let processor = SyncProcessor::new(Arc::clone(&queue), Arc::new(remote), rx, policy());

        let report = processor.drain().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 1);

        let failed = queue.get(&first).unwrap().unwrap();
        assert_eq!(failed.status, OperationStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert_eq!(failed.error.as_deref(), Some("pickup date is in the past"));
        assert_eq!(
            queue.get(&second).unwrap().unwrap().status,
            OperationStatus::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_exhaustion_is_terminal() {
        let queue = queue();
        let id = enqueue(&queue, 1);

        let mut remote = MockRemoteWriteApi::new();
        remote
            .expect_submit()
            .times(5)
            .returning(|_, _, _| Err(RemoteError::Network("connection refused".into())));

        let (_tx, rx) = watch::channel(true);
        let processor = SyncProcessor::new(Arc::clone(&queue), Arc::new(remote), rx, policy());

        let report = processor.drain().await.unwrap();
        assert_eq!(report.retried, 4);
        assert_eq!(report.failed, 1);

        let op = queue.get(&id).unwrap().unwrap();
        assert_eq!(op.status, OperationStatus::Failed);
        assert_eq!(op.attempts, 5);
    }

    #[tokio::test]
    async fn test_offline_drain_is_noop() {
        let queue = queue();
        enqueue(&queue, 1);

        let mut remote = MockRemoteWriteApi::new();
        remote.expect_submit().never();

        let (_tx, rx) = watch::channel(false);
        let processor = SyncProcessor::new(Arc::clone(&queue), Arc::new(remote), rx, policy());

        let report = processor.drain().await.unwrap();
        assert_eq!(report.stop, DrainStop::Offline);
        assert!(queue.has_pending().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_going_offline_during_backoff_stops_drain() {
        let queue = queue();
        let first = enqueue(&queue, 1);
        enqueue(&queue, 2);

        let mut remote = MockRemoteWriteApi::new();
        remote
            .expect_submit()
            .times(1)
            .returning(|_, _, _| Err(RemoteError::Server {
                status: 503,
                message: "unavailable".into(),
            }));

        let (tx, rx) = watch::channel(true);
        let processor = SyncProcessor::new(
            Arc::clone(&queue),
            Arc::new(remote),
            rx,
            RetryPolicy::new(5, Duration::from_secs(30), Duration::from_secs(60))
                .unwrap()
                .with_jitter_factor(0.0),
        );

        let drain = processor.drain();
        let flip = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send_replace(false);
        };
        let (report, ()) = tokio::join!(drain, flip);

        let report = report.unwrap();
        assert_eq!(report.stop, DrainStop::Offline);
        assert_eq!(report.retried, 1);

        let head = queue.next_pending().unwrap().unwrap();
        assert_eq!(head.id, first);
        assert_eq!(head.attempts, 1);
    }

    /// Confirms every write after a fixed delay, counting calls as they
    /// start and finish.
    struct SlowRemote {
        delay: Duration,
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    impl SlowRemote {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                started: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl RemoteWriteApi for SlowRemote {
        async fn submit(
            &self,
            _operation_type: OperationType,
            _payload: &serde_json::Value,
            idempotency_key: &str,
        ) -> Result<RemoteReceipt, RemoteError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            ok_receipt(idempotency_key)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_drain_is_noop() {
        let queue = queue();
        let id = enqueue(&queue, 1);
        let remote = SlowRemote::new(Duration::from_secs(2));

        let (_tx, rx) = watch::channel(true);
        let processor = SyncProcessor::new(Arc::clone(&queue), remote.clone(), rx, policy());

        let second = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(processor.state(), EngineState::Draining);
            processor.drain().await
        };
        let (first, second) = tokio::join!(processor.drain(), second);

        assert_eq!(second.unwrap().stop, DrainStop::AlreadyDraining);
        assert_eq!(first.unwrap().completed, 1);
        assert_eq!(remote.started.load(Ordering::SeqCst), 1);
        assert_eq!(
            queue.get(&id).unwrap().unwrap().status,
            OperationStatus::Completed
        );
        assert_eq!(processor.state(), EngineState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_dispatched_call() {
        let queue = queue();
        let first = enqueue(&queue, 1);
        let second = enqueue(&queue, 2);
        let remote = SlowRemote::new(Duration::from_secs(2));

        let (_tx, rx) = watch::channel(true);
        let processor = SyncProcessor::new(Arc::clone(&queue), remote.clone(), rx, policy());
        let stop = CancellationToken::new();

        let cancel = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stop.cancel();
        };
        let (report, ()) = tokio::join!(processor.drain_until(&stop), cancel);

        let report = report.unwrap();
        assert_eq!(report.stop, DrainStop::Stopped);
        assert_eq!(report.completed, 1);
        assert_eq!(remote.finished.load(Ordering::SeqCst), 1);
        assert_eq!(
            queue.get(&first).unwrap().unwrap().status,
            OperationStatus::Completed
        );
        assert_eq!(
            queue.get(&second).unwrap().unwrap().status,
            OperationStatus::Pending
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_backoff() {
        let queue = queue();
        let id = enqueue(&queue, 1);

        let mut remote = MockRemoteWriteApi::new();
        remote
            .expect_submit()
            .times(1)
            .returning(|_, _, _| Err(RemoteError::Network("connection reset".into())));

        let (_tx, rx) = watch::channel(true);
        let processor = SyncProcessor::new(
            Arc::clone(&queue),
            Arc::new(remote),
            rx,
            RetryPolicy::new(5, Duration::from_secs(30), Duration::from_secs(60))
                .unwrap()
                .with_jitter_factor(0.0),
        );
        let stop = CancellationToken::new();

        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stop.cancel();
        };
        let (report, ()) = tokio::join!(processor.drain_until(&stop), cancel);

        assert_eq!(report.unwrap().stop, DrainStop::Stopped);
        let op = queue.get(&id).unwrap().unwrap();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_stop_lets_call_finish() {
        let queue = queue();
        let id = enqueue(&queue, 1);
        let remote = SlowRemote::new(Duration::from_secs(2));

        let (_tx, rx) = watch::channel(true);
        let processor = Arc::new(SyncProcessor::new(
            Arc::clone(&queue),
            remote.clone(),
            rx.clone(),
            policy(),
        ));

        let mut worker = SyncWorker::new(processor, rx, queue.subscribe());
        worker.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(remote.started.load(Ordering::SeqCst), 1);

        worker.stop().await.unwrap();

        assert_eq!(remote.finished.load(Ordering::SeqCst), 1);
        assert_eq!(
            queue.get(&id).unwrap().unwrap().status,
            OperationStatus::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_drains_when_connectivity_returns() {
        let queue = queue();
        let id = enqueue(&queue, 1);

        let mut remote = MockRemoteWriteApi::new();
        remote
            .expect_submit()
            .times(1)
            .returning(|_, _, key| ok_receipt(key));

        let (tx, rx) = watch::channel(false);
        let processor = Arc::new(SyncProcessor::new(
            Arc::clone(&queue),
            Arc::new(remote),
            rx.clone(),
            policy(),
        ));

        let mut worker = SyncWorker::new(processor, rx, queue.subscribe());
        worker.start().unwrap();
        assert!(worker.start().is_err());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(queue.has_pending().unwrap());

        tx.send_replace(true);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            queue.get(&id).unwrap().unwrap().status,
            OperationStatus::Completed
        );

        worker.stop().await.unwrap();
        assert!(!worker.is_running());
    }
}
