//! Offline operation queue and sync engine.
//!
//! Writes that cannot reach the booking service are persisted as
//! [`PendingOperation`]s and replayed in order by the [`SyncProcessor`]
//! once connectivity returns.

mod classify;
mod operation;
mod processor;
mod queue;
mod retry;
mod status;

pub use classify::{classify, ErrorClass};
pub use operation::{
    placeholder_reference, EnqueueMetadata, OperationStatus, OperationType, PendingOperation,
    PLACEHOLDER_PREFIX,
};
pub use processor::{DrainReport, DrainStop, EngineState, SyncProcessor, SyncWorker};
pub use queue::{OperationQueue, QueueStats};
pub use retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
pub use status::{OperationView, StatusStore};
