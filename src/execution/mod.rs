//! Hand-off of operation batches to the single host execution context.

pub mod bridge;
pub mod handle;
pub mod queue;

pub use bridge::{HostBridge, HostState};
pub use handle::{BatchHandle, BatchOutcome, StepFailure};
pub use queue::{OperationQueue, QueuedOperation};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to spawn host worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("host worker is no longer running")]
    WorkerGone,
    #[error("batch was cancelled before it started")]
    Cancelled,
    #[error("host call panicked: {0}")]
    Panicked(String),
}
