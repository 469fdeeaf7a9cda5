//! Error types for the batching system.

use thiserror::Error;

/// Result type alias using the microbatch error type.
pub type Result<T> = std::result::Result<T, MicrobatchError>;

/// Main error type for the batching system.
#[derive(Error, Debug)]
pub enum MicrobatchError {
    /// The caller's deadline elapsed before a result was observed.
    ///
    /// The underlying work item is still processed; only this caller's wait
    /// is over. Recoverable by the caller (retry or surface upstream).
    #[error("result for item {0} took longer than the configured deadline")]
    Timeout(i64),

    /// Validation error (e.g., empty input string)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Coordinator is shutting down (or has shut down); no new work accepted
    #[error("Coordinator is shutting down")]
    Shutdown,

    /// The processing stage failed for an entire batch.
    ///
    /// The simulated processor never produces this; a real compute stage can.
    /// Every caller in the affected batch observes the same failure.
    #[error("Batch processing failed: {0}")]
    Processing(String),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
