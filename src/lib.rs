//! Micro-batching system that amortizes a fixed per-batch compute cost.
//!
//! This crate provides a coordinator that accepts submitted work items and
//! groups them into batches behind the scenes: a batch is flushed as soon as
//! the pending queue reaches a size threshold, or on a periodic tick for
//! whatever is queued. Batches run through a serialized processing stage
//! modeling one exclusive compute resource, and each caller's wait is raced
//! against a fixed deadline.
//!
//! Everything is in-memory and process-local: no persistence, no distributed
//! coordination, and no cancellation of work whose caller has timed out.

pub mod coordinator;
pub mod domain;
pub mod error;
pub mod processor;
pub mod server;

// Re-export commonly used types
pub use coordinator::{BatchCoordinator, CoordinatorConfig, ResultHandle};
pub use domain::{Batch, BatchId, FlushTrigger, PendingRequest, WorkItem, WorkResult};
pub use error::{MicrobatchError, Result};
pub use processor::{BatchProcessor, RecordingProcessor, SimulatedProcessor};
