//! Domain model for the batching system.
//!
//! - Work items and results (`work`)
//! - Pending requests and batches (`batch`)

pub mod batch;
pub mod work;

// Re-export commonly used types
pub use batch::{Batch, BatchId, FlushTrigger, PendingRequest};
pub use work::{WorkItem, WorkResult};
