//! Work item and result types.
//!
//! A `WorkItem` is the unit of work submitted by a caller; a `WorkResult` is
//! the corresponding output. Both are plain value objects: a work item is
//! immutable once submitted, and exactly one result is produced per item at
//! the same position within its batch.

use serde::{Deserialize, Serialize};

/// A unit of work submitted for batched processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Caller-supplied identifier, copied unchanged onto the result
    pub id: i64,
    /// Input payload. The front end rejects empty inputs before they reach
    /// the coordinator; the core assumes well-formed items.
    pub input: String,
}

/// The output produced for one work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkResult {
    /// Identifier matching the originating work item
    pub id: i64,
    /// Processed output payload
    pub output: String,
}
