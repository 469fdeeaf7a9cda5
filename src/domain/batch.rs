//! Batch types: pending requests and the batches that group them.
//!
//! A `PendingRequest` pairs a work item with its single-assignment result
//! slot. A `Batch` is an ordered snapshot of pending requests captured
//! atomically at flush time; it is immutable once formed and no two batches
//! ever share a request.

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::domain::work::{WorkItem, WorkResult};
use crate::error::Result;

/// Unique identifier for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        BatchId(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BatchId {
    fn from(uuid: Uuid) -> Self {
        BatchId(uuid)
    }
}

impl std::ops::Deref for BatchId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// What caused a batch to be flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The pending queue reached the size threshold on insertion
    Size,
    /// The periodic tick fired while the queue was non-empty
    Interval,
    /// The coordinator drained its queue during shutdown
    Shutdown,
}

impl FlushTrigger {
    /// Stable label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Interval => "interval",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

/// A queued work item paired with its result slot.
///
/// The slot is a oneshot sender, so it can be written at most once and
/// fulfillment consumes the request. The caller holds only the receiving
/// half; dropping it (e.g. after a timeout) does not stop processing, the
/// eventual fulfillment simply has no observer.
#[derive(Debug)]
pub struct PendingRequest {
    pub item: WorkItem,
    pub submitted_at: DateTime<Utc>,
    slot: oneshot::Sender<Result<WorkResult>>,
}

impl PendingRequest {
    /// Create a pending request and the receiving half of its result slot.
    pub fn new(item: WorkItem) -> (Self, oneshot::Receiver<Result<WorkResult>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                item,
                submitted_at: Utc::now(),
                slot: tx,
            },
            rx,
        )
    }

    /// Fulfill the result slot.
    ///
    /// Returns `Err(())` if the caller has already dropped its handle (for
    /// example after observing a timeout); the result is discarded in that
    /// case, which is expected behavior rather than a failure.
    pub fn fulfill(self, result: Result<WorkResult>) -> std::result::Result<(), ()> {
        self.slot.send(result).map_err(|_| ())
    }
}

/// An ordered, immutable snapshot of pending requests taken at flush time.
#[derive(Debug)]
pub struct Batch {
    pub id: BatchId,
    pub trigger: FlushTrigger,
    pub flushed_at: DateTime<Utc>,
    pub requests: Vec<PendingRequest>,
}

impl Batch {
    /// Form a batch from a drained queue snapshot.
    ///
    /// Callers must never pass an empty snapshot; an empty flush is a no-op
    /// upstream and must not reach the processor.
    pub fn new(requests: Vec<PendingRequest>, trigger: FlushTrigger) -> Self {
        debug_assert!(!requests.is_empty(), "empty snapshot must not form a batch");
        Self {
            id: BatchId::new(),
            trigger,
            flushed_at: Utc::now(),
            requests,
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Clone out the work items in batch order, for handing to a processor.
    pub fn items(&self) -> Vec<WorkItem> {
        self.requests.iter().map(|r| r.item.clone()).collect()
    }
}
