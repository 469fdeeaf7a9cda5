//! Caller-side result handle with a deadline race.
//!
//! Submitting a work item yields a [`ResultHandle`]: the receiving half of
//! that item's single-assignment result slot. Waiting on the handle races the
//! slot against a deadline. The race is strictly client-side: a timeout never
//! propagates backward to the coordinator or processor, the item stays in its
//! batch and the slot is still eventually fulfilled, just with no observer.

use std::time::Duration;

use metrics::counter;
use tokio::sync::oneshot;

use crate::domain::work::WorkResult;
use crate::error::{MicrobatchError, Result};

/// Handle to the eventual result of one submitted work item.
#[derive(Debug)]
pub struct ResultHandle {
    id: i64,
    rx: oneshot::Receiver<Result<WorkResult>>,
}

impl ResultHandle {
    pub(crate) fn new(id: i64, rx: oneshot::Receiver<Result<WorkResult>>) -> Self {
        Self { id, rx }
    }

    /// Id of the work item this handle belongs to.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Wait for the result, or fail with `Timeout` once the deadline elapses.
    ///
    /// Whichever happens first wins and is terminal for the caller. The slot
    /// itself can only ever be written once, so the fulfillment path and the
    /// timeout path cannot race into inconsistent observations.
    pub async fn wait(self, deadline: Duration) -> Result<WorkResult> {
        match tokio::time::timeout(deadline, self.rx).await {
            Ok(Ok(result)) => result,
            // Slot dropped without fulfillment: coordinator was torn down
            // before this item made it into a batch.
            Ok(Err(_)) => Err(MicrobatchError::Shutdown),
            Err(_) => {
                counter!("microbatch_timeouts_total").increment(1);
                tracing::debug!(
                    item_id = self.id,
                    deadline_ms = deadline.as_millis() as u64,
                    "Caller deadline elapsed before result was observed"
                );
                Err(MicrobatchError::Timeout(self.id))
            }
        }
    }
}
