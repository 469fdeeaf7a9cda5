//! Coordinator that accumulates work items and flushes them as batches.
//!
//! The pending queue has a single owner: one coordinating task receives
//! submissions over a channel and reacts to two event sources in one
//! `select!` loop:
//!
//! - a size check on every insertion (queue reaches the batch-size
//!   threshold: flush immediately), and
//! - a periodic tick (queue non-empty at tick time: flush whatever is
//!   queued; empty: no-op).
//!
//! A flush takes a disjoint snapshot of everything queued, forms an
//! immutable [`Batch`], and spawns a detached task to run the processor and
//! fan each result back to its caller's slot in batch order. Processing
//! therefore never runs on the coordinating task and never blocks new
//! submissions; the queue is only ever blocked on its own bookkeeping.
//!
//! The queue is unbounded and there is no backpressure. Under sustained
//! overload, batches pile up behind the serialized compute stage and callers
//! whose queue wait plus batch wait exceeds their deadline time out. That is
//! a documented consequence of the design, not a defect.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::batch::{Batch, FlushTrigger, PendingRequest};
use crate::domain::work::{WorkItem, WorkResult};
use crate::error::{MicrobatchError, Result};
use crate::processor::BatchProcessor;

pub mod handle;

pub use handle::ResultHandle;

/// Configuration for the coordinator.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CoordinatorConfig {
    /// Queue length that triggers an immediate flush on insertion
    pub max_batch_size: usize,

    /// Interval of the periodic flush tick in milliseconds
    pub flush_interval_ms: u64,

    /// Deadline for each caller's wait in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 4,
            flush_interval_ms: 200,
            request_timeout_ms: 2000,
        }
    }
}

/// Coordinator handle for submitting work.
///
/// Cheap to clone; all clones feed the same coordinating task. The task runs
/// until the shutdown token fires or every handle has been dropped, draining
/// its queue on the way out so no accepted item is left unprocessed.
#[derive(Clone)]
pub struct BatchCoordinator {
    submit_tx: mpsc::UnboundedSender<PendingRequest>,
    config: CoordinatorConfig,
}

impl BatchCoordinator {
    /// Create a coordinator and spawn its coordinating task.
    ///
    /// The processor is an explicitly constructed, injected resource; the
    /// coordinator takes shared ownership and hands it to each batch task.
    pub fn new<P: BatchProcessor + 'static>(
        processor: Arc<P>,
        config: CoordinatorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_loop(processor, config.clone(), shutdown, submit_rx));
        Self { submit_tx, config }
    }

    /// Submit a work item for batched processing.
    ///
    /// Never blocks on processing: the item is handed to the coordinating
    /// task and a handle to the eventual result is returned immediately.
    pub fn submit(&self, item: WorkItem) -> Result<ResultHandle> {
        let (request, rx) = PendingRequest::new(item);
        let id = request.item.id;
        counter!("microbatch_submissions_total").increment(1);
        self.submit_tx
            .send(request)
            .map_err(|_| MicrobatchError::Shutdown)?;
        Ok(ResultHandle::new(id, rx))
    }

    /// Submit a work item and wait for its result under the configured
    /// deadline.
    pub async fn process(&self, item: WorkItem) -> Result<WorkResult> {
        let deadline = Duration::from_millis(self.config.request_timeout_ms);
        self.submit(item)?.wait(deadline).await
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }
}

/// The coordinating task: sole owner of the pending queue.
#[tracing::instrument(skip_all, fields(
    max_batch_size = config.max_batch_size,
    flush_interval_ms = config.flush_interval_ms,
))]
async fn run_loop<P: BatchProcessor + 'static>(
    processor: Arc<P>,
    config: CoordinatorConfig,
    shutdown: CancellationToken,
    mut submit_rx: mpsc::UnboundedReceiver<PendingRequest>,
) {
    tracing::info!("Coordinator starting");

    let mut queue: Vec<PendingRequest> = Vec::with_capacity(config.max_batch_size);
    let period = Duration::from_millis(config.flush_interval_ms);
    // First tick one full period from now; an immediate tick would race the
    // first submissions into an undersized batch.
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            maybe_request = submit_rx.recv() => match maybe_request {
                Some(request) => {
                    tracing::trace!(
                        item_id = request.item.id,
                        queue_len = queue.len() + 1,
                        "Work item queued"
                    );
                    queue.push(request);
                    if queue.len() >= config.max_batch_size {
                        flush(&mut queue, FlushTrigger::Size, &processor);
                    }
                }
                // Every coordinator handle dropped
                None => break,
            },
            _ = interval.tick() => {
                if !queue.is_empty() {
                    flush(&mut queue, FlushTrigger::Interval, &processor);
                }
            }
            _ = shutdown.cancelled() => {
                tracing::info!("Shutdown signal received, stopping coordinator");
                break;
            }
        }
    }

    // Refuse further submissions, then drain whatever was already accepted so
    // no queued request is stranded without fulfillment.
    submit_rx.close();
    while let Ok(request) = submit_rx.try_recv() {
        queue.push(request);
    }
    if !queue.is_empty() {
        tracing::info!(queue_len = queue.len(), "Flushing remaining work on shutdown");
        flush(&mut queue, FlushTrigger::Shutdown, &processor);
    }

    tracing::info!("Coordinator stopped");
}

/// Take a disjoint snapshot of the queue and dispatch it as one batch.
///
/// A no-op on an empty queue; an empty snapshot never reaches the processor.
fn flush<P: BatchProcessor + 'static>(
    queue: &mut Vec<PendingRequest>,
    trigger: FlushTrigger,
    processor: &Arc<P>,
) {
    let snapshot = std::mem::take(queue);
    if snapshot.is_empty() {
        return;
    }

    let batch = Batch::new(snapshot, trigger);
    counter!("microbatch_batches_flushed_total", "trigger" => trigger.as_str()).increment(1);
    tracing::debug!(
        batch_id = %batch.id,
        size = batch.len(),
        trigger = trigger.as_str(),
        "Flushing batch"
    );

    tokio::spawn(run_batch(Arc::clone(processor), batch));
}

/// Run one batch through the processor and fan results back to the callers.
async fn run_batch<P: BatchProcessor + 'static>(processor: Arc<P>, batch: Batch) {
    gauge!("microbatch_batches_in_flight").increment(1.0);
    let _guard = scopeguard::guard((), |_| {
        gauge!("microbatch_batches_in_flight").decrement(1.0);
    });

    let batch_id = batch.id;
    let items = batch.items();

    match processor.process(&items).await {
        Ok(results) if results.len() == batch.requests.len() => {
            let mut unobserved = 0usize;
            for (request, result) in batch.requests.into_iter().zip(results) {
                if request.fulfill(Ok(result)).is_err() {
                    unobserved += 1;
                }
            }
            if unobserved > 0 {
                counter!("microbatch_results_unobserved_total").increment(unobserved as u64);
            }
            tracing::debug!(
                batch_id = %batch_id,
                size = items.len(),
                unobserved,
                "Batch completed, results fanned out"
            );
        }
        Ok(results) => {
            // Contract violation by the processor; fail every slot rather
            // than leave any unfulfilled.
            let message = format!(
                "processor returned {} results for {} items",
                results.len(),
                batch.requests.len()
            );
            tracing::error!(batch_id = %batch_id, error = %message, "Batch result mismatch");
            for request in batch.requests {
                let _ = request.fulfill(Err(MicrobatchError::Processing(message.clone())));
            }
        }
        Err(e) => {
            let message = e.to_string();
            tracing::error!(batch_id = %batch_id, error = %message, "Batch processing failed");
            for request in batch.requests {
                let _ = request.fulfill(Err(MicrobatchError::Processing(message.clone())));
            }
        }
    }
}
