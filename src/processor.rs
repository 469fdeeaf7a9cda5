//! Batch processor abstraction and the serialized simulated implementation.
//!
//! This module defines the `BatchProcessor` trait to abstract the compute
//! stage, enabling testability with a recording implementation that makes no
//! real computation.
//!
//! The production implementation models a single shared compute resource
//! (e.g. one accelerator): an exclusive lock serializes batches so at most
//! one is computed at any instant, and each invocation pays one fixed
//! latency regardless of batch size. Batching exists to amortize that fixed
//! cost across all items in the batch.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::work::{WorkItem, WorkResult};
use crate::error::Result;

/// Fixed simulated compute latency per batch invocation.
pub const DEFAULT_COMPUTE_LATENCY_MS: u64 = 1000;

/// Trait for executing one batch of work.
///
/// Implementations must produce exactly one result per item, in item order.
/// A returned error fails the whole batch; every caller in it observes the
/// failure. Per-item failure is intentionally not modeled here.
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    /// Process a batch of work items, returning one result per item in the
    /// same order.
    async fn process(&self, items: &[WorkItem]) -> Result<Vec<WorkResult>>;
}

// ============================================================================
// Production implementation: simulated serialized compute
// ============================================================================

/// Simulated compute stage guarded by an exclusive lock.
///
/// The lock is owned by this explicitly constructed value and injected into
/// the coordinator, rather than living in process-wide global state. Holding
/// it across the simulated latency means concurrent batches queue on the
/// lock and complete one at a time, in whatever order they acquire it.
pub struct SimulatedProcessor {
    compute_lock: tokio::sync::Mutex<()>,
    latency: Duration,
}

impl SimulatedProcessor {
    /// Create a processor with the given fixed latency per batch.
    pub fn new(latency_ms: u64) -> Self {
        Self {
            compute_lock: tokio::sync::Mutex::new(()),
            latency: Duration::from_millis(latency_ms),
        }
    }
}

impl Default for SimulatedProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_COMPUTE_LATENCY_MS)
    }
}

#[async_trait]
impl BatchProcessor for SimulatedProcessor {
    #[tracing::instrument(skip(self, items), fields(batch_size = items.len()))]
    async fn process(&self, items: &[WorkItem]) -> Result<Vec<WorkResult>> {
        // At most one batch computes at a time, however many were dispatched
        let _compute = self.compute_lock.lock().await;

        tracing::debug!(latency_ms = self.latency.as_millis() as u64, "Computing batch");
        tokio::time::sleep(self.latency).await;

        let results = items
            .iter()
            .map(|item| WorkResult {
                id: item.id,
                output: format!("Processed_{}", item.input),
            })
            .collect();

        tracing::debug!("Batch computed");
        Ok(results)
    }
}

// ============================================================================
// Test/recording implementation
// ============================================================================

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Recording processor for testing.
///
/// Applies the same deterministic transform as [`SimulatedProcessor`] but
/// with no latency and no compute lock, while recording every batch it
/// receives. Failures and completion gating can be injected per call.
///
/// # Example
/// ```ignore
/// let processor = RecordingProcessor::new();
/// // ... drive the coordinator ...
/// assert_eq!(processor.batch_sizes(), vec![4, 4]);
/// ```
#[derive(Clone, Default)]
pub struct RecordingProcessor {
    calls: Arc<Mutex<Vec<Vec<WorkItem>>>>,
    failures: Arc<Mutex<Vec<String>>>,
    holds: Arc<Mutex<Vec<oneshot::Receiver<()>>>>,
    in_flight: Arc<AtomicUsize>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `process` call fail the whole batch with this message.
    pub fn fail_next(&self, message: &str) {
        self.failures.lock().push(message.to_string());
    }

    /// Make the next `process` call block until the returned sender is
    /// triggered (by sending `()` or being dropped).
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.holds.lock().push(rx);
        tx
    }

    /// All batches received so far, in arrival order.
    pub fn calls(&self) -> Vec<Vec<WorkItem>> {
        self.calls.lock().clone()
    }

    /// Number of `process` invocations so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Sizes of the batches received so far, in arrival order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls.lock().iter().map(|b| b.len()).collect()
    }

    /// Number of batches currently inside `process`.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchProcessor for RecordingProcessor {
    async fn process(&self, items: &[WorkItem]) -> Result<Vec<WorkResult>> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.clone();
        let _guard = scopeguard::guard((), move |_| {
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        self.calls.lock().push(items.to_vec());

        let hold = {
            let mut holds = self.holds.lock();
            if holds.is_empty() {
                None
            } else {
                Some(holds.remove(0))
            }
        };
        if let Some(rx) = hold {
            // Proceed whether the trigger fires or is dropped
            let _ = rx.await;
        }

        let failure = {
            let mut failures = self.failures.lock();
            if failures.is_empty() {
                None
            } else {
                Some(failures.remove(0))
            }
        };
        if let Some(message) = failure {
            return Err(crate::error::MicrobatchError::Processing(message));
        }

        Ok(items
            .iter()
            .map(|item| WorkResult {
                id: item.id,
                output: format!("Processed_{}", item.input),
            })
            .collect())
    }
}
