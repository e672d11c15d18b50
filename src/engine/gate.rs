use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ItemError;

/// Workers started for a batch, unless the batch has fewer items.
pub const WORKER_FLOOR: usize = 4;
pub const DEFAULT_WORKER_CEILING: usize = 128;

/// Permits actually issued: `concurrency` clamped to `[1, ceiling]`, never
/// more than there are items.
pub fn effective_concurrency(requested: usize, items: usize, ceiling: usize) -> usize {
    requested.clamp(1, ceiling.max(1)).min(items.max(1))
}

/// Size of the worker pool that drains the batch queue.
pub fn worker_pool_size(concurrency: usize, items: usize, ceiling: usize) -> usize {
    concurrency
        .min(ceiling.max(1))
        .max(WORKER_FLOOR)
        .min(items.max(1))
}

/// Counting semaphore bounding simultaneous remote calls.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    permits: usize,
}

/// Released on drop, whether the attempt succeeded, failed, timed out or was cancelled.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(permits: usize) -> Self {
        let permits = permits.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            permits,
        }
    }

    pub async fn acquire(&self) -> Result<GatePermit, ItemError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ItemError::transient("concurrency gate closed"))?;
        Ok(GatePermit { _permit: permit })
    }

    pub fn permits(&self) -> usize {
        self.permits
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
