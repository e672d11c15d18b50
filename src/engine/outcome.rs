use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorKind;

/// One unit of work: a payload and the key used to correlate its outcome.
#[derive(Debug, Clone)]
pub struct WorkItem<T> {
    pub id: String,
    pub payload: T,
}

impl<T> WorkItem<T> {
    pub fn new(id: impl Into<String>, payload: T) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// Result of processing one item, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome<R> {
    pub item_id: String,
    /// Position of the item in the submitted batch.
    pub index: usize,
    pub succeeded: bool,
    pub result: Option<R>,
    pub error: Option<ErrorKind>,
    pub rationale: String,
    pub attempts: u32,
    pub duration: Duration,
}

impl<R> ProcessingOutcome<R> {
    pub fn success(item_id: String, index: usize, result: R, attempts: u32, duration: Duration) -> Self {
        Self {
            item_id,
            index,
            succeeded: true,
            result: Some(result),
            error: None,
            rationale: String::new(),
            attempts,
            duration,
        }
    }

    pub fn failure(
        item_id: String,
        index: usize,
        error: ErrorKind,
        rationale: String,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            item_id,
            index,
            succeeded: false,
            result: None,
            error: Some(error),
            rationale,
            attempts,
            duration,
        }
    }
}

/// Batch-level figures reported alongside the outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct BatchMeta {
    pub batch_id: Uuid,
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub peak_inflight: usize,
    pub elapsed: Duration,
}

/// Every outcome of a batch, one per submitted item, in completion order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<R> {
    pub outcomes: Vec<ProcessingOutcome<R>>,
    pub meta: BatchMeta,
}

impl<R> BatchReport<R> {
    pub(crate) fn empty(batch_id: Uuid) -> Self {
        Self {
            outcomes: Vec::new(),
            meta: BatchMeta {
                batch_id,
                total: 0,
                success_count: 0,
                failed_count: 0,
                peak_inflight: 0,
                elapsed: Duration::ZERO,
            },
        }
    }

    /// Outcomes re-ordered by submission index.
    pub fn into_input_order(self) -> Vec<ProcessingOutcome<R>> {
        let mut outcomes = self.outcomes;
        outcomes.sort_by_key(|o| o.index);
        outcomes
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProcessingOutcome<R>> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }
}
