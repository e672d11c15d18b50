use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

use super::executor::ItemProcessor;
use super::gate::ConcurrencyGate;
use super::inflight::InflightTracker;
use super::outcome::{ProcessingOutcome, WorkItem};
use super::rate_limiter::RateLimiter;
use crate::error::{ErrorKind, ItemError};

/// Attempt budget and timing of one call site.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
    pub timeout: Duration,
    pub retry_malformed: bool,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// `backoff × 2^attempt`, attempt being zero-based.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.backoff.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Exclusive upper bound of the random jitter.
    pub fn max_jitter(&self) -> Duration {
        self.backoff / 4
    }

    /// Sleep before the attempt following `attempt`: base delay plus jitter in `[0, backoff/4)`.
    pub fn delay_for_attempt<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let cap = self.max_jitter().as_secs_f64();
        let jitter = if cap > 0.0 { rng.gen_range(0.0..cap) } else { 0.0 };
        self.base_delay_for_attempt(attempt)
            .saturating_add(Duration::from_secs_f64(jitter))
    }

    /// Whether an error on zero-based `attempt` leads to another attempt.
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts() && kind.is_retriable(self.retry_malformed)
    }
}

/// Runs one item through limiter, gate and deadline, retrying per policy.
///
/// Failures come back as data in the outcome; `invoke` has no error path.
#[derive(Debug, Clone)]
pub struct RetryingInvoker {
    limiter: Arc<RateLimiter>,
    gate: ConcurrencyGate,
    tracker: Arc<InflightTracker>,
    policy: RetryPolicy,
}

impl RetryingInvoker {
    pub fn new(
        limiter: Arc<RateLimiter>,
        gate: ConcurrencyGate,
        tracker: Arc<InflightTracker>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            limiter,
            gate,
            tracker,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn invoke<T, P>(
        &self,
        index: usize,
        item: &WorkItem<T>,
        processor: &P,
    ) -> ProcessingOutcome<P::Output>
    where
        T: Sync,
        P: ItemProcessor<T> + ?Sized,
    {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            let attempts = attempt + 1;
            let err = match self.attempt(item, processor).await {
                Ok(value) => {
                    debug!(item_id = %item.id, attempts, "item succeeded");
                    return ProcessingOutcome::success(
                        item.id.clone(),
                        index,
                        value,
                        attempts,
                        started.elapsed(),
                    );
                }
                Err(err) => err,
            };

            if self.policy.should_retry(err.kind, attempt) {
                let delay = self.policy.delay_for_attempt(attempt, &mut rand::thread_rng());
                warn!(
                    item_id = %item.id,
                    attempt = attempts,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );
                sleep(delay).await;
                attempt += 1;
                continue;
            }

            // A retriable error that ran out of attempts is reported as exhaustion;
            // anything else keeps its own kind.
            let kind = if err.kind.is_retriable(self.policy.retry_malformed) {
                ErrorKind::ExhaustedRetries
            } else {
                err.kind
            };
            warn!(item_id = %item.id, attempts, kind = %kind, error = %err, "item failed");
            return ProcessingOutcome::failure(
                item.id.clone(),
                index,
                kind,
                failure_rationale(attempts, &err),
                attempts,
                started.elapsed(),
            );
        }
    }

    async fn attempt<T, P>(&self, item: &WorkItem<T>, processor: &P) -> Result<P::Output, ItemError>
    where
        T: Sync,
        P: ItemProcessor<T> + ?Sized,
    {
        self.limiter.acquire().await;
        let _permit = self.gate.acquire().await?;
        let _inflight = self.tracker.start();
        match timeout(self.policy.timeout, processor.process(&item.payload, self.policy.timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ItemError::timeout(self.policy.timeout)),
        }
    }
}

fn failure_rationale(attempts: u32, err: &ItemError) -> String {
    let noun = if attempts == 1 { "attempt" } else { "attempts" };
    format!("[failed after {attempts} {noun}] {err}")
}
