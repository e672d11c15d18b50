use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Lowest rate a limiter accepts. Anything below it, or NaN, is raised to it.
pub const MIN_QPS: f64 = 0.01;

/// Minimum spacing between grants, shared by every worker of one batch.
///
/// The mutex is held while waiting, so grants are issued strictly one after
/// another and concurrent callers cannot slip past each other.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_issued_at: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(qps: f64) -> Self {
        let qps = if qps.is_nan() { MIN_QPS } else { qps.max(MIN_QPS) };
        Self {
            min_interval: Duration::from_secs_f64(1.0 / qps),
            last_issued_at: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until at least `min_interval` has passed since the previous grant.
    pub async fn acquire(&self) {
        let mut last = self.last_issued_at.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                let wait = ready_at - now;
                debug!(wait_ms = wait.as_millis() as u64, "rate limiter waiting");
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
