//! Bounded-concurrency batch execution against a remote, rate-limited service.

pub mod executor;
pub mod gate;
pub mod inflight;
pub mod outcome;
pub mod progress;
pub mod rate_limiter;
pub mod retry;
pub mod settings;

pub use executor::{FnProcessor, ItemProcessor, ParallelExecutor, from_fn};
pub use gate::{ConcurrencyGate, DEFAULT_WORKER_CEILING, GatePermit, WORKER_FLOOR};
pub use inflight::{InflightGuard, InflightTracker};
pub use outcome::{BatchMeta, BatchReport, ProcessingOutcome, WorkItem};
pub use progress::{NoProgress, Progress, ProgressSink};
pub use rate_limiter::{MIN_QPS, RateLimiter};
pub use retry::{RetryPolicy, RetryingInvoker};
pub use settings::BatchSettings;
