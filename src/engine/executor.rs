use std::collections::HashSet;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use super::gate::{ConcurrencyGate, effective_concurrency, worker_pool_size};
use super::inflight::InflightTracker;
use super::outcome::{BatchMeta, BatchReport, ProcessingOutcome, WorkItem};
use super::progress::{Progress, ProgressSink};
use super::rate_limiter::RateLimiter;
use super::retry::RetryingInvoker;
use super::settings::BatchSettings;
use crate::error::{ErrorKind, ItemError, MatchError};

/// The per-item remote call of a batch.
///
/// Called concurrently from every worker. `timeout` is the deadline the
/// executor enforces on the attempt; implementations may pass it on to their
/// transport.
pub trait ItemProcessor<T>: Send + Sync {
    type Output: Send + 'static;

    fn process(
        &self,
        item: &T,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Output, ItemError>> + Send;
}

/// Adapts an async closure taking the payload by value.
pub struct FnProcessor<T, F> {
    f: F,
    _payload: PhantomData<fn(T)>,
}

pub fn from_fn<T, F, Fut, R>(f: F) -> FnProcessor<T, F>
where
    T: Clone,
    F: Fn(T, Duration) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, ItemError>> + Send,
    R: Send + 'static,
{
    FnProcessor {
        f,
        _payload: PhantomData,
    }
}

impl<T, F, Fut, R> ItemProcessor<T> for FnProcessor<T, F>
where
    T: Clone,
    F: Fn(T, Duration) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, ItemError>> + Send,
    R: Send + 'static,
{
    type Output = R;

    fn process(&self, item: &T, timeout: Duration) -> impl Future<Output = Result<R, ItemError>> + Send {
        (self.f)(item.clone(), timeout)
    }
}

type WorkQueue<T> = Arc<Mutex<std::vec::IntoIter<(usize, WorkItem<T>)>>>;

/// Fans a batch out over a fixed worker pool behind one rate limiter and one
/// concurrency gate, and gathers one outcome per item.
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    settings: BatchSettings,
    label: String,
}

impl ParallelExecutor {
    pub fn new(settings: BatchSettings) -> Self {
        Self {
            settings,
            label: "batch".to_string(),
        }
    }

    /// Name reported in logs for this call site.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Runs every item to completion.
    ///
    /// Only invalid settings and duplicate item ids are errors; item failures
    /// are outcomes. The report always holds exactly one outcome per item.
    pub async fn run<T, P, S>(
        &self,
        items: Vec<WorkItem<T>>,
        processor: Arc<P>,
        progress: &S,
    ) -> Result<BatchReport<P::Output>, MatchError>
    where
        T: Send + Sync + 'static,
        P: ItemProcessor<T> + 'static,
        S: ProgressSink + ?Sized,
    {
        self.settings.validate()?;
        ensure_unique_ids(&items)?;

        let batch_id = Uuid::new_v4();
        if items.is_empty() {
            return Ok(BatchReport::empty(batch_id));
        }

        let span = info_span!("batch", %batch_id, stage = %self.label, total = items.len());
        Ok(self.dispatch(batch_id, items, processor, progress).instrument(span).await)
    }

    async fn dispatch<T, P, S>(
        &self,
        batch_id: Uuid,
        items: Vec<WorkItem<T>>,
        processor: Arc<P>,
        progress: &S,
    ) -> BatchReport<P::Output>
    where
        T: Send + Sync + 'static,
        P: ItemProcessor<T> + 'static,
        S: ProgressSink + ?Sized,
    {
        let started = Instant::now();
        let total = items.len();
        let settings = &self.settings;

        let permits = effective_concurrency(settings.concurrency, total, settings.worker_ceiling);
        let workers = worker_pool_size(settings.concurrency, total, settings.worker_ceiling);
        let tracker = Arc::new(InflightTracker::new());
        let invoker = RetryingInvoker::new(
            Arc::new(RateLimiter::new(settings.qps)),
            ConcurrencyGate::new(permits),
            Arc::clone(&tracker),
            settings.retry_policy(),
        );
        info!(permits, workers, qps = settings.qps, "batch started");

        let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        let queue: WorkQueue<T> = Arc::new(Mutex::new(
            items.into_iter().enumerate().collect::<Vec<_>>().into_iter(),
        ));
        let (tx, mut rx) = mpsc::channel::<ProcessingOutcome<P::Output>>(workers.max(1) * 2);

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let processor = Arc::clone(&processor);
            let invoker = invoker.clone();
            let tx = tx.clone();
            pool.spawn(
                async move {
                    loop {
                        let next = queue.lock().await.next();
                        let Some((index, item)) = next else { break };
                        let outcome = invoker.invoke(index, &item, processor.as_ref()).await;
                        if tx.send(outcome).await.is_err() {
                            break;
                        }
                    }
                }
                .in_current_span(),
            );
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(total);
        let mut reported = vec![false; total];
        while let Some(outcome) = rx.recv().await {
            if let Some(seen) = reported.get_mut(outcome.index) {
                *seen = true;
            }
            progress.on_progress(Progress {
                completed: outcomes.len() + 1,
                total,
            });
            outcomes.push(outcome);
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "batch worker died");
            }
        }

        // Items held by a worker that died never produced an outcome.
        for (index, id) in ids.into_iter().enumerate() {
            if reported[index] {
                continue;
            }
            progress.on_progress(Progress {
                completed: outcomes.len() + 1,
                total,
            });
            outcomes.push(ProcessingOutcome::failure(
                id,
                index,
                ErrorKind::ExhaustedRetries,
                "[worker aborted] item was never reported".to_string(),
                0,
                Duration::ZERO,
            ));
        }

        let success_count = outcomes.iter().filter(|o| o.succeeded).count();
        let meta = BatchMeta {
            batch_id,
            total,
            success_count,
            failed_count: total - success_count,
            peak_inflight: tracker.peak(),
            elapsed: started.elapsed(),
        };
        info!(
            success = meta.success_count,
            failed = meta.failed_count,
            peak_inflight = meta.peak_inflight,
            elapsed_ms = meta.elapsed.as_millis() as u64,
            "batch finished"
        );

        BatchReport { outcomes, meta }
    }
}

fn ensure_unique_ids<T>(items: &[WorkItem<T>]) -> Result<(), MatchError> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.id.as_str()) {
            return Err(MatchError::DuplicateItem(item.id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progress::NoProgress;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn settings(concurrency: usize) -> BatchSettings {
        BatchSettings {
            concurrency,
            qps: 1000.0,
            timeout_seconds: 5,
            retries: 1,
            backoff_seconds: 0.1,
            worker_ceiling: 128,
            retry_malformed: false,
        }
    }

    fn items(n: usize) -> Vec<WorkItem<usize>> {
        (0..n).map(|i| WorkItem::new(format!("cv_{i}.pdf"), i)).collect()
    }

    #[tokio::test]
    async fn empty_batch_returns_immediately() {
        let processor = Arc::new(from_fn(|x: usize, _| async move { Ok(x) }));
        let report = ParallelExecutor::new(settings(4))
            .run(Vec::new(), processor, &NoProgress)
            .await
            .unwrap();
        assert!(report.outcomes.is_empty());
        assert_eq!(report.meta.total, 0);
        assert_eq!(report.meta.peak_inflight, 0);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected_before_work() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let processor = Arc::new(from_fn(move |x: usize, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(x) }
        }));
        let batch = vec![WorkItem::new("same.pdf", 1), WorkItem::new("same.pdf", 2)];

        let err = ParallelExecutor::new(settings(4))
            .run(batch, processor, &NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, MatchError::DuplicateItem(id) if id == "same.pdf"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected() {
        let processor = Arc::new(from_fn(|x: usize, _| async move { Ok(x) }));
        let err = ParallelExecutor::new(BatchSettings { qps: 0.0, ..settings(4) })
            .run(items(3), processor, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::InvalidSettings(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn peak_inflight_is_bounded_by_concurrency() {
        let processor = Arc::new(from_fn(|x: usize, _| async move {
            sleep(Duration::from_millis(50)).await;
            Ok(x)
        }));
        let report = ParallelExecutor::new(settings(3))
            .run(items(20), processor, &NoProgress)
            .await
            .unwrap();
        assert_eq!(report.outcomes.len(), 20);
        assert_eq!(report.meta.success_count, 20);
        assert!(report.meta.peak_inflight <= 3);
        assert!(report.meta.peak_inflight >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_fires_once_per_item_in_order() {
        let seen = StdMutex::new(Vec::new());
        let sink = |p: Progress| seen.lock().unwrap().push(p);
        let processor = Arc::new(from_fn(|x: usize, _| async move {
            sleep(Duration::from_millis(10 * (x as u64 % 3))).await;
            Ok(x)
        }));

        ParallelExecutor::new(settings(4))
            .run(items(9), processor, &sink)
            .await
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 9);
        for (i, p) in seen.iter().enumerate() {
            assert_eq!(p.completed, i + 1);
            assert_eq!(p.total, 9);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn all_failing_batch_is_fully_reported() {
        let processor = Arc::new(from_fn(|_: usize, _| async {
            Err::<usize, _>(ItemError::transient("HTTP 500"))
        }));
        let report = ParallelExecutor::new(settings(5))
            .run(items(12), processor, &NoProgress)
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 12);
        assert_eq!(report.meta.success_count, 0);
        assert_eq!(report.meta.failed_count, 12);
        assert!(report.outcomes.iter().all(|o| o.attempts == 2));
        assert!(report.outcomes.iter().all(|o| o.error == Some(ErrorKind::ExhaustedRetries)));
    }

    #[tokio::test(start_paused = true)]
    async fn input_order_is_recoverable() {
        let processor = Arc::new(from_fn(|x: usize, _| async move {
            sleep(Duration::from_millis(100 - x as u64)).await;
            Ok(x * 10)
        }));
        let report = ParallelExecutor::new(settings(8))
            .run(items(8), processor, &NoProgress)
            .await
            .unwrap();
        let ordered = report.into_input_order();
        for (i, outcome) in ordered.iter().enumerate() {
            assert_eq!(outcome.index, i);
            assert_eq!(outcome.item_id, format!("cv_{i}.pdf"));
            assert_eq!(outcome.result, Some(i * 10));
        }
    }

    struct PanicsOn(usize);

    impl ItemProcessor<usize> for PanicsOn {
        type Output = usize;

        async fn process(&self, item: &usize, _timeout: Duration) -> Result<usize, ItemError> {
            if *item == self.0 {
                panic!("processor blew up");
            }
            Ok(*item)
        }
    }

    #[tokio::test]
    async fn panicking_worker_still_yields_full_report() {
        let report = ParallelExecutor::new(settings(2))
            .run(items(10), Arc::new(PanicsOn(4)), &NoProgress)
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 10);
        assert_eq!(report.meta.failed_count, 1);
        let lost = report.failures().next().unwrap();
        assert_eq!(lost.item_id, "cv_4.pdf");
        assert!(lost.rationale.contains("worker aborted"));
    }
}
