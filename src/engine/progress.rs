use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Snapshot sent once per finished item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Receives progress from the batch collector. Calls come from a single task,
/// in strictly increasing `completed` order, and must not block.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: Progress);
}

impl<F> ProgressSink for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn on_progress(&self, progress: Progress) {
        self(progress)
    }
}

impl ProgressSink for UnboundedSender<Progress> {
    fn on_progress(&self, progress: Progress) {
        // A dropped receiver means nobody is watching any more.
        let _ = self.send(progress);
    }
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _progress: Progress) {}
}
