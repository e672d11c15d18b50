use std::sync::atomic::{AtomicUsize, Ordering};

/// Calls currently executing in one batch, plus the highest count seen.
///
/// Created fresh for every batch run; nothing carries over between batches.
#[derive(Debug, Default)]
pub struct InflightTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

/// Marks the end of a call when dropped.
#[derive(Debug)]
pub struct InflightGuard<'a> {
    tracker: &'a InflightTracker,
}

impl InflightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> InflightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InflightGuard { tracker: self }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.tracker.current.fetch_sub(1, Ordering::SeqCst);
    }
}
