use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{BatchMeta, Progress, ProgressSink};

/// Steps of a matching run, in execution order.
///
/// PARSING → ELIGIBILITY → SCORING → NICE_HAVE → RERANK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Parsing,
    Eligibility,
    Scoring,
    NiceHave,
    Rerank,
}

impl Stage {
    /// Lowercase name used in logs and batch spans.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Parsing => "cv_parsing",
            Stage::Eligibility => "must_have",
            Stage::Scoring => "scoring",
            Stage::NiceHave => "nice_have",
            Stage::Rerank => "rerank",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Parsing => write!(f, "PARSING"),
            Stage::Eligibility => write!(f, "ELIGIBILITY"),
            Stage::Scoring => write!(f, "SCORING"),
            Stage::NiceHave => write!(f, "NICE_HAVE"),
            Stage::Rerank => write!(f, "RERANK"),
        }
    }
}

/// What one stage did. Stages that run no batch carry no `meta`.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub items: usize,
    pub meta: Option<BatchMeta>,
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl StageReport {
    pub fn new(stage: Stage, items: usize, meta: Option<BatchMeta>, elapsed: Duration) -> Self {
        Self {
            stage,
            items,
            meta,
            elapsed,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn failed_count(&self) -> usize {
        self.meta.as_ref().map_or(0, |m| m.failed_count)
    }
}

/// Follows a matching run stage by stage.
pub trait StageObserver: Send + Sync {
    fn stage_started(&self, stage: Stage, total: usize);
    fn progress(&self, stage: Stage, progress: Progress);
    fn stage_finished(&self, report: &StageReport);
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObserver;

impl StageObserver for NoObserver {
    fn stage_started(&self, _stage: Stage, _total: usize) {}
    fn progress(&self, _stage: Stage, _progress: Progress) {}
    fn stage_finished(&self, _report: &StageReport) {}
}

/// Progress sink forwarding batch progress to an observer, tagged with the stage.
pub struct StageSink<'a, O: ?Sized> {
    observer: &'a O,
    stage: Stage,
}

impl<'a, O: StageObserver + ?Sized> StageSink<'a, O> {
    pub fn new(observer: &'a O, stage: Stage) -> Self {
        Self { observer, stage }
    }
}

impl<O: StageObserver + ?Sized> ProgressSink for StageSink<'_, O> {
    fn on_progress(&self, progress: Progress) {
        self.observer.progress(self.stage, progress);
    }
}
