//! Bounded-concurrency LLM batch engine and deterministic scoring for CV matching.
//!
//! [`engine`] runs batches of failure-prone remote calls behind a rate
//! limiter and a concurrency gate. [`scoring`] and [`timeline`] are pure.
//! [`pipeline`] wires the four LLM call sites into a matching run.

pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod profile;
pub mod scoring;
pub mod timeline;
pub mod ui;

pub use config::MatchConfig;
pub use engine::{
    BatchMeta, BatchReport, BatchSettings, ItemProcessor, ParallelExecutor, ProcessingOutcome,
    Progress, ProgressSink, WorkItem,
};
pub use error::{ErrorKind, ItemError, MatchError};
pub use pipeline::{MatchReport, MatchingPipeline, PipelineConfig, RankedCandidate};
pub use profile::{CandidateProfile, JobPosting};
pub use scoring::{ScoredCandidate, ScoringEngine};
pub use timeline::{ExperienceAnalyzer, TimelineFlags};
