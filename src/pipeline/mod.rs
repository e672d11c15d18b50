//! The LLM-backed call sites and the matching run that chains them.

pub mod aggregator;
pub mod cv_parsing;
pub mod eligibility;
pub mod matching;
pub mod nice_have;
pub mod rerank;
pub mod stage;

pub use aggregator::{RankedCandidate, ResultAggregator};
pub use cv_parsing::{
    CHUNK_SIZE, CvDocument, LlmCvParser, ParseReport, load_documents, parse_documents,
    parse_in_chunks,
};
pub use eligibility::{
    EligibilityReport, EligibilityVerdict, LlmEligibilityCheck, Rejection, filter_candidates,
};
pub use matching::{MatchReport, MatchingPipeline, PipelineConfig};
pub use nice_have::{LlmNiceHaveCheck, NiceHaveReport, detect_missing, sanitize_missing};
pub use rerank::{
    LlmReranker, RerankVerdict, SHORTLIST_ID, ShortlistEntry, parse_rerank_reply,
    rerank_shortlist,
};
pub use stage::{NoObserver, Stage, StageObserver, StageReport, StageSink};

use crate::engine::WorkItem;
use crate::profile::CandidateProfile;

/// One work item per candidate, keyed by profile id.
pub(crate) fn candidate_items(candidates: &[CandidateProfile]) -> Vec<WorkItem<CandidateProfile>> {
    candidates
        .iter()
        .map(|c| WorkItem::new(c.id.clone(), c.clone()))
        .collect()
}
