use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::candidate_items;
use super::stage::Stage;
use crate::engine::{BatchMeta, BatchSettings, ItemProcessor, ParallelExecutor, ProgressSink};
use crate::error::{ItemError, MatchError};
use crate::llm::{MessageSender, MessagesRequest, ask_json};
use crate::profile::{CandidateProfile, JobPosting};

const SYSTEM_PROMPT: &str = "You screen CVs against mandatory job requirements. \
A candidate is eligible only if every requirement is clearly met. \
Reply with one JSON object and nothing else: \
{\"eligible\": true|false, \"rationale\": \"...\", \"missing\": [\"...\"]}";

const MAX_TOKENS: u32 = 512;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityVerdict {
    pub eligible: bool,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub missing: Vec<String>,
}

/// A candidate excluded from the pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub id: String,
    pub index: usize,
    pub rationale: String,
    /// The check itself failed; the rejection is conservative, not a verdict.
    pub failed: bool,
}

#[derive(Debug, Clone)]
pub struct EligibilityReport {
    /// Positions (in the checked slice) of accepted candidates, ascending.
    pub accepted: Vec<usize>,
    pub rejected: Vec<Rejection>,
    pub meta: Option<BatchMeta>,
}

/// Asks the model whether a candidate meets every must-have criterion.
pub struct LlmEligibilityCheck<S> {
    sender: Arc<S>,
    model: String,
    job: String,
    must_haves: Vec<String>,
}

impl<S: MessageSender> LlmEligibilityCheck<S> {
    pub fn new(sender: Arc<S>, model: impl Into<String>, job: &JobPosting) -> Self {
        Self {
            sender,
            model: model.into(),
            job: job.summary_for_prompt(),
            must_haves: job.must_haves().into_iter().map(str::to_string).collect(),
        }
    }

    fn request(&self, candidate: &CandidateProfile) -> MessagesRequest {
        let criteria: Vec<String> = self.must_haves.iter().map(|c| format!("- {c}")).collect();
        let content = format!(
            "{}\n\nMandatory requirements:\n{}\n\nCandidate: {}\n{}",
            self.job,
            criteria.join("\n"),
            candidate.id,
            candidate.flatten_text()
        );
        MessagesRequest::single_turn(&self.model, MAX_TOKENS, SYSTEM_PROMPT, content)
    }
}

impl<S: MessageSender> ItemProcessor<CandidateProfile> for LlmEligibilityCheck<S> {
    type Output = EligibilityVerdict;

    async fn process(
        &self,
        candidate: &CandidateProfile,
        _timeout: Duration,
    ) -> Result<EligibilityVerdict, ItemError> {
        Ok(ask_json(self.sender.as_ref(), &self.request(candidate)).await?)
    }
}

/// Splits `candidates` into accepted and rejected.
///
/// A candidate whose check fails after every retry is rejected. With no
/// must-have criteria every candidate is accepted and no batch runs.
pub async fn filter_candidates<S, P>(
    check: LlmEligibilityCheck<S>,
    settings: &BatchSettings,
    candidates: &[CandidateProfile],
    progress: &P,
) -> Result<EligibilityReport, MatchError>
where
    S: MessageSender + 'static,
    P: ProgressSink + ?Sized,
{
    if check.must_haves.is_empty() {
        info!(candidates = candidates.len(), "no must-have criteria, accepting everyone");
        return Ok(EligibilityReport {
            accepted: (0..candidates.len()).collect(),
            rejected: Vec::new(),
            meta: None,
        });
    }

    let report = ParallelExecutor::new(settings.clone())
        .with_label(Stage::Eligibility.label())
        .run(candidate_items(candidates), Arc::new(check), progress)
        .await?;
    let meta = report.meta.clone();

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for outcome in report.into_input_order() {
        match outcome.result {
            Some(verdict) if verdict.eligible => accepted.push(outcome.index),
            Some(verdict) => rejected.push(Rejection {
                id: outcome.item_id,
                index: outcome.index,
                rationale: verdict.rationale,
                failed: false,
            }),
            None => rejected.push(Rejection {
                id: outcome.item_id,
                index: outcome.index,
                rationale: outcome.rationale,
                failed: true,
            }),
        }
    }

    info!(accepted = accepted.len(), rejected = rejected.len(), "eligibility done");
    Ok(EligibilityReport {
        accepted,
        rejected,
        meta: Some(meta),
    })
}
