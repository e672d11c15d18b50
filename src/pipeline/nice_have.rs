use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use super::candidate_items;
use super::stage::Stage;
use crate::engine::{BatchMeta, BatchSettings, ItemProcessor, ParallelExecutor, ProgressSink};
use crate::error::{ItemError, MatchError};
use crate::llm::{MessageSender, MessagesRequest, ask_json};
use crate::profile::{CandidateProfile, JobPosting};

const SYSTEM_PROMPT: &str = "You check which optional job criteria a CV satisfies. \
Reply with one JSON object and nothing else: \
{\"present\": [\"...\"], \"missing\": [\"...\"]}, using the criteria exactly as listed.";

const MAX_TOKENS: u32 = 512;

#[derive(Debug, Deserialize)]
struct NiceHaveReply {
    missing: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NiceHaveReport {
    /// Missing criteria per candidate, aligned with the checked slice.
    pub missing: Vec<Vec<String>>,
    /// Ids whose check failed and were assumed to miss every criterion.
    pub failed: Vec<String>,
    pub meta: Option<BatchMeta>,
}

/// Asks the model which nice-have criteria a candidate lacks.
pub struct LlmNiceHaveCheck<S> {
    sender: Arc<S>,
    model: String,
    job: String,
    criteria: Vec<String>,
}

impl<S: MessageSender> LlmNiceHaveCheck<S> {
    pub fn new(sender: Arc<S>, model: impl Into<String>, job: &JobPosting) -> Self {
        Self {
            sender,
            model: model.into(),
            job: job.summary_for_prompt(),
            criteria: job.nice_haves().into_iter().map(str::to_string).collect(),
        }
    }

    pub fn criteria(&self) -> &[String] {
        &self.criteria
    }

    fn request(&self, candidate: &CandidateProfile) -> MessagesRequest {
        let criteria: Vec<String> = self.criteria.iter().map(|c| format!("- {c}")).collect();
        let content = format!(
            "{}\n\nOptional criteria:\n{}\n\nCandidate: {}\n{}",
            self.job,
            criteria.join("\n"),
            candidate.id,
            candidate.flatten_text()
        );
        MessagesRequest::single_turn(&self.model, MAX_TOKENS, SYSTEM_PROMPT, content)
    }
}

/// Keeps only configured criteria named in `reported`, compared
/// case-insensitively, in configured order and spelling.
pub fn sanitize_missing(criteria: &[String], reported: &[String]) -> Vec<String> {
    let reported: Vec<String> = reported.iter().map(|m| m.trim().to_lowercase()).collect();
    criteria
        .iter()
        .filter(|c| reported.contains(&c.trim().to_lowercase()))
        .cloned()
        .collect()
}

impl<S: MessageSender> ItemProcessor<CandidateProfile> for LlmNiceHaveCheck<S> {
    type Output = Vec<String>;

    async fn process(
        &self,
        candidate: &CandidateProfile,
        _timeout: Duration,
    ) -> Result<Vec<String>, ItemError> {
        let reply: NiceHaveReply = ask_json(self.sender.as_ref(), &self.request(candidate)).await?;
        Ok(sanitize_missing(&self.criteria, &reply.missing))
    }
}

/// Missing nice-haves for every candidate.
///
/// A failed check counts every criterion as missing. With no criteria,
/// nobody misses anything and no batch runs.
pub async fn detect_missing<S, P>(
    check: LlmNiceHaveCheck<S>,
    settings: &BatchSettings,
    candidates: &[CandidateProfile],
    progress: &P,
) -> Result<NiceHaveReport, MatchError>
where
    S: MessageSender + 'static,
    P: ProgressSink + ?Sized,
{
    if check.criteria().is_empty() {
        info!("no nice-have criteria, skipping detection");
        return Ok(NiceHaveReport {
            missing: vec![Vec::new(); candidates.len()],
            failed: Vec::new(),
            meta: None,
        });
    }

    let criteria = check.criteria().to_vec();
    let report = ParallelExecutor::new(settings.clone())
        .with_label(Stage::NiceHave.label())
        .run(candidate_items(candidates), Arc::new(check), progress)
        .await?;
    let meta = report.meta.clone();

    let mut missing = Vec::with_capacity(candidates.len());
    let mut failed = Vec::new();
    for outcome in report.into_input_order() {
        match outcome.result {
            Some(found) => missing.push(found),
            None => {
                failed.push(outcome.item_id);
                missing.push(criteria.clone());
            }
        }
    }

    Ok(NiceHaveReport {
        missing,
        failed,
        meta: Some(meta),
    })
}
