use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use super::stage::Stage;
use crate::engine::{
    BatchReport, BatchSettings, ItemProcessor, ParallelExecutor, ProgressSink, WorkItem,
};
use crate::error::{ItemError, MatchError};
use crate::llm::{LlmError, MessageSender, MessagesRequest, extract_json_object};
use crate::profile::{CandidateProfile, JobPosting};
use crate::scoring::{NEUTRAL_EXPERIENCE_COEFFICIENT, ScoredCandidate, coefficient_from_value};
use crate::timeline::TimelineFlags;

const SYSTEM_PROMPT: &str = "You are an experienced recruiter refining a shortlist. \
Do not recompute the given scores; rate only the quality of each candidate's experience \
with a coefficient between 1.0 and 1.4. Reply with one JSON object and nothing else: \
{\"ranked\": [{\"id\": \"...\", \"experience_coefficient\": 1.0, \
\"scoring_comment\": \"...\", \"overall_assessment\": \"...\"}]}";

const MAX_TOKENS: u32 = 8000;

/// Work item id of the single re-ranking request.
pub const SHORTLIST_ID: &str = "shortlist";

/// What the model sees about one shortlisted candidate.
#[derive(Debug, Clone, Serialize)]
pub struct ShortlistEntry {
    pub id: String,
    pub score_base: f64,
    pub bonus_multiplier: f64,
    pub score_final: f64,
    pub nice_have_missing: Vec<String>,
    pub timeline: String,
    pub profile: String,
}

impl ShortlistEntry {
    pub fn new(scored: &ScoredCandidate, flags: &TimelineFlags, profile: &CandidateProfile) -> Self {
        Self {
            id: scored.id().to_string(),
            score_base: scored.score_base(),
            bonus_multiplier: scored.bonus_multiplier(),
            score_final: scored.score_final(),
            nice_have_missing: scored.nice_have_missing().to_vec(),
            timeline: flags.format_for_prompt(),
            profile: profile.summary_for_prompt(),
        }
    }

    fn prompt_block(&self) -> String {
        let missing = if self.nice_have_missing.is_empty() {
            "none".to_string()
        } else {
            self.nice_have_missing.join(", ")
        };
        format!(
            "### {}\nScore base: {:.3}, nice-have bonus: {:.3}, score final: {:.3}\n\
             Missing nice-haves: {missing}\nTimeline flags:\n{}\n{}",
            self.id, self.score_base, self.bonus_multiplier, self.score_final, self.timeline, self.profile
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerankVerdict {
    pub id: String,
    pub experience_coefficient: f64,
    pub scoring_comment: String,
    pub overall_assessment: String,
}

fn text_field(entry: &Map<String, Value>, key: &str) -> String {
    entry
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Reads the `ranked` array of a re-ranking reply.
///
/// Entries that are not objects or have no id are skipped; a reply without
/// any usable entry is malformed.
pub fn parse_rerank_reply(text: &str) -> Result<Vec<RerankVerdict>, LlmError> {
    let value = extract_json_object(text)
        .ok_or_else(|| LlmError::ParseError("re-ranking reply holds no JSON object".into()))?;
    let ranked = value
        .get("ranked")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::ParseError("re-ranking reply has no 'ranked' array".into()))?;

    let verdicts: Vec<RerankVerdict> = ranked
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|entry| {
            let id = entry.get("id")?.as_str()?.trim();
            if id.is_empty() {
                return None;
            }
            Some(RerankVerdict {
                id: id.to_string(),
                experience_coefficient: entry
                    .get("experience_coefficient")
                    .map_or(NEUTRAL_EXPERIENCE_COEFFICIENT, coefficient_from_value),
                scoring_comment: text_field(entry, "scoring_comment"),
                overall_assessment: text_field(entry, "overall_assessment"),
            })
        })
        .collect();

    if verdicts.is_empty() {
        return Err(LlmError::ParseError(format!(
            "no valid entry among {} ranked items",
            ranked.len()
        )));
    }
    Ok(verdicts)
}

/// Sends the whole shortlist as one request.
pub struct LlmReranker<S> {
    sender: Arc<S>,
    model: String,
    job: String,
}

impl<S: MessageSender> LlmReranker<S> {
    pub fn new(sender: Arc<S>, model: impl Into<String>, job: &JobPosting) -> Self {
        Self {
            sender,
            model: model.into(),
            job: job.summary_for_prompt(),
        }
    }

    fn request(&self, shortlist: &[ShortlistEntry]) -> MessagesRequest {
        let blocks: Vec<String> = shortlist.iter().map(ShortlistEntry::prompt_block).collect();
        let content = format!(
            "{}\n\nShortlisted candidates ({}):\n\n{}",
            self.job,
            shortlist.len(),
            blocks.join("\n\n")
        );
        MessagesRequest::single_turn(&self.model, MAX_TOKENS, SYSTEM_PROMPT, content)
    }
}

impl<S: MessageSender> ItemProcessor<Vec<ShortlistEntry>> for LlmReranker<S> {
    type Output = Vec<RerankVerdict>;

    async fn process(
        &self,
        shortlist: &Vec<ShortlistEntry>,
        _timeout: Duration,
    ) -> Result<Vec<RerankVerdict>, ItemError> {
        let response = self.sender.send_message(&self.request(shortlist)).await?;
        Ok(parse_rerank_reply(&response.text())?)
    }
}

/// Runs the re-ranking request through the executor so it gets the same
/// limiter, deadline and retry treatment as every other call.
pub async fn rerank_shortlist<S, P>(
    reranker: LlmReranker<S>,
    settings: &BatchSettings,
    shortlist: Vec<ShortlistEntry>,
    progress: &P,
) -> Result<BatchReport<Vec<RerankVerdict>>, MatchError>
where
    S: MessageSender + 'static,
    P: ProgressSink + ?Sized,
{
    ParallelExecutor::new(settings.clone())
        .with_label(Stage::Rerank.label())
        .run(vec![WorkItem::new(SHORTLIST_ID, shortlist)], Arc::new(reranker), progress)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_entries() {
        let reply = r#"```json
        {"ranked": [
            {"id": "a.pdf", "experience_coefficient": 1.2, "scoring_comment": "solid", "overall_assessment": "hire"},
            {"id": "b.pdf", "experience_coefficient": "1.9"}
        ]}
        ```"#;
        let verdicts = parse_rerank_reply(reply).unwrap();
        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[0].experience_coefficient, 1.2);
        assert_eq!(verdicts[0].scoring_comment, "solid");
        assert_eq!(verdicts[1].experience_coefficient, 1.4);
        assert_eq!(verdicts[1].overall_assessment, "");
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let reply = r#"{"ranked": [null, 3, "a.pdf", {"experience_coefficient": 1.1}, {"id": "c.pdf", "experience_coefficient": null}]}"#;
        let verdicts = parse_rerank_reply(reply).unwrap();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].id, "c.pdf");
        assert_eq!(verdicts[0].experience_coefficient, 1.0);
    }

    #[test]
    fn reply_without_valid_entries_is_malformed() {
        assert!(matches!(
            parse_rerank_reply(r#"{"ranked": [null, {}]}"#),
            Err(LlmError::ParseError(_))
        ));
        assert!(matches!(
            parse_rerank_reply(r#"{"results": []}"#),
            Err(LlmError::ParseError(_))
        ));
        assert!(matches!(parse_rerank_reply("sorry"), Err(LlmError::ParseError(_))));
    }

    #[test]
    fn prompt_block_lists_scores_and_flags() {
        let entry = ShortlistEntry {
            id: "a.pdf".into(),
            score_base: 0.8,
            bonus_multiplier: 0.9025,
            score_final: 0.722,
            nice_have_missing: vec!["Docker".into(), "AWS".into()],
            timeline: "No flags detected.".into(),
            profile: "Candidate: a.pdf".into(),
        };
        let block = entry.prompt_block();
        assert!(block.starts_with("### a.pdf"));
        assert!(block.contains("score final: 0.722"));
        assert!(block.contains("Missing nice-haves: Docker, AWS"));
    }
}
