use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{Instrument, debug, info, info_span, warn};

use super::aggregator::{RankedCandidate, ResultAggregator};
use super::eligibility::{LlmEligibilityCheck, Rejection, filter_candidates};
use super::nice_have::{LlmNiceHaveCheck, detect_missing};
use super::rerank::{LlmReranker, ShortlistEntry, rerank_shortlist};
use super::stage::{Stage, StageObserver, StageReport, StageSink};
use crate::config::MatchConfig;
use crate::engine::{BatchSettings, Progress};
use crate::error::MatchError;
use crate::llm::MessageSender;
use crate::profile::{CandidateProfile, JobPosting, validate_candidates};
use crate::scoring::{ScoredCandidate, ScoringEngine};
use crate::timeline::{ExperienceAnalyzer, TimelineFlags};

/// Everything a matching run needs besides the model client.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub must_have: BatchSettings,
    pub nice_have: BatchSettings,
    pub rerank: BatchSettings,
    pub malus_factor: f64,
    /// Size of the re-ranked shortlist.
    pub top_rerank: usize,
    /// Reference date for "present" in timelines.
    pub today: NaiveDate,
}

impl PipelineConfig {
    pub fn from_config(config: &MatchConfig) -> Self {
        Self {
            must_have: config.must_have_settings(),
            nice_have: config.nice_have_settings(),
            rerank: config.rerank_settings(),
            malus_factor: config.scoring.malus_factor,
            top_rerank: config.scoring.top_rerank,
            today: chrono::Utc::now().date_naive(),
        }
    }

    fn validate(&self) -> Result<(), MatchError> {
        for (name, settings) in [
            ("must_have", &self.must_have),
            ("nice_have", &self.nice_have),
            ("rerank", &self.rerank),
        ] {
            settings.validate().map_err(|e| match e {
                MatchError::InvalidSettings(msg) => MatchError::InvalidSettings(format!("[{name}] {msg}")),
                other => other,
            })?;
        }
        if !(self.malus_factor > 0.0 && self.malus_factor <= 1.0) {
            return Err(MatchError::InvalidSettings(format!(
                "malus_factor must be in (0, 1], got {}",
                self.malus_factor
            )));
        }
        Ok(())
    }
}

/// Outcome of a matching run.
#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    /// The re-ranked shortlist, best first.
    pub ranked: Vec<RankedCandidate>,
    /// Accepted candidates outside the shortlist, best first.
    pub others: Vec<ScoredCandidate>,
    pub rejected: Vec<Rejection>,
    pub stages: Vec<StageReport>,
    pub elapsed: Duration,
}

impl MatchReport {
    pub fn accepted_count(&self) -> usize {
        self.ranked.len() + self.others.len()
    }

    pub fn degraded_count(&self) -> usize {
        self.ranked.iter().filter(|r| r.degraded).count()
    }
}

/// Drives candidates through ELIGIBILITY → SCORING → NICE_HAVE → RERANK.
pub struct MatchingPipeline<S> {
    sender: Arc<S>,
    model: String,
    config: PipelineConfig,
}

impl<S: MessageSender + 'static> MatchingPipeline<S> {
    pub fn new(sender: Arc<S>, model: impl Into<String>, config: PipelineConfig) -> Self {
        Self {
            sender,
            model: model.into(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage. Only invalid input or settings are errors; item
    /// failures degrade the affected candidates.
    pub async fn run<O>(
        &self,
        job: &JobPosting,
        candidates: &[CandidateProfile],
        observer: &O,
    ) -> Result<MatchReport, MatchError>
    where
        O: StageObserver + ?Sized,
    {
        self.config.validate()?;
        validate_candidates(candidates)?;
        let job_embedding = job
            .embedding
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| MatchError::InvalidInput("job posting has no embedding".into()))?;
        if job_embedding.iter().any(|v| !v.is_finite()) {
            return Err(MatchError::InvalidInput("job embedding contains non-finite values".into()));
        }

        let span = info_span!("match", job = %job.title, candidates = candidates.len());
        self.stages(job, job_embedding, candidates, observer)
            .instrument(span)
            .await
    }

    async fn stages<O>(
        &self,
        job: &JobPosting,
        job_embedding: &[f32],
        candidates: &[CandidateProfile],
        observer: &O,
    ) -> Result<MatchReport, MatchError>
    where
        O: StageObserver + ?Sized,
    {
        let started = Instant::now();
        let config = &self.config;
        let mut stages = Vec::with_capacity(4);

        // ELIGIBILITY
        let t = Instant::now();
        observer.stage_started(Stage::Eligibility, candidates.len());
        let check = LlmEligibilityCheck::new(Arc::clone(&self.sender), &self.model, job);
        let sink = StageSink::new(observer, Stage::Eligibility);
        let eligibility = filter_candidates(check, &config.must_have, candidates, &sink).await?;
        let mut report = StageReport::new(
            Stage::Eligibility,
            candidates.len(),
            eligibility.meta.clone(),
            t.elapsed(),
        );
        if report.meta.is_none() {
            report = report.with_note("no must-have criteria");
        }
        finish(observer, &mut stages, report);

        let pool: Vec<(usize, &CandidateProfile)> = eligibility
            .accepted
            .iter()
            .filter_map(|&i| candidates.get(i).map(|c| (i, c)))
            .collect();
        let pool_profiles: Vec<CandidateProfile> = pool.iter().map(|(_, c)| (*c).clone()).collect();

        // SCORING
        let t = Instant::now();
        observer.stage_started(Stage::Scoring, pool.len());
        let engine = ScoringEngine::new(config.malus_factor);
        let mut without_embedding = 0;
        let base_scores: Vec<f64> = pool
            .iter()
            .enumerate()
            .map(|(n, (_, candidate))| {
                let base = match candidate.embedding.as_deref() {
                    Some(embedding) => engine.base_score(embedding, job_embedding),
                    None => {
                        without_embedding += 1;
                        0.0
                    }
                };
                observer.progress(
                    Stage::Scoring,
                    Progress {
                        completed: n + 1,
                        total: pool.len(),
                    },
                );
                base
            })
            .collect();
        debug!(candidates = pool.len(), malus_factor = engine.malus_factor(), "base scores computed");
        let mut report = StageReport::new(Stage::Scoring, pool.len(), None, t.elapsed());
        if without_embedding > 0 {
            warn!(without_embedding, "candidates without embedding scored 0");
            report = report.with_note(format!("{without_embedding} candidate(s) without embedding"));
        }
        finish(observer, &mut stages, report);

        // NICE_HAVE
        let t = Instant::now();
        observer.stage_started(Stage::NiceHave, pool.len());
        let check = LlmNiceHaveCheck::new(Arc::clone(&self.sender), &self.model, job);
        let sink = StageSink::new(observer, Stage::NiceHave);
        let nice_have = detect_missing(check, &config.nice_have, &pool_profiles, &sink).await?;
        let mut report = StageReport::new(Stage::NiceHave, pool.len(), nice_have.meta.clone(), t.elapsed());
        if !nice_have.failed.is_empty() {
            report = report.with_note(format!(
                "{} candidate(s) assumed to miss every nice-have",
                nice_have.failed.len()
            ));
        }
        finish(observer, &mut stages, report);

        let mut scored: Vec<ScoredCandidate> = pool
            .iter()
            .zip(base_scores)
            .zip(nice_have.missing)
            .map(|(((index, candidate), base), missing)| {
                engine.score(candidate.id.clone(), *index, base, missing)
            })
            .collect();
        ResultAggregator::sort_stable(&mut scored);

        // RERANK
        let shortlist_len = config.top_rerank.min(scored.len());
        let others = scored.split_off(shortlist_len);
        let ranked = self
            .rerank(job, &pool, scored, observer, &mut stages)
            .await?;

        let report = MatchReport {
            ranked,
            others,
            rejected: eligibility.rejected,
            stages,
            elapsed: started.elapsed(),
        };
        info!(
            accepted = report.accepted_count(),
            rejected = report.rejected.len(),
            degraded = report.degraded_count(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "matching finished"
        );
        Ok(report)
    }

    async fn rerank<O>(
        &self,
        job: &JobPosting,
        pool: &[(usize, &CandidateProfile)],
        shortlist: Vec<ScoredCandidate>,
        observer: &O,
        stages: &mut Vec<StageReport>,
    ) -> Result<Vec<RankedCandidate>, MatchError>
    where
        O: StageObserver + ?Sized,
    {
        let t = Instant::now();
        observer.stage_started(Stage::Rerank, shortlist.len());
        if shortlist.is_empty() {
            let report = StageReport::new(Stage::Rerank, 0, None, t.elapsed()).with_note("empty shortlist");
            finish(observer, stages, report);
            return Ok(Vec::new());
        }

        let profiles: HashMap<&str, &CandidateProfile> =
            pool.iter().map(|(_, c)| (c.id.as_str(), *c)).collect();
        let analyzer = ExperienceAnalyzer::new(self.config.today);
        let with_flags: Vec<(ScoredCandidate, TimelineFlags)> = shortlist
            .into_iter()
            .map(|s| {
                let flags = profiles
                    .get(s.id())
                    .map(|p| analyzer.analyze(&p.timeline_entries()))
                    .unwrap_or_default();
                (s, flags)
            })
            .collect();
        let entries: Vec<ShortlistEntry> = with_flags
            .iter()
            .filter_map(|(s, flags)| profiles.get(s.id()).map(|p| ShortlistEntry::new(s, flags, p)))
            .collect();

        let reranker = LlmReranker::new(Arc::clone(&self.sender), &self.model, job);
        let sink = StageSink::new(observer, Stage::Rerank);
        let batch = rerank_shortlist(reranker, &self.config.rerank, entries, &sink).await?;
        let meta = batch.meta.clone();

        let ranked = ResultAggregator::merge_rerank(with_flags, batch.outcomes.first());
        let degraded = ranked.iter().filter(|r| r.degraded).count();
        let mut report = StageReport::new(Stage::Rerank, ranked.len(), Some(meta), t.elapsed());
        if degraded > 0 {
            report = report.with_note(format!("{degraded} candidate(s) degraded to base scores"));
        }
        finish(observer, stages, report);
        Ok(ranked)
    }
}

fn finish<O: StageObserver + ?Sized>(observer: &O, stages: &mut Vec<StageReport>, report: StageReport) {
    info!(
        stage = %report.stage,
        items = report.items,
        failed = report.failed_count(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "stage finished"
    );
    observer.stage_finished(&report);
    stages.push(report);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ContentBlock, LlmError, MessagesRequest, MessagesResponse, Usage};
    use crate::pipeline::stage::NoObserver;

    /// Answers by call site: eligibility rejects ids containing "reject",
    /// nice-have reports "Docker" missing, re-ranking fails or boosts "b".
    struct Scripted {
        rerank_fails: bool,
    }

    fn reply(text: String) -> MessagesResponse {
        MessagesResponse {
            id: "msg".into(),
            content: vec![ContentBlock {
                content_type: "text".into(),
                text,
            }],
            model: "mock".into(),
            stop_reason: Some("end_turn".into()),
            usage: Usage::default(),
        }
    }

    fn candidate_id(content: &str) -> &str {
        content
            .lines()
            .find_map(|l| l.strip_prefix("Candidate: "))
            .unwrap_or_default()
    }

    impl MessageSender for Scripted {
        async fn send_message(&self, req: &MessagesRequest) -> Result<MessagesResponse, LlmError> {
            let system = req.system.clone().unwrap_or_default();
            let content = &req.messages[0].content;
            if system.contains("mandatory") {
                let eligible = !candidate_id(content).contains("reject");
                Ok(reply(format!(r#"{{"eligible": {eligible}, "rationale": "checked"}}"#)))
            } else if system.contains("optional") {
                Ok(reply(r#"{"missing": ["docker"]}"#.into()))
            } else if self.rerank_fails {
                Err(LlmError::ApiError {
                    status: 503,
                    message: "overloaded".into(),
                })
            } else {
                Ok(reply(r#"{"ranked": [{"id": "b", "experience_coefficient": 1.4}]}"#.into()))
            }
        }
    }

    fn settings() -> BatchSettings {
        BatchSettings {
            concurrency: 4,
            qps: 1000.0,
            timeout_seconds: 5,
            retries: 0,
            backoff_seconds: 0.01,
            ..BatchSettings::default()
        }
    }

    fn config(top_rerank: usize) -> PipelineConfig {
        PipelineConfig {
            must_have: settings(),
            nice_have: settings(),
            rerank: settings(),
            malus_factor: 0.95,
            top_rerank,
            today: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        }
    }

    fn job() -> JobPosting {
        JobPosting {
            title: "Backend engineer".into(),
            description: "Rust services".into(),
            must_have: vec!["Rust".into()],
            nice_have: vec!["Docker".into(), "Kafka".into()],
            embedding: Some(vec![1.0, 0.0]),
        }
    }

    fn candidate(id: &str, embedding: [f32; 2]) -> CandidateProfile {
        CandidateProfile {
            id: id.into(),
            embedding: Some(embedding.to_vec()),
            ..CandidateProfile::default()
        }
    }

    fn candidates() -> Vec<CandidateProfile> {
        vec![
            candidate("a", [1.0, 0.0]),
            candidate("reject-me", [1.0, 0.0]),
            candidate("b", [0.9, 0.4]),
            candidate("c", [0.2, 1.0]),
        ]
    }

    #[tokio::test]
    async fn runs_every_stage() {
        let pipeline = MatchingPipeline::new(Arc::new(Scripted { rerank_fails: false }), "m", config(2));
        let report = pipeline.run(&job(), &candidates(), &NoObserver).await.unwrap();

        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].id, "reject-me");
        assert_eq!(report.accepted_count(), 3);

        let ranked: Vec<_> = report.ranked.iter().map(|r| r.score.id()).collect();
        assert_eq!(ranked, vec!["b", "a"]);
        assert!(!report.ranked[0].degraded);
        assert!(report.ranked[1].degraded);
        assert_eq!(report.others.len(), 1);
        assert_eq!(report.others[0].id(), "c");
        assert_eq!(report.others[0].nice_have_missing(), ["Docker".to_string()]);

        let stages: Vec<_> = report.stages.iter().map(|s| s.stage).collect();
        assert_eq!(stages, vec![Stage::Eligibility, Stage::Scoring, Stage::NiceHave, Stage::Rerank]);
    }

    #[tokio::test]
    async fn failed_rerank_keeps_quantitative_order() {
        let pipeline = MatchingPipeline::new(Arc::new(Scripted { rerank_fails: true }), "m", config(10));
        let report = pipeline.run(&job(), &candidates(), &NoObserver).await.unwrap();

        assert_eq!(report.ranked.len(), 3);
        assert!(report.ranked.iter().all(|r| r.degraded));
        assert!(report.ranked.iter().all(|r| r.score.experience_coefficient() == 1.0));
        let ids: Vec<_> = report.ranked.iter().map(|r| r.score.id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(report.stages[3].failed_count(), 1);
    }

    #[tokio::test]
    async fn job_without_embedding_is_rejected() {
        let pipeline = MatchingPipeline::new(Arc::new(Scripted { rerank_fails: false }), "m", config(2));
        let mut job = job();
        job.embedding = None;
        let err = pipeline.run(&job, &candidates(), &NoObserver).await.unwrap_err();
        assert!(matches!(err, MatchError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn duplicate_candidates_fail_before_any_call() {
        let pipeline = MatchingPipeline::new(Arc::new(Scripted { rerank_fails: false }), "m", config(2));
        let err = pipeline
            .run(&job(), &[candidate("a", [1.0, 0.0]), candidate("a", [0.0, 1.0])], &NoObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::DuplicateItem(_)));
    }

    #[tokio::test]
    async fn zero_shortlist_skips_rerank() {
        let pipeline = MatchingPipeline::new(Arc::new(Scripted { rerank_fails: true }), "m", config(0));
        let report = pipeline.run(&job(), &candidates(), &NoObserver).await.unwrap();
        assert!(report.ranked.is_empty());
        assert_eq!(report.others.len(), 3);
        assert_eq!(report.stages[3].note.as_deref(), Some("empty shortlist"));
    }
}
