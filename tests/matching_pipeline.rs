use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use cvmatch::engine::BatchSettings;
use cvmatch::llm::{ContentBlock, LlmError, MessageSender, MessagesRequest, MessagesResponse, Usage};
use cvmatch::pipeline::{MatchReport, MatchingPipeline, NoObserver, PipelineConfig};
use cvmatch::profile::{CandidateProfile, Experience, JobPosting};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Scripted model: every fifth candidate lacks a must-have, every third
/// misses Kafka, and re-ranking boosts candidates whose number is odd.
#[derive(Default)]
struct FakeModel {
    rerank_down: bool,
    reranked: Mutex<Vec<Vec<String>>>,
}

fn reply(text: String) -> MessagesResponse {
    MessagesResponse {
        id: "msg".into(),
        content: vec![ContentBlock {
            content_type: "text".into(),
            text,
        }],
        model: "fake".into(),
        stop_reason: Some("end_turn".into()),
        usage: Usage::default(),
    }
}

fn number(id: &str) -> usize {
    id.trim_start_matches("cand_")
        .trim_end_matches(".pdf")
        .parse()
        .unwrap_or(0)
}

impl MessageSender for FakeModel {
    async fn send_message(&self, req: &MessagesRequest) -> Result<MessagesResponse, LlmError> {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let system = req.system.clone().unwrap_or_default();
        let content = req.messages[0].content.clone();
        let candidate = content
            .lines()
            .find_map(|l| l.strip_prefix("Candidate: "))
            .unwrap_or_default()
            .to_string();

        if system.contains("mandatory") {
            let eligible = number(&candidate) % 5 != 0;
            return Ok(reply(format!(
                r#"{{"eligible": {eligible}, "rationale": "screened", "missing": []}}"#
            )));
        }
        if system.contains("optional") {
            let missing = if number(&candidate) % 3 == 0 { r#"["KAFKA"]"# } else { "[]" };
            return Ok(reply(format!(r#"{{"present": [], "missing": {missing}}}"#)));
        }

        let ids: Vec<String> = content
            .lines()
            .filter_map(|l| l.strip_prefix("### "))
            .map(str::to_string)
            .collect();
        self.reranked.lock().unwrap().push(ids.clone());
        if self.rerank_down {
            return Err(LlmError::ApiError {
                status: 503,
                message: "overloaded".into(),
            });
        }
        let ranked: Vec<String> = ids
            .iter()
            .map(|id| {
                let coefficient = if number(id) % 2 == 1 { 1.3 } else { 1.0 };
                format!(
                    r#"{{"id": "{id}", "experience_coefficient": {coefficient}, "scoring_comment": "reviewed", "overall_assessment": "ok"}}"#
                )
            })
            .collect();
        Ok(reply(format!(r#"{{"ranked": [{}]}}"#, ranked.join(", "))))
    }
}

fn batch(concurrency: usize, qps: f64) -> BatchSettings {
    BatchSettings {
        concurrency,
        qps,
        timeout_seconds: 20,
        retries: 2,
        backoff_seconds: 1.0,
        ..BatchSettings::default()
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        must_have: batch(10, 5.0),
        nice_have: batch(10, 5.0),
        rerank: BatchSettings {
            retry_malformed: true,
            ..batch(1, 1.0)
        },
        malus_factor: 0.95,
        top_rerank: 10,
        today: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
    }
}

fn job() -> JobPosting {
    JobPosting {
        title: "Platform engineer".into(),
        description: "Build and run data services".into(),
        must_have: vec!["Rust".into(), "PostgreSQL".into(), "Linux".into()],
        nice_have: vec!["Kafka".into(), "Kubernetes".into()],
        embedding: Some(vec![1.0, 0.0, 0.0]),
    }
}

fn candidates(n: usize) -> Vec<CandidateProfile> {
    (0..n)
        .map(|i| {
            let angle = i as f32 * 0.029;
            CandidateProfile {
                id: format!("cand_{i:02}.pdf"),
                title: "Engineer".into(),
                technical_skills: vec!["Rust".into(), "Linux".into()],
                experiences: vec![
                    Experience {
                        company: "Acme".into(),
                        start: "01/2018".into(),
                        end: "06/2020".into(),
                        ..Experience::default()
                    },
                    Experience {
                        company: "Globex".into(),
                        start: "2021-01".into(),
                        end: "present".into(),
                        ..Experience::default()
                    },
                ],
                embedding: Some(vec![angle.cos(), angle.sin(), 1.0]),
                ..CandidateProfile::default()
            }
        })
        .collect()
}

fn ids(report: &MatchReport) -> Vec<String> {
    report
        .ranked
        .iter()
        .map(|r| r.score.id().to_string())
        .chain(report.others.iter().map(|s| s.id().to_string()))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn fifty_candidates_end_to_end() {
    let model = Arc::new(FakeModel::default());
    let pipeline = MatchingPipeline::new(Arc::clone(&model), "fake", config());
    let report = pipeline.run(&job(), &candidates(50), &NoObserver).await.unwrap();

    assert!(report.accepted_count() <= 50);
    assert_eq!(report.accepted_count(), 40);
    assert_eq!(report.rejected.len(), 10);
    assert!(report.rejected.iter().all(|r| number(&r.id) % 5 == 0 && !r.failed));

    for stage in &report.stages {
        if let Some(meta) = &stage.meta {
            assert!(meta.peak_inflight <= 10, "{}", stage.stage);
            assert_eq!(meta.failed_count, 0, "{}", stage.stage);
        }
    }

    // Re-ranking ran once, on exactly the ten best quantitative scores.
    let reranked = model.reranked.lock().unwrap().clone();
    assert_eq!(reranked.len(), 1);
    let shortlist: HashSet<&str> = reranked[0].iter().map(String::as_str).collect();
    assert_eq!(shortlist.len(), 10);
    let ranked_ids: HashSet<&str> = report.ranked.iter().map(|r| r.score.id()).collect();
    assert_eq!(shortlist, ranked_ids);
    let cutoff = report
        .ranked
        .iter()
        .map(|r| r.score.score_base() * r.score.bonus_multiplier())
        .fold(f64::INFINITY, f64::min);
    assert!(report.others.iter().all(|s| s.score_final() <= cutoff + 1e-12));

    for ranked in &report.ranked {
        let score = &ranked.score;
        assert!((0.0..=1.0).contains(&score.score_final()));
        let expected = if number(score.id()) % 2 == 1 { 1.3 } else { 1.0 };
        assert_eq!(score.experience_coefficient(), expected);
        assert!(!ranked.degraded);
        let gap = &ranked.flags.gaps;
        assert_eq!(gap.len(), 1);
        assert_eq!(gap[0].duration_months, 7);
    }
    for pair in report.ranked.windows(2) {
        assert!(pair[0].score.score_final() >= pair[1].score.score_final());
    }
    for pair in report.others.windows(2) {
        assert!(pair[0].score_final() >= pair[1].score_final());
    }
    for other in &report.others {
        let expected = if number(other.id()) % 3 == 0 { 1 } else { 0 };
        assert_eq!(other.nice_have_missing().len(), expected);
        assert_eq!(other.experience_coefficient(), 1.0);
    }
}

#[tokio::test(start_paused = true)]
async fn rerank_outage_keeps_quantitative_ranking() {
    let model = Arc::new(FakeModel {
        rerank_down: true,
        ..FakeModel::default()
    });
    let pipeline = MatchingPipeline::new(Arc::clone(&model), "fake", config());
    let report = pipeline.run(&job(), &candidates(50), &NoObserver).await.unwrap();

    // One attempt plus two retries.
    assert_eq!(model.reranked.lock().unwrap().len(), 3);
    assert_eq!(report.ranked.len(), 10);
    assert_eq!(report.degraded_count(), 10);
    for ranked in &report.ranked {
        assert_eq!(ranked.score.experience_coefficient(), 1.0);
        assert!(ranked.scoring_comment.starts_with("[degraded]"));
        let quantitative = ranked.score.score_base() * ranked.score.bonus_multiplier();
        assert!((ranked.score.score_final() - quantitative).abs() < 1e-12);
    }
    for pair in report.ranked.windows(2) {
        assert!(pair[0].score.score_final() >= pair[1].score.score_final());
    }
    assert_eq!(report.stages[3].failed_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn shuffled_input_gives_the_same_ranking() {
    let pipeline = MatchingPipeline::new(Arc::new(FakeModel::default()), "fake", config());
    let ordered = pipeline.run(&job(), &candidates(30), &NoObserver).await.unwrap();

    let mut shuffled = candidates(30);
    shuffled.shuffle(&mut StdRng::seed_from_u64(42));
    let pipeline = MatchingPipeline::new(Arc::new(FakeModel::default()), "fake", config());
    let reshuffled = pipeline.run(&job(), &shuffled, &NoObserver).await.unwrap();

    assert_eq!(ids(&ordered), ids(&reshuffled));
    let rejected = |r: &MatchReport| {
        let mut ids: Vec<String> = r.rejected.iter().map(|x| x.id.clone()).collect();
        ids.sort();
        ids
    };
    assert_eq!(rejected(&ordered), rejected(&reshuffled));
}

#[tokio::test]
async fn report_serializes_to_json() {
    let pipeline = MatchingPipeline::new(Arc::new(FakeModel::default()), "fake", PipelineConfig {
        must_have: batch(4, 1000.0),
        nice_have: batch(4, 1000.0),
        rerank: batch(1, 1000.0),
        ..config()
    });
    let report = pipeline.run(&job(), &candidates(6), &NoObserver).await.unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["stages"][0]["stage"], "ELIGIBILITY");
    assert!(json["ranked"][0]["score_final"].is_number());
    assert!(json["ranked"][0]["flags"]["gaps"].is_array());
}
