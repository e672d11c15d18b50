use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use super::rerank::RerankVerdict;
use crate::engine::ProcessingOutcome;
use crate::scoring::{NEUTRAL_EXPERIENCE_COEFFICIENT, ScoredCandidate};
use crate::timeline::TimelineFlags;

/// A shortlisted candidate after re-ranking, or after its fallback.
#[derive(Debug, Clone, Serialize)]
pub struct RankedCandidate {
    #[serde(flatten)]
    pub score: ScoredCandidate,
    pub scoring_comment: String,
    pub overall_assessment: String,
    /// Re-ranking did not cover this candidate; the coefficient is neutral.
    pub degraded: bool,
    pub flags: TimelineFlags,
}

/// Merges stage outcomes into the final ordering.
pub struct ResultAggregator;

impl ResultAggregator {
    /// Highest `score_final` first; ties keep submission order.
    pub fn compare(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
        b.score_final()
            .total_cmp(&a.score_final())
            .then_with(|| a.index().cmp(&b.index()))
    }

    pub fn sort_stable(candidates: &mut [ScoredCandidate]) {
        candidates.sort_by(Self::compare);
    }

    pub fn sort_ranked(candidates: &mut [RankedCandidate]) {
        candidates.sort_by(|a, b| Self::compare(&a.score, &b.score));
    }

    /// Applies re-ranking verdicts to the shortlist.
    ///
    /// Without a successful outcome every candidate keeps its scores with the
    /// neutral coefficient; candidates the reply left out are handled the same way.
    pub fn merge_rerank(
        shortlist: Vec<(ScoredCandidate, TimelineFlags)>,
        outcome: Option<&ProcessingOutcome<Vec<RerankVerdict>>>,
    ) -> Vec<RankedCandidate> {
        let verdicts = match outcome.and_then(|o| o.result.as_ref()) {
            Some(verdicts) => verdicts,
            None => {
                let reason = outcome
                    .map(|o| o.rationale.as_str())
                    .filter(|r| !r.is_empty())
                    .unwrap_or("re-ranking did not run");
                warn!(candidates = shortlist.len(), reason, "re-ranking unavailable, using base scores");
                let mut ranked: Vec<RankedCandidate> = shortlist
                    .into_iter()
                    .map(|(score, flags)| Self::degraded(score, flags, reason))
                    .collect();
                Self::sort_ranked(&mut ranked);
                return ranked;
            }
        };

        let mut by_id: HashMap<&str, &RerankVerdict> = HashMap::with_capacity(verdicts.len());
        for verdict in verdicts {
            by_id.entry(verdict.id.as_str()).or_insert(verdict);
        }

        let mut ranked: Vec<RankedCandidate> = shortlist
            .into_iter()
            .map(|(score, flags)| match by_id.get(score.id()) {
                Some(verdict) => RankedCandidate {
                    score: score.with_experience_coefficient(verdict.experience_coefficient),
                    scoring_comment: verdict.scoring_comment.clone(),
                    overall_assessment: verdict.overall_assessment.clone(),
                    degraded: false,
                    flags,
                },
                None => Self::degraded(score, flags, "candidate missing from the re-ranking reply"),
            })
            .collect();
        Self::sort_ranked(&mut ranked);
        ranked
    }

    /// Keeps the quantitative scores with a neutral coefficient.
    pub fn degraded(score: ScoredCandidate, flags: TimelineFlags, reason: &str) -> RankedCandidate {
        let score = score.with_experience_coefficient(NEUTRAL_EXPERIENCE_COEFFICIENT);
        let scoring_comment = format!(
            "[degraded] re-ranking unavailable ({reason}). Score base: {:.3}, \
             nice-have bonus: {:.3}, score final: {:.3}. Ordered by final score with a neutral coefficient.",
            score.score_base(),
            score.bonus_multiplier(),
            score.score_final()
        );
        RankedCandidate {
            score,
            scoring_comment,
            overall_assessment: "Qualitative analysis unavailable. Quantitative scores \
                                 (embedding similarity and nice-have bonus) remain valid."
                .to_string(),
            degraded: true,
            flags,
        }
    }
}
