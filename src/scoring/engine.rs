use serde::Serialize;

use super::formulas::{
    DEFAULT_MALUS_FACTOR, NEUTRAL_EXPERIENCE_COEFFICIENT, clamp_experience_coefficient,
    final_score, nice_have_bonus,
};
use super::similarity::cosine_similarity;

/// A candidate's score and the factors it was computed from.
///
/// `score_final` always equals `final_score(score_base, bonus_multiplier,
/// experience_coefficient)`; factors only change by building a new value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    id: String,
    index: usize,
    score_base: f64,
    nice_have_missing: Vec<String>,
    bonus_multiplier: f64,
    experience_coefficient: f64,
    score_final: f64,
}

impl ScoredCandidate {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Position of the candidate in the submitted list; breaks score ties.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn score_base(&self) -> f64 {
        self.score_base
    }

    pub fn nice_have_missing(&self) -> &[String] {
        &self.nice_have_missing
    }

    pub fn bonus_multiplier(&self) -> f64 {
        self.bonus_multiplier
    }

    pub fn experience_coefficient(&self) -> f64 {
        self.experience_coefficient
    }

    pub fn score_final(&self) -> f64 {
        self.score_final
    }

    /// Same candidate with another experience coefficient, clamped to `[1.0, 1.4]`.
    pub fn with_experience_coefficient(&self, coefficient: f64) -> Self {
        let experience_coefficient = clamp_experience_coefficient(coefficient);
        Self {
            experience_coefficient,
            score_final: final_score(self.score_base, self.bonus_multiplier, experience_coefficient),
            ..self.clone()
        }
    }
}

/// Pure scoring: similarity, nice-have malus and experience coefficient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringEngine {
    malus_factor: f64,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MALUS_FACTOR)
    }
}

impl ScoringEngine {
    pub fn new(malus_factor: f64) -> Self {
        Self { malus_factor }
    }

    pub fn malus_factor(&self) -> f64 {
        self.malus_factor
    }

    pub fn base_score(&self, candidate: &[f32], job: &[f32]) -> f64 {
        cosine_similarity(candidate, job)
    }

    /// Scores a candidate with the neutral experience coefficient.
    pub fn score(
        &self,
        id: impl Into<String>,
        index: usize,
        score_base: f64,
        nice_have_missing: Vec<String>,
    ) -> ScoredCandidate {
        let score_base = if score_base.is_nan() { 0.0 } else { score_base.clamp(0.0, 1.0) };
        let bonus_multiplier = nice_have_bonus(nice_have_missing.len(), self.malus_factor);
        ScoredCandidate {
            id: id.into(),
            index,
            score_base,
            nice_have_missing,
            bonus_multiplier,
            experience_coefficient: NEUTRAL_EXPERIENCE_COEFFICIENT,
            score_final: final_score(score_base, bonus_multiplier, NEUTRAL_EXPERIENCE_COEFFICIENT),
        }
    }
}
