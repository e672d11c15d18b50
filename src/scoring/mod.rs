//! Deterministic candidate scoring.

pub mod engine;
pub mod formulas;
pub mod similarity;

pub use engine::{ScoredCandidate, ScoringEngine};
pub use formulas::{
    DEFAULT_MALUS_FACTOR, NEUTRAL_EXPERIENCE_COEFFICIENT, clamp_experience_coefficient,
    coefficient_from_value, final_score, nice_have_bonus,
};
pub use similarity::cosine_similarity;
