//! Scoring formulas. Results must be reproducible for identical inputs, so the
//! multiplication order is fixed: base, then bonus, then coefficient, clamp last.

use serde_json::Value;

pub const DEFAULT_MALUS_FACTOR: f64 = 0.95;
pub const MIN_EXPERIENCE_COEFFICIENT: f64 = 1.0;
pub const MAX_EXPERIENCE_COEFFICIENT: f64 = 1.4;
pub const NEUTRAL_EXPERIENCE_COEFFICIENT: f64 = 1.0;

fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

/// `malus_factor ^ missing_count`, or `1.0` when nothing is missing.
pub fn nice_have_bonus(missing_count: usize, malus_factor: f64) -> f64 {
    if missing_count == 0 {
        return 1.0;
    }
    clamp_unit(malus_factor.powf(missing_count as f64))
}

pub fn final_score(base: f64, bonus: f64, experience_coefficient: f64) -> f64 {
    clamp_unit(base * bonus * experience_coefficient)
}

/// Clamps to `[1.0, 1.4]`; NaN becomes the neutral `1.0`.
pub fn clamp_experience_coefficient(x: f64) -> f64 {
    if x.is_nan() {
        NEUTRAL_EXPERIENCE_COEFFICIENT
    } else {
        x.clamp(MIN_EXPERIENCE_COEFFICIENT, MAX_EXPERIENCE_COEFFICIENT)
    }
}

/// Reads a coefficient out of untrusted model JSON.
///
/// Numbers and numeric strings are clamped; everything else is neutral.
pub fn coefficient_from_value(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.map_or(NEUTRAL_EXPERIENCE_COEFFICIENT, clamp_experience_coefficient)
}
