//! Trust value: per-(model, role) scalar tracking demonstrated
//! reliability.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustRole {
    Worker,
    Qa,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustValue {
    pub model_id: String,
    pub role: TrustRole,
    pub value: f64,
    pub last_updated_iso: String,
}

/// Unobserved models start at 0.7 trust.
pub const DEFAULT_TRUST: f64 = 0.7;

/// A single update may move trust by at most this much in either
/// direction.
pub const MAX_TRUST_DELTA: f64 = 0.15;

impl TrustValue {
    pub fn cold_start(model_id: impl Into<String>, role: TrustRole, now_iso: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            role,
            value: DEFAULT_TRUST,
            last_updated_iso: now_iso.into(),
        }
    }

    /// Applies `raw_delta` clamped to `[-MAX_TRUST_DELTA, MAX_TRUST_DELTA]`,
    /// then clamps the resulting value to `[0, 1]`.
    pub fn apply_bounded_update(&mut self, raw_delta: f64, now_iso: impl Into<String>) -> f64 {
        let clamped_delta = raw_delta.clamp(-MAX_TRUST_DELTA, MAX_TRUST_DELTA);
        let before = self.value;
        self.value = (self.value + clamped_delta).clamp(0.0, 1.0);
        self.last_updated_iso = now_iso.into();
        self.value - before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_update_clamps_large_delta() {
        let mut trust = TrustValue::cold_start("m1", TrustRole::Worker, "2026-01-01T00:00:00Z");
        let applied = trust.apply_bounded_update(10.0, "2026-01-02T00:00:00Z");
        assert_eq!(applied, MAX_TRUST_DELTA);
        assert!(trust.value <= 1.0);
    }

    #[test]
    fn bounded_update_never_exceeds_unit_interval() {
        let mut trust = TrustValue::cold_start("m1", TrustRole::Qa, "2026-01-01T00:00:00Z");
        for _ in 0..50 {
            trust.apply_bounded_update(-1.0, "2026-01-01T00:00:00Z");
        }
        assert!(trust.value >= 0.0);
    }
}
