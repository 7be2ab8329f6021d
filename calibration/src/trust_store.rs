//! Per-(model, role) trust values, updated by a bounded exponential
//! moving adjustment on every QA outcome.

use std::collections::HashMap;

use contracts::{TrustRole, TrustValue};
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TrustKey {
    model_id_hash: u64,
    role: TrustRole,
}

fn key_for(model_id: &str, role: TrustRole) -> TrustKey {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    model_id.hash(&mut hasher);
    TrustKey {
        model_id_hash: hasher.finish(),
        role,
    }
}

/// Inputs to a worker trust update: QA pass/fail, the signed delta
/// between actual and predicted quality, and the cost-variance ratio
/// observed on this run.
pub struct WorkerTrustInput {
    pub qa_pass: bool,
    pub quality_delta: f64,
    pub cost_variance_ratio: f64,
}

/// A QA model's trust updates on agreement with deterministic ground
/// truth, when both ran on the same worker output.
pub struct QaTrustInput {
    pub agreed_with_deterministic: Option<bool>,
}

pub struct TrustStore {
    entries: RwLock<HashMap<TrustKey, TrustValue>>,
}

impl Default for TrustStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_or_init(&self, model_id: &str, role: TrustRole, now_iso: &str) -> TrustValue {
        let key = key_for(model_id, role);
        let mut entries = self.entries.write();
        entries
            .entry(key)
            .or_insert_with(|| TrustValue::cold_start(model_id, role, now_iso))
            .clone()
    }

    /// Applies a worker trust update and returns the resulting value.
    pub fn apply_worker_update(
        &self,
        model_id: &str,
        input: WorkerTrustInput,
        now_iso: &str,
    ) -> TrustValue {
        let raw_delta = worker_trust_delta(&input);
        self.apply_raw_delta(model_id, TrustRole::Worker, raw_delta, now_iso)
    }

    /// Applies a QA-model trust update and returns the resulting value.
    pub fn apply_qa_update(&self, model_id: &str, input: QaTrustInput, now_iso: &str) -> TrustValue {
        let raw_delta = qa_trust_delta(&input);
        self.apply_raw_delta(model_id, TrustRole::Qa, raw_delta, now_iso)
    }

    fn apply_raw_delta(&self, model_id: &str, role: TrustRole, raw_delta: f64, now_iso: &str) -> TrustValue {
        let key = key_for(model_id, role);
        let mut entries = self.entries.write();
        let value = entries
            .entry(key)
            .or_insert_with(|| TrustValue::cold_start(model_id, role, now_iso));
        value.apply_bounded_update(raw_delta, now_iso);
        value.clone()
    }
}

/// Weighted combination of pass/fail, the quality-prediction delta, and
/// cost-variance agreement. Deliberately generous: `TrustValue::apply_bounded_update`
/// clamps the final per-update step to `[-0.15, 0.15]` regardless of
/// this raw magnitude.
fn worker_trust_delta(input: &WorkerTrustInput) -> f64 {
    let pass_component = if input.qa_pass { 0.06 } else { -0.12 };
    let quality_component = input.quality_delta.clamp(-1.0, 1.0) * 0.1;
    let cost_agreement = 1.0 - (input.cost_variance_ratio - 1.0).abs().min(1.0);
    let cost_component = (cost_agreement - 0.5) * 0.04;

    0.5 * pass_component + 0.3 * quality_component + 0.2 * cost_component
}

fn qa_trust_delta(input: &QaTrustInput) -> f64 {
    match input.agreed_with_deterministic {
        Some(true) => 0.05,
        Some(false) => -0.1,
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_pass_increases_trust() {
        let store = TrustStore::new();
        let before = store.get_or_init("m1", TrustRole::Worker, "2026-01-01T00:00:00Z");
        let after = store.apply_worker_update(
            "m1",
            WorkerTrustInput {
                qa_pass: true,
                quality_delta: 0.05,
                cost_variance_ratio: 1.0,
            },
            "2026-01-02T00:00:00Z",
        );
        assert!(after.value > before.value);
        assert!(after.value <= 1.0);
    }

    #[test]
    fn worker_fail_never_drops_more_than_bound_per_update() {
        let store = TrustStore::new();
        let before = store.get_or_init("m2", TrustRole::Worker, "2026-01-01T00:00:00Z");
        let after = store.apply_worker_update(
            "m2",
            WorkerTrustInput {
                qa_pass: false,
                quality_delta: -1.0,
                cost_variance_ratio: 5.0,
            },
            "2026-01-02T00:00:00Z",
        );
        assert!((before.value - after.value) <= contracts::MAX_TRUST_DELTA + 1e-9);
        assert!(after.value >= 0.0);
    }

    #[test]
    fn qa_disagreement_decreases_trust() {
        let store = TrustStore::new();
        let before = store.get_or_init("judge-1", TrustRole::Qa, "2026-01-01T00:00:00Z");
        let after = store.apply_qa_update(
            "judge-1",
            QaTrustInput {
                agreed_with_deterministic: Some(false),
            },
            "2026-01-02T00:00:00Z",
        );
        assert!(after.value < before.value);
    }
}
