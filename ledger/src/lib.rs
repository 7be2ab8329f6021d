//! Per-run-session ledger: an append-only, typed decision stream plus
//! aggregated cost buckets. The scheduler's commit step is the only
//! writer; the ledger itself is a passive value the run-session store
//! later persists.

use std::collections::HashMap;

use contracts::{CostBuckets, DecisionType, LedgerDecision};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostBucket {
    Council,
    Worker,
    Qa,
    DeterministicQa,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrustDeltaRecord {
    pub model_id: String,
    pub role: contracts::TrustRole,
    pub before: f64,
    pub after: f64,
}

#[derive(Debug, Clone, Default)]
pub struct VarianceCounts {
    pub recorded: u32,
    pub skipped: u32,
    pub skip_reasons: HashMap<String, u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerSummary {
    pub run_session_id: String,
    pub decision_count: usize,
    pub costs: CostBuckets,
    pub completed_count: usize,
    pub role_executions: Option<HashMap<String, u32>>,
}

/// An append-only, insertion-ordered decision stream for a single run
/// session. Not thread-safe by itself: callers serialize access via the
/// scheduler's single commit step, matching the ownership model.
pub struct Ledger {
    run_session_id: String,
    decisions: Vec<LedgerDecision>,
    costs: CostBuckets,
    trust_deltas: Vec<TrustDeltaRecord>,
    variance: VarianceCounts,
}

impl Ledger {
    pub fn new(run_session_id: impl Into<String>) -> Self {
        Self {
            run_session_id: run_session_id.into(),
            decisions: Vec::new(),
            costs: CostBuckets::default(),
            trust_deltas: Vec::new(),
            variance: VarianceCounts::default(),
        }
    }

    pub fn run_session_id(&self) -> &str {
        &self.run_session_id
    }

    pub fn decisions(&self) -> &[LedgerDecision] {
        &self.decisions
    }

    pub fn costs(&self) -> CostBuckets {
        self.costs
    }

    pub fn trust_deltas(&self) -> &[TrustDeltaRecord] {
        &self.trust_deltas
    }

    pub fn variance(&self) -> &VarianceCounts {
        &self.variance
    }

    /// Appends a decision in insertion order. `details` is an opaque
    /// key-value map; callers build it from whatever context is
    /// relevant to the decision type.
    pub fn record_decision(
        &mut self,
        decision_type: DecisionType,
        package_id: Option<String>,
        details: HashMap<String, Value>,
    ) {
        tracing::debug!(
            run_session_id = %self.run_session_id,
            decision_type = ?decision_type,
            package_id = ?package_id,
            "ledger decision recorded"
        );
        self.decisions.push(LedgerDecision {
            decision_type,
            package_id,
            details,
        });
    }

    pub fn record_cost(&mut self, bucket: CostBucket, delta: f64) {
        match bucket {
            CostBucket::Council => self.costs.council_usd += delta,
            CostBucket::Worker => self.costs.worker_usd += delta,
            CostBucket::Qa => self.costs.qa_usd += delta,
            CostBucket::DeterministicQa => self.costs.deterministic_qa_usd += delta,
        }
    }

    pub fn record_trust_delta(
        &mut self,
        model_id: impl Into<String>,
        role: contracts::TrustRole,
        before: f64,
        after: f64,
    ) {
        self.trust_deltas.push(TrustDeltaRecord {
            model_id: model_id.into(),
            role,
            before,
            after,
        });
    }

    pub fn record_variance_recorded(&mut self, package_id: &str) {
        self.variance.recorded += 1;
        let mut details = HashMap::new();
        details.insert("packageId".to_string(), Value::String(package_id.to_string()));
        self.record_decision(DecisionType::VarianceRecorded, Some(package_id.to_string()), details);
    }

    pub fn record_variance_skipped(&mut self, package_id: &str, reason: &str) {
        self.variance.skipped += 1;
        *self.variance.skip_reasons.entry(reason.to_string()).or_insert(0) += 1;
        let mut details = HashMap::new();
        details.insert("reason".to_string(), Value::String(reason.to_string()));
        self.record_decision(DecisionType::VarianceSkipped, Some(package_id.to_string()), details);
    }

    /// Stamps completion counts. Does not clear the decision stream:
    /// the ledger remains readable after finalization.
    pub fn finalize(
        &self,
        completed_count: usize,
        role_executions: Option<HashMap<String, u32>>,
    ) -> LedgerSummary {
        LedgerSummary {
            run_session_id: self.run_session_id.clone(),
            decision_count: self.decisions.len(),
            costs: self.costs,
            completed_count,
            role_executions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::TrustRole;

    #[test]
    fn record_decision_preserves_insertion_order() {
        let mut ledger = Ledger::new("run-1");
        ledger.record_decision(DecisionType::Route, Some("pkg-1".into()), HashMap::new());
        ledger.record_decision(DecisionType::Assembly, Some("pkg-2".into()), HashMap::new());
        let types: Vec<DecisionType> = ledger.decisions().iter().map(|d| d.decision_type).collect();
        assert_eq!(types, vec![DecisionType::Route, DecisionType::Assembly]);
    }

    #[test]
    fn record_cost_accumulates_per_bucket() {
        let mut ledger = Ledger::new("run-1");
        ledger.record_cost(CostBucket::Worker, 0.01);
        ledger.record_cost(CostBucket::Worker, 0.02);
        ledger.record_cost(CostBucket::Qa, 0.005);
        assert_eq!(ledger.costs().worker_usd, 0.03);
        assert_eq!(ledger.costs().qa_usd, 0.005);
        assert!((ledger.costs().total() - 0.035).abs() < 1e-9);
    }

    #[test]
    fn variance_skipped_tracks_reason_counts() {
        let mut ledger = Ledger::new("run-1");
        ledger.record_variance_skipped("pkg-1", "qa_trust_low");
        ledger.record_variance_skipped("pkg-2", "qa_trust_low");
        assert_eq!(ledger.variance().skipped, 2);
        assert_eq!(ledger.variance().skip_reasons.get("qa_trust_low"), Some(&2));
    }

    #[test]
    fn finalize_stamps_completion_counts() {
        let mut ledger = Ledger::new("run-1");
        ledger.record_trust_delta("model-a", TrustRole::Worker, 0.7, 0.75);
        let summary = ledger.finalize(3, None);
        assert_eq!(summary.completed_count, 3);
        assert_eq!(summary.run_session_id, "run-1");
        assert_eq!(ledger.trust_deltas().len(), 1);
    }
}
