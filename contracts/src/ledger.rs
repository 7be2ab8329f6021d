//! Ledger decision types: an append-only, typed, insertion-ordered
//! stream of routing/escalation/assembly/budget events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionType {
    Route,
    Escalation,
    Assembly,
    AssemblyFailed,
    BudgetOptimization,
    ProcurementFallback,
    VarianceRecorded,
    VarianceSkipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerDecision {
    #[serde(rename = "type")]
    pub decision_type: DecisionType,
    pub package_id: Option<String>,
    pub details: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostBuckets {
    pub council_usd: f64,
    pub worker_usd: f64,
    pub qa_usd: f64,
    pub deterministic_qa_usd: f64,
}

impl CostBuckets {
    pub fn total(&self) -> f64 {
        self.council_usd + self.worker_usd + self.qa_usd + self.deterministic_qa_usd
    }
}
