//! Router decision and audit trail shapes returned by the router.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    LowestCostQualified,
    BestValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryBlocker {
    Savings,
    Confidence,
    Gap,
    NoPromotionTarget,
    Budget,
    PremiumLane,
    NoCheapFirstCandidates,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateProgress {
    pub after_savings: u32,
    pub after_confidence: u32,
    pub after_gap: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateAudit {
    pub model_id: String,
    pub predicted_cost_usd: f64,
    pub predicted_quality: f64,
    pub passed: bool,
    pub filtered_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationAwareAudit {
    pub gate_progress: GateProgress,
    pub primary_blocker: Option<PrimaryBlocker>,
    pub premium_lane: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingAudit {
    pub candidates: Vec<CandidateAudit>,
    pub ranked_by: String,
    pub enforce_cheapest_viable: bool,
    pub chosen_is_cheapest_viable: bool,
    pub escalation_aware: Option<EscalationAwareAudit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterDecision {
    pub chosen_model_id: String,
    pub expected_cost_usd: f64,
    pub estimated_input_tokens: u64,
    pub estimated_output_tokens: u64,
    pub routing_audit: RoutingAudit,
}
