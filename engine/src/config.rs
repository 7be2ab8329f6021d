//! The configuration surface described in spec §6: tier profile,
//! escalation policy, selection policy, concurrency, and the premium
//! task-type set. Constructed by the caller (the HTTP surface and demo
//! UI are out of scope for this crate) and handed whole to
//! [`crate::scheduler::run_packages`].

use std::collections::HashMap;

use contracts::{Difficulty, TaskType, TierProfile};
use router::{EscalationAwareConfig, SelectionPolicy, ThresholdConfig};

/// Lead-limit fairness bound: QA backlog is served ahead of workers
/// once `workerCompleted - qaCompleted` reaches this.
pub const WORKER_QA_LEAD_LIMIT: u32 = 2;

/// Wall-clock cap for a single run session.
pub const RUN_WALLCLOCK_CAP_SECS: u64 = 600;

#[derive(Debug, Clone)]
pub struct EscalationPolicyConfig {
    pub require_eval_for_decision: bool,
    pub max_promotions: u32,
    pub score_resolution: f64,
    pub min_score_by_difficulty: HashMap<Difficulty, f64>,
}

impl Default for EscalationPolicyConfig {
    fn default() -> Self {
        Self {
            require_eval_for_decision: false,
            max_promotions: 1,
            score_resolution: 0.02,
            min_score_by_difficulty: HashMap::from([
                (Difficulty::Low, 0.6),
                (Difficulty::Medium, 0.75),
                (Difficulty::High, 0.88),
            ]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregationConfig {
    pub package_id: String,
    pub required_files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub worker_concurrency: usize,
    pub qa_concurrency: usize,
    pub tier_profile: TierProfile,
    pub enforce_cheapest_viable: bool,
    pub selection_policy: SelectionPolicy,
    pub thresholds: ThresholdConfig,
    pub escalation_router: EscalationAwareConfig,
    pub escalation_policy: EscalationPolicyConfig,
    pub llm_second_pass_importance_threshold: u8,
    pub premium_task_types: std::collections::HashSet<TaskType>,
    pub aggregation: Option<AggregationConfig>,
    /// The model id used for the LLM QA second pass. Real deployments
    /// route this through the router too; a fixed id keeps the QA
    /// subsystem's cost accounting simple since its transport trait
    /// does not return token usage.
    pub llm_qa_model_id: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 3,
            qa_concurrency: 1,
            tier_profile: TierProfile::Standard,
            enforce_cheapest_viable: false,
            selection_policy: SelectionPolicy::LowestCostQualified,
            thresholds: ThresholdConfig::default(),
            escalation_router: EscalationAwareConfig::default(),
            escalation_policy: EscalationPolicyConfig::default(),
            llm_second_pass_importance_threshold: 4,
            premium_task_types: std::collections::HashSet::new(),
            aggregation: None,
            llm_qa_model_id: None,
        }
    }
}
