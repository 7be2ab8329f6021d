//! Self-contained outcome records a dispatched task returns. The
//! scheduler never mutates shared state from inside a task; every
//! task folds its result into one of these and the commit step is the
//! only place that reads them.

use contracts::{QaModelId, QaResult, RouterDecision, TaskType, WorkerRun};

/// What a worker dispatch needs the commit step to know beyond the
/// [`WorkerRun`] itself.
pub struct WorkerSuccess {
    pub run: WorkerRun,
    pub routing_audit: RouterDecision,
    pub task_type: TaskType,
    pub difficulty: contracts::Difficulty,
    pub used_fallback_catalog: bool,
    /// `Some` only for the aggregation package, when at least one
    /// dependency artifact was missing or empty at dispatch time.
    pub aggregation_missing_deps: Option<Vec<String>>,
}

pub struct WorkerTaskOutcome {
    pub package_id: String,
    /// `Err(warning)` on transport failure or routing failure: the
    /// package does not complete and its dependents stay blocked.
    pub result: Result<WorkerSuccess, String>,
}

/// What a QA dispatch needs the commit step to know.
pub struct QaSuccess {
    pub result: QaResult,
    pub qa_model_id: QaModelId,
    pub used_llm: bool,
    pub llm_rejected_warning: Option<String>,
    pub budget_gated: bool,
    pub predicted_llm_cost_usd: f64,
    pub actual_llm_cost_usd: f64,
    pub is_aggregation_target: bool,
    /// The deterministic shell-check verdict, when any checks ran, for
    /// QA-trust agreement scoring against an LLM second pass.
    pub deterministic_pass: Option<bool>,
    pub assembly_outcome: Option<Result<crate::collaborators::AssemblyOutcome, String>>,
}

pub struct QaTaskOutcome {
    pub package_id: String,
    pub worker_package_id: String,
    pub result: Result<QaSuccess, String>,
}

/// The run's starting/ending budget figures, returned alongside the
/// committed runs and results.
#[derive(Debug, Clone, Copy)]
pub struct BudgetSummary {
    pub starting_usd: f64,
    pub remaining_usd: f64,
    pub escalation_spend_usd: f64,
}

#[derive(Debug, Clone)]
pub struct EscalationRecord {
    pub package_id: String,
    pub reason: escalation::EscalationReason,
    pub promoted_tier: Option<contracts::TierProfile>,
}

/// The engine's single public return value (spec §4.8, §7): always
/// populated, even on a partial/budget-exhausted/cancelled run. Only
/// graph validation and deadlock are terminal failures instead.
pub struct RunPackagesResult {
    pub runs: Vec<WorkerRun>,
    pub qa_results: Vec<QaResult>,
    pub escalations: Vec<EscalationRecord>,
    pub budget: BudgetSummary,
    pub warnings: Vec<String>,
}
