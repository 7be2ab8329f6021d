//! Shared data model and strict-JSON contracts for the work-package
//! orchestration engine.
//!
//! Every subsystem (catalog, calibration, router, escalation, qa,
//! artifacts, ledger, engine) exchanges data through the types defined
//! here so that no component holds a live handle into another
//! component's mutable state — only string ids and these value types
//! cross the boundary.

pub mod aggregation;
pub mod artifact;
pub mod error;
pub mod ledger;
pub mod model_registry;
pub mod performance_prior;
pub mod qa_verdict;
pub mod router_decision;
mod schema;
pub mod task_card;
pub mod trust;
pub mod work_package;
pub mod worker_run;

pub use aggregation::{
    validate_aggregation_output_value, validate_aggregation_package_output,
    AggregationOutputContract, AggregationReport, BANNED_PHRASES,
};
pub use artifact::{
    Artifact, ArtifactExcerpt, ARTIFACT_CONTENT_CAP, ARTIFACT_REGISTRY_MAX_CHARS,
    ARTIFACT_REGISTRY_MAX_COUNT,
};
pub use error::{ContractError, ContractKind, ValidationIssue};
pub use ledger::{CostBuckets, DecisionType, LedgerDecision};
pub use model_registry::{
    Currency, Governance, ModelIdentity, ModelRegistryEntry, ModelStatus, ModelTimestamps, Pricing,
};
pub use performance_prior::PerformancePrior;
pub use qa_verdict::{validate_qa_verdict_value, QaVerdictContract};
pub use router_decision::{
    CandidateAudit, EscalationAwareAudit, GateProgress, PrimaryBlocker, RouterDecision,
    RoutingAudit, SelectionPolicy,
};
pub use task_card::{TaskCard, TaskConstraints};
pub use trust::{TrustRole, TrustValue, DEFAULT_TRUST, MAX_TRUST_DELTA};
pub use work_package::{
    Difficulty, QaCheck, QaPolicy, Role, ShellCheckKind, TaskType, TierProfile, WorkPackage,
};
pub use worker_run::{QaModelId, QaResult, WorkerRun};
