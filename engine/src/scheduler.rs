//! The work-package scheduler (§4.8, §5): a dependency-aware
//! concurrent loop with lead-limit fairness between worker and QA
//! backlogs, a pre-flight batch budget gate, and a single serialized
//! commit step that is the only writer to shared run state.
//!
//! Dispatch (routing, LLM calls, shell checks) is pure fan-out: every
//! task returns a self-contained [`crate::outcome`] record instead of
//! touching shared state directly. Only the commit step — which never
//! awaits — mutates the run's ledger, budget, trust, priors, and ready
//! queues.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{
    Difficulty, QaModelId, QaResult, Role, TaskCard, TaskConstraints, TaskType, TierProfile,
    TrustRole, WorkPackage, WorkerRun,
};

use artifacts::{ArtifactRegistry, ExcerptLimits};
use calibration::{Observation, PriorStore, QaTrustInput, TrustStore, WorkerTrustInput};
use catalog::{
    cheapest_reasonable_cost, static_fallback_catalog, CredentialGate, ListEligibleFilter,
    ModelCatalog,
};
use cost::TokenUsage;
use escalation::{EscalationController, EscalationInput};
use ledger::{CostBucket, Ledger};
use qa::ShellAllowlist;
use resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

use crate::collaborators::{AssemblyCollaborator, LlmResponse, LlmTransport, QaLlmAdapter};
use crate::config::{EngineConfig, RUN_WALLCLOCK_CAP_SECS, WORKER_QA_LEAD_LIMIT};
use crate::error::EngineError;
use crate::graph::{self, Graph};
use crate::inference;
use crate::outcome::{
    BudgetSummary, EscalationRecord, QaSuccess, QaTaskOutcome, RunPackagesResult, WorkerSuccess,
    WorkerTaskOutcome,
};
use crate::prompt::{build_worker_prompt, extract_self_confidence, DependencyExcerpt};

/// External collaborators and shared stores the scheduler reads and
/// writes over the course of a run. One instance per run session.
pub struct Dependencies {
    pub catalog: Arc<ModelCatalog>,
    pub priors: Arc<PriorStore>,
    pub trust: Arc<TrustStore>,
    pub transport: Arc<dyn LlmTransport>,
    pub assembly: Arc<dyn AssemblyCollaborator>,
    pub credentials: Arc<dyn CredentialGate>,
    pub shell_allowlist: Arc<ShellAllowlist>,
    /// Working directory shell QA checks spawn in. Checkout/workspace
    /// management for a run session is out of scope for this crate.
    pub qa_workspace_dir: PathBuf,
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn next_tier_up(tier: TierProfile) -> Option<TierProfile> {
    match tier {
        TierProfile::Cheap => Some(TierProfile::Standard),
        TierProfile::Standard => Some(TierProfile::Premium),
        TierProfile::Premium => None,
    }
}

/// Highest-importance-first, then hardest, then most-depended-on,
/// then lexical id as a deterministic tiebreaker.
fn sort_by_priority(ids: &mut [String], id_to_pkg: &HashMap<String, WorkPackage>, downstream_count: &HashMap<String, u32>) {
    ids.sort_by(|a, b| {
        let pa = &id_to_pkg[a];
        let pb = &id_to_pkg[b];
        let key_a = (
            -(pa.importance as i32),
            -(pa.difficulty.rank() as i32),
            -(downstream_count.get(a).copied().unwrap_or(0) as i32),
            a,
        );
        let key_b = (
            -(pb.importance as i32),
            -(pb.difficulty.rank() as i32),
            -(downstream_count.get(b).copied().unwrap_or(0) as i32),
            b,
        );
        key_a.cmp(&key_b)
    });
}

fn take_batch(ids: &mut Vec<String>, id_to_pkg: &HashMap<String, WorkPackage>, downstream_count: &HashMap<String, u32>, n: usize) -> Vec<String> {
    sort_by_priority(ids, id_to_pkg, downstream_count);
    let n = n.min(ids.len());
    ids.drain(0..n).collect()
}

/// Everything a planned worker dispatch needs to execute, computed
/// synchronously from the catalog/router/cost models so the batch
/// budget gate can run before any LLM call is made.
struct WorkerPlan {
    decision: contracts::RouterDecision,
    chosen_entry: contracts::ModelRegistryEntry,
    predicted_quality: f64,
    task_type: TaskType,
    difficulty: Difficulty,
    used_fallback_catalog: bool,
    prompt: String,
    aggregation_missing_deps: Option<Vec<String>>,
    is_aggregation_short_circuit: bool,
}

fn plan_worker(
    pkg: &WorkPackage,
    config: &EngineConfig,
    catalog: &ModelCatalog,
    priors: &PriorStore,
    credentials: &dyn CredentialGate,
    artifact_registry: &ArtifactRegistry,
    remaining_usd: f64,
    tier_override: Option<TierProfile>,
) -> Result<WorkerPlan, String> {
    let task_type = pkg.task_type;
    let difficulty = pkg.difficulty;

    if inference::disagrees_with_declared(&pkg.name, &pkg.description, task_type) {
        tracing::debug!(
            package_id = %pkg.id,
            declared = ?task_type,
            "keyword inference disagrees with declared taskType"
        );
    }

    let tier = tier_override
        .or(pkg.tier_profile_override)
        .unwrap_or(config.tier_profile);

    let filter = ListEligibleFilter {
        tier_profile: tier,
        task_type,
        difficulty,
        budget_remaining_usd: remaining_usd,
        importance: Some(pkg.importance),
        credentials,
    };
    let eligible_result = catalog.list_eligible(&filter);
    let (entries, used_fallback_catalog) = if eligible_result.eligible.is_empty() {
        let fallback: Vec<_> = static_fallback_catalog()
            .into_iter()
            .filter(|e| e.allowed_tiers.contains(&tier))
            .collect();
        if fallback.is_empty() {
            return Err(format!("no eligible or fallback models for tier {tier:?}"));
        }
        (fallback, true)
    } else {
        (eligible_result.eligible, false)
    };

    let input_tokens = router::tokens::estimate_input_tokens(pkg.description.len(), task_type);
    let output_tokens = router::tokens::estimate_output_tokens(task_type, difficulty);

    let mut candidates = Vec::with_capacity(entries.len());
    let mut quality_by_model: HashMap<String, f64> = HashMap::new();
    for entry in &entries {
        let model_priors = priors.load_priors_for_model(&entry.id);
        let predicted = cost::compute_predicted_cost(
            &entry.pricing,
            TokenUsage {
                input: input_tokens as f64,
                output: output_tokens as f64,
            },
            Some(&model_priors),
            task_type,
            difficulty,
        );
        let prior_match = model_priors
            .iter()
            .find(|p| p.task_type == task_type && p.difficulty == difficulty);
        let predicted_quality = match prior_match {
            Some(p) => p.quality_prior * 0.7 + entry.expertise_for(task_type) * 0.3,
            None => entry.reliability * 0.7 + entry.expertise_for(task_type) * 0.3,
        };
        quality_by_model.insert(entry.id.clone(), predicted_quality);
        candidates.push(router::CandidateInput {
            model_id: entry.id.clone(),
            predicted_cost_usd: predicted.predicted_cost_usd,
            predicted_quality,
            candidate_score: None,
            expertise: entry.expertise_for(task_type),
            calibration_confidence: prior_match.map(|p| p.calibration_confidence),
        });
    }

    let task_card = TaskCard {
        id: pkg.id.clone(),
        task_type,
        difficulty,
        constraints: TaskConstraints::default(),
    };

    let escalation_cfg = if config.escalation_router.routing_mode == router::RoutingMode::EscalationAware {
        Some(&config.escalation_router)
    } else {
        None
    };

    let decision = router::route(router::RoutingRequest {
        task_card: &task_card,
        candidates,
        thresholds: &config.thresholds,
        selection_policy: config.selection_policy,
        cheapest_viable_chosen: pkg.cheapest_viable_chosen || config.enforce_cheapest_viable,
        prefer_model_ids: None,
        allowed_model_ids: None,
        escalation: escalation_cfg,
        estimated_input_tokens: input_tokens,
        estimated_output_tokens: output_tokens,
    })
    .map_err(|err| format!("routing failed: {err}"))?;

    let chosen_entry = entries
        .iter()
        .find(|e| e.id == decision.chosen_model_id)
        .cloned()
        .expect("router only chooses among supplied candidates");
    let predicted_quality = quality_by_model.get(&chosen_entry.id).copied().unwrap_or(0.5);

    let is_aggregation_target = config
        .aggregation
        .as_ref()
        .map(|agg| agg.package_id == pkg.id)
        .unwrap_or(false);

    let mut aggregation_missing_deps: Option<Vec<String>> = None;
    let mut dependency_excerpts = Vec::new();
    for dep_id in &pkg.dependencies {
        let excerpt = artifact_registry.get_excerpt_by_package_id(dep_id, ExcerptLimits::default());
        match excerpt {
            Ok(excerpt) if !excerpt.head.is_empty() || !excerpt.tail.is_empty() => {
                dependency_excerpts.push(DependencyExcerpt {
                    package_id: dep_id.clone(),
                    text: format!("{}{}", excerpt.head, excerpt.tail),
                });
            }
            _ => {
                if is_aggregation_target {
                    aggregation_missing_deps.get_or_insert_with(Vec::new).push(dep_id.clone());
                }
            }
        }
    }

    let required_files = config
        .aggregation
        .as_ref()
        .filter(|a| a.package_id == pkg.id)
        .map(|a| a.required_files.clone());
    let prompt = build_worker_prompt(pkg, &dependency_excerpts, required_files.as_deref());

    let is_aggregation_short_circuit = is_aggregation_target && aggregation_missing_deps.is_some();

    Ok(WorkerPlan {
        decision,
        chosen_entry,
        predicted_quality,
        task_type,
        difficulty,
        used_fallback_catalog,
        prompt,
        aggregation_missing_deps,
        is_aggregation_short_circuit,
    })
}

fn plan_predicted_cost(plan: &WorkerPlan) -> f64 {
    if plan.is_aggregation_short_circuit {
        0.0
    } else {
        plan.decision.expected_cost_usd
    }
}

async fn execute_worker(
    pkg: WorkPackage,
    plan: WorkerPlan,
    transport: Arc<dyn LlmTransport>,
    circuit_breaker: Arc<CircuitBreaker>,
    artifact_registry: Arc<ArtifactRegistry>,
) -> WorkerTaskOutcome {
    if plan.is_aggregation_short_circuit {
        let synthetic = contracts::AggregationOutputContract::missing_dependencies_synthetic();
        let output = serde_json::to_string(&synthetic).unwrap_or_default();
        let created = artifact_registry.create(&pkg.id, &plan.chosen_entry.id, &output);
        let run = WorkerRun {
            package_id: pkg.id.clone(),
            model_id: plan.chosen_entry.id.clone(),
            output,
            predicted_quality: plan.predicted_quality,
            actual_quality: None,
            predicted_cost_usd: 0.0,
            actual_cost_usd: 0.0,
            is_estimated_cost: false,
            self_confidence: None,
            artifact_id: created.artifact_id,
            artifact_hash: created.hash,
        };
        return WorkerTaskOutcome {
            package_id: pkg.id.clone(),
            result: Ok(WorkerSuccess {
                run,
                routing_audit: plan.decision,
                task_type: plan.task_type,
                difficulty: plan.difficulty,
                used_fallback_catalog: plan.used_fallback_catalog,
                aggregation_missing_deps: plan.aggregation_missing_deps,
            }),
        };
    }

    let model_id = plan.chosen_entry.id.clone();
    let prompt = plan.prompt.clone();
    let operation = move || {
        let transport = transport.clone();
        let model_id = model_id.clone();
        let prompt = prompt.clone();
        Box::pin(async move {
            transport
                .execute(&model_id, &prompt)
                .await
                .map_err(|err| Box::new(err) as Box<dyn std::error::Error + Send + Sync>)
        }) as std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<LlmResponse, Box<dyn std::error::Error + Send + Sync>>> + Send>,
        >
    };

    let response = match circuit_breaker.execute(operation, None).await {
        Ok(response) => response,
        Err(err) => {
            return WorkerTaskOutcome {
                package_id: pkg.id.clone(),
                result: Err(format!("{err}")),
            };
        }
    };

    let actual_usage_cost = response.usage.map(|usage| {
        cost::compute_predicted_cost(
            &plan.chosen_entry.pricing,
            TokenUsage {
                input: usage.input_tokens as f64,
                output: usage.output_tokens as f64,
            },
            None,
            plan.task_type,
            plan.difficulty,
        )
        .predicted_cost_usd
    });
    let (actual_cost_usd, is_estimated_cost) = match actual_usage_cost {
        Some(cost) => (cost, false),
        None => (plan.decision.expected_cost_usd, true),
    };

    let self_confidence = extract_self_confidence(&response.text);
    let created = artifact_registry.create(&pkg.id, &plan.chosen_entry.id, &response.text);

    let run = WorkerRun {
        package_id: pkg.id.clone(),
        model_id: plan.chosen_entry.id.clone(),
        output: response.text,
        predicted_quality: plan.predicted_quality,
        actual_quality: None,
        predicted_cost_usd: plan.decision.expected_cost_usd,
        actual_cost_usd,
        is_estimated_cost,
        self_confidence,
        artifact_id: created.artifact_id,
        artifact_hash: created.hash,
    };

    WorkerTaskOutcome {
        package_id: pkg.id.clone(),
        result: Ok(WorkerSuccess {
            run,
            routing_audit: plan.decision,
            task_type: plan.task_type,
            difficulty: plan.difficulty,
            used_fallback_catalog: plan.used_fallback_catalog,
            aggregation_missing_deps: plan.aggregation_missing_deps,
        }),
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_worker_batch(
    batch_ids: Vec<String>,
    id_to_pkg: &HashMap<String, WorkPackage>,
    config: &EngineConfig,
    deps: &Dependencies,
    artifact_registry: &Arc<ArtifactRegistry>,
    circuit_breaker: &Arc<CircuitBreaker>,
    remaining_usd: f64,
    retry_tier_overrides: &mut HashMap<String, TierProfile>,
    ready_workers: &mut Vec<String>,
    warnings: &mut Vec<String>,
) -> Vec<WorkerTaskOutcome> {
    let mut plans: Vec<(WorkPackage, WorkerPlan)> = Vec::new();
    for id in &batch_ids {
        let pkg = &id_to_pkg[id];
        let tier_override = retry_tier_overrides.remove(id);
        match plan_worker(
            pkg,
            config,
            &deps.catalog,
            &deps.priors,
            deps.credentials.as_ref(),
            artifact_registry,
            remaining_usd,
            tier_override,
        ) {
            Ok(plan) => plans.push((pkg.clone(), plan)),
            Err(message) => warnings.push(format!("worker {id}: {message}")),
        }
    }

    let total: f64 = plans.iter().map(|(_, plan)| plan_predicted_cost(plan)).sum();
    if total > remaining_usd && !plans.is_empty() {
        let mut sum = total;
        while sum > remaining_usd && plans.len() > 1 {
            let (pkg, plan) = plans.pop().expect("checked non-empty");
            sum -= plan_predicted_cost(&plan);
            ready_workers.push(pkg.id.clone());
        }
        warnings.push(format!(
            "Budget gating: batch predicted cost {total:.6} exceeds remaining {remaining_usd:.6}"
        ));
    }

    let futures = plans.into_iter().map(|(pkg, plan)| {
        execute_worker(pkg, plan, deps.transport.clone(), circuit_breaker.clone(), artifact_registry.clone())
    });
    futures::future::join_all(futures).await
}

async fn execute_qa(
    qa_pkg: WorkPackage,
    worker_pkg: WorkPackage,
    worker_run: WorkerRun,
    deps: Arc<Dependencies>,
    config: Arc<EngineConfig>,
    artifact_registry: Arc<ArtifactRegistry>,
    remaining_usd: f64,
) -> QaTaskOutcome {
    let is_aggregation_target = config
        .aggregation
        .as_ref()
        .map(|a| a.package_id == worker_pkg.id)
        .unwrap_or(false);

    let qa_llm_adapter = QaLlmAdapter::new(deps.transport.clone());

    let mut predicted_llm_cost_usd = 0.0;
    let mut llm_prompt = None;
    if let Some(model_id) = &config.llm_qa_model_id {
        if let Some(entry) = deps.catalog.get(model_id) {
            let input_tokens =
                router::tokens::estimate_input_tokens(worker_pkg.description.len(), worker_pkg.task_type);
            let output_tokens = 300u64;
            let predicted = cost::compute_predicted_cost(
                &entry.pricing,
                TokenUsage {
                    input: input_tokens as f64,
                    output: output_tokens as f64,
                },
                None,
                worker_pkg.task_type,
                worker_pkg.difficulty,
            );
            predicted_llm_cost_usd = predicted.predicted_cost_usd;
        }
        let excerpt = artifact_registry
            .get_excerpt_by_package_id(&worker_pkg.id, ExcerptLimits::default())
            .map(|e| format!("{}{}", e.head, e.tail))
            .unwrap_or_default();
        llm_prompt = Some(format!(
            "Review the output below for task \"{}\".\n\n{}\n\nRespond with strict JSON: {{\"pass\": bool, \"qualityScore\": number, \"defects\": string[]}}.",
            worker_pkg.name, excerpt
        ));
    }

    let policy = worker_pkg.qa_policy.unwrap_or_default();
    let request = qa::QaRunRequest {
        qa_checks: &worker_pkg.qa_checks,
        allowlist: &deps.shell_allowlist,
        cwd: &deps.qa_workspace_dir,
        policy,
        importance: worker_pkg.importance,
        llm_second_pass_importance_threshold: config.llm_second_pass_importance_threshold,
        llm_model_id: config.llm_qa_model_id.as_deref(),
        llm_prompt: llm_prompt.as_deref(),
        predicted_llm_cost_usd,
        remaining_budget_usd: remaining_usd,
    };

    let outcome = qa::run_qa(request, &qa_llm_adapter).await;
    let deterministic_pass = outcome.shell_summary.as_ref().map(|s| s.pass);

    let mut defects = outcome.verdict.defects;
    defects.truncate(5);
    let defects: Vec<String> = defects
        .into_iter()
        .map(|d| d.chars().take(200).collect())
        .collect();

    let model_id = if outcome.used_llm {
        QaModelId::Model(config.llm_qa_model_id.clone().unwrap_or_default())
    } else {
        QaModelId::Deterministic
    };

    let qa_result = QaResult {
        package_id: qa_pkg.id.clone(),
        worker_package_id: worker_pkg.id.clone(),
        pass: outcome.verdict.pass,
        quality_score: outcome.verdict.quality_score,
        defects,
        model_id: model_id.clone(),
    };

    let actual_llm_cost_usd = if outcome.used_llm { predicted_llm_cost_usd } else { 0.0 };

    let assembly_outcome = if is_aggregation_target && outcome.verdict.pass {
        match contracts::validate_aggregation_package_output(
            &worker_pkg.id,
            &worker_pkg.id,
            &worker_run.output,
        ) {
            Ok(_) => Some(
                deps.assembly
                    .assemble(&worker_run.output)
                    .await
                    .map_err(|err| err.0),
            ),
            Err(err) => Some(Err(format!("output contract rejected: {err}"))),
        }
    } else {
        None
    };

    QaTaskOutcome {
        package_id: qa_pkg.id.clone(),
        worker_package_id: worker_pkg.id.clone(),
        result: Ok(QaSuccess {
            result: qa_result,
            qa_model_id: model_id,
            used_llm: outcome.used_llm,
            llm_rejected_warning: outcome.llm_rejected_warning,
            budget_gated: outcome.budget_gated,
            predicted_llm_cost_usd,
            actual_llm_cost_usd,
            is_aggregation_target,
            deterministic_pass,
            assembly_outcome,
        }),
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_qa_batch(
    batch_ids: Vec<String>,
    id_to_pkg: &HashMap<String, WorkPackage>,
    runs: &HashMap<String, WorkerRun>,
    config: &Arc<EngineConfig>,
    deps: &Arc<Dependencies>,
    artifact_registry: &Arc<ArtifactRegistry>,
    remaining_usd: f64,
    warnings: &mut Vec<String>,
) -> Vec<QaTaskOutcome> {
    let mut futures = Vec::new();
    for id in batch_ids {
        let qa_pkg = id_to_pkg[&id].clone();
        let worker_id = qa_pkg.dependencies[0].clone();
        let Some(worker_run) = runs.get(&worker_id).cloned() else {
            warnings.push(format!("qa {id}: worker artifact for {worker_id} not found"));
            continue;
        };
        let worker_pkg = id_to_pkg[&worker_id].clone();
        futures.push(execute_qa(
            qa_pkg,
            worker_pkg,
            worker_run,
            deps.clone(),
            config.clone(),
            artifact_registry.clone(),
            remaining_usd,
        ));
    }
    futures::future::join_all(futures).await
}

/// The commit step: folds a completed worker batch into shared state.
/// Performs no awaiting and no external I/O — only in-memory reads
/// (catalog governance lookups) and writes.
#[allow(clippy::too_many_arguments)]
fn commit_worker_batch(
    outcomes: Vec<WorkerTaskOutcome>,
    id_to_pkg: &HashMap<String, WorkPackage>,
    dependents: &HashMap<String, Vec<String>>,
    indegree: &mut HashMap<String, u32>,
    ready_workers: &mut Vec<String>,
    ready_qa: &mut Vec<String>,
    runs: &mut HashMap<String, WorkerRun>,
    completed: &mut HashSet<String>,
    worker_completed: &mut u32,
    remaining_usd: &mut f64,
    ledger: &mut Ledger,
    warnings: &mut Vec<String>,
) {
    let mut sorted = outcomes;
    sorted.sort_by(|a, b| a.package_id.cmp(&b.package_id));

    for outcome in sorted {
        match outcome.result {
            Ok(success) => {
                *remaining_usd -= success.run.actual_cost_usd;
                ledger.record_cost(CostBucket::Worker, success.run.actual_cost_usd);

                let mut details = HashMap::new();
                details.insert("modelId".to_string(), serde_json::json!(success.run.model_id));
                details.insert(
                    "rankedBy".to_string(),
                    serde_json::json!(success.routing_audit.routing_audit.ranked_by),
                );
                details.insert(
                    "chosenIsCheapestViable".to_string(),
                    serde_json::json!(success.routing_audit.routing_audit.chosen_is_cheapest_viable),
                );
                ledger.record_decision(contracts::DecisionType::Route, Some(outcome.package_id.clone()), details);

                if success.used_fallback_catalog {
                    let mut fallback_details = HashMap::new();
                    fallback_details.insert("modelId".to_string(), serde_json::json!(success.run.model_id));
                    ledger.record_decision(
                        contracts::DecisionType::ProcurementFallback,
                        Some(outcome.package_id.clone()),
                        fallback_details,
                    );
                }

                if let Some(missing) = &success.aggregation_missing_deps {
                    let mut assembly_details = HashMap::new();
                    assembly_details.insert("missingDependencies".to_string(), serde_json::json!(missing));
                    ledger.record_decision(
                        contracts::DecisionType::AssemblyFailed,
                        Some(outcome.package_id.clone()),
                        assembly_details,
                    );
                    warnings.push(format!(
                        "aggregation-report: dependency artifacts missing: {}",
                        missing.join(", ")
                    ));
                }

                let first_completion = !completed.contains(&outcome.package_id);
                runs.insert(outcome.package_id.clone(), success.run);
                completed.insert(outcome.package_id.clone());
                *worker_completed += 1;

                if first_completion {
                    if let Some(deps_of) = dependents.get(&outcome.package_id) {
                        for dep_id in deps_of {
                            let entry = indegree
                                .get_mut(dep_id)
                                .expect("dependent id always present in the graph's indegree map");
                            *entry = entry.saturating_sub(1);
                            if *entry == 0 {
                                match id_to_pkg[dep_id].role {
                                    Role::Worker => ready_workers.push(dep_id.clone()),
                                    Role::Qa => ready_qa.push(dep_id.clone()),
                                }
                            }
                        }
                    }
                }
            }
            Err(message) => {
                warnings.push(format!("worker {}: {}", outcome.package_id, message));
            }
        }
    }
}

/// The commit step for a QA batch: records trust/prior updates,
/// applies variance gating, evaluates escalation, and requeues a
/// granted retry. Never awaits.
#[allow(clippy::too_many_arguments)]
fn commit_qa_batch(
    outcomes: Vec<QaTaskOutcome>,
    id_to_pkg: &HashMap<String, WorkPackage>,
    dependents: &HashMap<String, Vec<String>>,
    indegree: &mut HashMap<String, u32>,
    ready_workers: &mut Vec<String>,
    ready_qa: &mut Vec<String>,
    runs: &mut HashMap<String, WorkerRun>,
    qa_results: &mut HashMap<String, QaResult>,
    completed: &mut HashSet<String>,
    qa_completed: &mut u32,
    remaining_usd: &mut f64,
    project_budget_usd: f64,
    deps: &Dependencies,
    config: &EngineConfig,
    escalation_controller: &mut EscalationController,
    retry_tier_overrides: &mut HashMap<String, TierProfile>,
    escalations: &mut Vec<EscalationRecord>,
    ledger: &mut Ledger,
    warnings: &mut Vec<String>,
) {
    let mut sorted = outcomes;
    sorted.sort_by(|a, b| a.package_id.cmp(&b.package_id));

    for outcome in sorted {
        let worker_package_id = outcome.worker_package_id.clone();
        match outcome.result {
            Ok(success) => {
                *remaining_usd -= success.actual_llm_cost_usd;
                if success.used_llm {
                    ledger.record_cost(CostBucket::Qa, success.actual_llm_cost_usd);
                } else {
                    ledger.record_cost(CostBucket::DeterministicQa, 0.0);
                }

                if success.budget_gated {
                    let mut details = HashMap::new();
                    details.insert("reason".to_string(), serde_json::json!("llm_qa_budget_gated"));
                    ledger.record_decision(
                        contracts::DecisionType::BudgetOptimization,
                        Some(outcome.package_id.clone()),
                        details,
                    );
                    warnings.push(format!(
                        "QA {}: LLM second pass skipped, budget gated",
                        outcome.package_id
                    ));
                }
                if let Some(rejected) = &success.llm_rejected_warning {
                    warnings.push(format!("QA {}: {}", outcome.package_id, rejected));
                }

                if let Some(assembly_result) = &success.assembly_outcome {
                    match assembly_result {
                        Ok(assembly) => {
                            let mut details = HashMap::new();
                            details.insert(
                                "compilationSuccess".to_string(),
                                serde_json::json!(assembly.compilation_success),
                            );
                            details.insert("fileCount".to_string(), serde_json::json!(assembly.file_count));
                            ledger.record_decision(
                                contracts::DecisionType::Assembly,
                                Some(worker_package_id.clone()),
                                details,
                            );
                            if !assembly.compilation_success {
                                warnings.push(format!(
                                    "{}: assembly compilation failed",
                                    worker_package_id
                                ));
                            }
                        }
                        Err(message) => {
                            let mut details = HashMap::new();
                            details.insert("error".to_string(), serde_json::json!(message));
                            ledger.record_decision(
                                contracts::DecisionType::AssemblyFailed,
                                Some(worker_package_id.clone()),
                                details,
                            );
                            warnings.push(format!("{}: assembly failed: {}", worker_package_id, message));
                        }
                    }
                }

                if let Some(worker_run) = runs.get_mut(&worker_package_id) {
                    worker_run.actual_quality = Some(success.result.quality_score);
                }

                let now = now_iso();

                if let Some(worker_run) = runs.get(&worker_package_id).cloned() {
                    let cost_variance_ratio =
                        worker_run.actual_cost_usd / worker_run.predicted_cost_usd.max(1e-6);
                    let quality_delta = success.result.quality_score - worker_run.predicted_quality;

                    let before = deps
                        .trust
                        .get_or_init(&worker_run.model_id, TrustRole::Worker, &now)
                        .value;
                    let after = deps
                        .trust
                        .apply_worker_update(
                            &worker_run.model_id,
                            WorkerTrustInput {
                                qa_pass: success.result.pass,
                                quality_delta,
                                cost_variance_ratio,
                            },
                            &now,
                        )
                        .value;
                    ledger.record_trust_delta(worker_run.model_id.clone(), TrustRole::Worker, before, after);

                    let qa_trust_value = if success.used_llm {
                        if let QaModelId::Model(qa_model_id) = &success.qa_model_id {
                            let agreed = success
                                .deterministic_pass
                                .map(|det_pass| det_pass == success.result.pass);
                            let before_qa = deps
                                .trust
                                .get_or_init(qa_model_id, TrustRole::Qa, &now)
                                .value;
                            let after_qa = deps
                                .trust
                                .apply_qa_update(
                                    qa_model_id,
                                    QaTrustInput {
                                        agreed_with_deterministic: agreed,
                                    },
                                    &now,
                                )
                                .value;
                            ledger.record_trust_delta(qa_model_id.clone(), TrustRole::Qa, before_qa, after_qa);
                            after_qa
                        } else {
                            1.0
                        }
                    } else {
                        1.0
                    };

                    let skip_variance = success.used_llm && qa_trust_value < 0.45;
                    if skip_variance {
                        ledger.record_variance_skipped(&worker_package_id, "qa_trust_low");
                    } else {
                        let observation = Observation {
                            actual_quality: success.result.quality_score,
                            predicted_quality: worker_run.predicted_quality,
                            actual_cost_usd: worker_run.actual_cost_usd,
                            predicted_cost_usd: worker_run.predicted_cost_usd,
                            defect_count: success.result.defects.len() as u32,
                            ts_iso: now.clone(),
                        };
                        let catalog_entry = deps.catalog.get(&worker_run.model_id);
                        let current_status = catalog_entry
                            .as_ref()
                            .map(|e| e.identity.status)
                            .unwrap_or(contracts::ModelStatus::Active);
                        let governance = catalog_entry.as_ref().and_then(|e| e.governance.clone());
                        let task_type = id_to_pkg
                            .get(&worker_package_id)
                            .map(|p| p.task_type)
                            .unwrap_or(TaskType::Other);
                        let difficulty = id_to_pkg
                            .get(&worker_package_id)
                            .map(|p| p.difficulty)
                            .unwrap_or(Difficulty::Medium);
                        let recomputed = deps.priors.record_observation(
                            &worker_run.model_id,
                            task_type,
                            difficulty,
                            observation,
                            current_status,
                            governance.as_ref(),
                        );
                        ledger.record_variance_recorded(&worker_package_id);
                        if let Some(new_status) = recomputed.status_transition {
                            deps.catalog.set_model_status(&worker_run.model_id, new_status);
                        }
                    }

                    if let Some(pkg) = id_to_pkg.get(&worker_package_id) {
                        let higher_tier_candidate = next_tier_up(escalation_controller.current_tier());
                        let predicted_rerun_cost_usd = higher_tier_candidate
                            .and_then(|tier| {
                                let filter = ListEligibleFilter {
                                    tier_profile: tier,
                                    task_type: pkg.task_type,
                                    difficulty: pkg.difficulty,
                                    budget_remaining_usd: *remaining_usd,
                                    importance: None,
                                    credentials: deps.credentials.as_ref(),
                                };
                                deps.catalog
                                    .list_eligible(&filter)
                                    .eligible
                                    .iter()
                                    .map(cheapest_reasonable_cost)
                                    .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.min(c))))
                            })
                            .unwrap_or(worker_run.predicted_cost_usd);

                        let escalation_outcome = escalation_controller.evaluate(EscalationInput {
                            package_id: &worker_package_id,
                            difficulty: pkg.difficulty,
                            actual_quality: success.result.quality_score,
                            min_score_by_difficulty: &config.escalation_policy.min_score_by_difficulty,
                            score_resolution: config.escalation_policy.score_resolution,
                            higher_tier_candidate,
                            predicted_rerun_cost_usd,
                            project_budget_usd,
                            require_eval_for_decision: config.escalation_policy.require_eval_for_decision,
                            max_promotions: config.escalation_policy.max_promotions,
                        });

                        if let Some(warning) = &escalation_outcome.warning {
                            warnings.push(warning.clone());
                        }

                        if escalation_outcome.retry {
                            if let Some(event) = &escalation_outcome.event {
                                let mut details = HashMap::new();
                                details.insert(
                                    "reason".to_string(),
                                    serde_json::json!(format!("{:?}", event.reason)),
                                );
                                for (k, v) in &event.context {
                                    details.insert(k.clone(), v.clone());
                                }
                                ledger.record_decision(
                                    contracts::DecisionType::Escalation,
                                    Some(worker_package_id.clone()),
                                    details,
                                );
                                escalations.push(EscalationRecord {
                                    package_id: worker_package_id.clone(),
                                    reason: event.reason,
                                    promoted_tier: escalation_outcome.promoted_tier,
                                });
                            }

                            let target_tier = escalation_outcome
                                .promoted_tier
                                .unwrap_or(escalation_controller.current_tier());
                            retry_tier_overrides.insert(worker_package_id.clone(), target_tier);
                            ready_workers.push(worker_package_id.clone());
                            ready_qa.push(outcome.package_id.clone());
                        }
                    }
                }

                let first_completion = !completed.contains(&outcome.package_id);
                qa_results.insert(outcome.package_id.clone(), success.result);
                completed.insert(outcome.package_id.clone());
                *qa_completed += 1;

                if first_completion {
                    if let Some(deps_of) = dependents.get(&outcome.package_id) {
                        for dep_id in deps_of {
                            if let Some(entry) = indegree.get_mut(dep_id) {
                                *entry = entry.saturating_sub(1);
                                if *entry == 0 {
                                    match id_to_pkg[dep_id].role {
                                        Role::Worker => ready_workers.push(dep_id.clone()),
                                        Role::Qa => ready_qa.push(dep_id.clone()),
                                    }
                                }
                            }
                        }
                    }
                }
            }
            Err(message) => {
                warnings.push(format!("QA {}: {}", outcome.package_id, message));
            }
        }
    }
}

/// Runs every package in `packages` to completion, budget exhaustion,
/// or the wall-clock cap, whichever comes first. Graph validation and
/// genuine deadlock (no explaining warning for leftover packages) are
/// the only terminal failures.
pub async fn run_packages(
    packages: Vec<WorkPackage>,
    config: EngineConfig,
    project_budget_usd: f64,
    run_session_id: impl Into<String>,
    deps: Dependencies,
) -> Result<(RunPackagesResult, Ledger), EngineError> {
    graph::validate(&packages)?;
    let Graph {
        id_to_pkg,
        mut indegree,
        dependents,
        downstream_count,
    } = graph::build(packages);

    let mut ready_workers: Vec<String> = Vec::new();
    let mut ready_qa: Vec<String> = Vec::new();
    for (id, indeg) in &indegree {
        if *indeg == 0 {
            match id_to_pkg[id].role {
                Role::Worker => ready_workers.push(id.clone()),
                Role::Qa => ready_qa.push(id.clone()),
            }
        }
    }

    let config = Arc::new(config);
    let deps = Arc::new(deps);
    let artifact_registry = Arc::new(ArtifactRegistry::new());
    let circuit_breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        name: Some("llm-transport".to_string()),
        ..CircuitBreakerConfig::default()
    }));

    let mut remaining_usd = project_budget_usd;
    let mut escalation_controller = EscalationController::new(config.tier_profile);
    let mut ledger = Ledger::new(run_session_id);
    let mut runs: HashMap<String, WorkerRun> = HashMap::new();
    let mut qa_results: HashMap<String, QaResult> = HashMap::new();
    let mut completed: HashSet<String> = HashSet::new();
    let mut worker_completed: u32 = 0;
    let mut qa_completed: u32 = 0;
    let mut warnings: Vec<String> = Vec::new();
    let mut escalations: Vec<EscalationRecord> = Vec::new();
    let mut retry_tier_overrides: HashMap<String, TierProfile> = HashMap::new();

    let started_at = Instant::now();
    let deadline = Duration::from_secs(RUN_WALLCLOCK_CAP_SECS);

    loop {
        if ready_workers.is_empty() && ready_qa.is_empty() {
            break;
        }
        if started_at.elapsed() >= deadline {
            warnings.push("Run wallclock cap exceeded; stopping with partial results".to_string());
            break;
        }
        if remaining_usd <= 0.0 {
            warnings.push("Budget exhausted; stopping with partial results".to_string());
            break;
        }

        let serve_qa = !ready_qa.is_empty()
            && (ready_workers.is_empty()
                || worker_completed.saturating_sub(qa_completed) >= WORKER_QA_LEAD_LIMIT);

        if serve_qa {
            let batch_ids = take_batch(&mut ready_qa, &id_to_pkg, &downstream_count, config.qa_concurrency);
            let outcomes = dispatch_qa_batch(
                batch_ids,
                &id_to_pkg,
                &runs,
                &config,
                &deps,
                &artifact_registry,
                remaining_usd,
                &mut warnings,
            )
            .await;
            commit_qa_batch(
                outcomes,
                &id_to_pkg,
                &dependents,
                &mut indegree,
                &mut ready_workers,
                &mut ready_qa,
                &mut runs,
                &mut qa_results,
                &mut completed,
                &mut qa_completed,
                &mut remaining_usd,
                project_budget_usd,
                &deps,
                &config,
                &mut escalation_controller,
                &mut retry_tier_overrides,
                &mut escalations,
                &mut ledger,
                &mut warnings,
            );
        } else {
            let batch_ids = take_batch(&mut ready_workers, &id_to_pkg, &downstream_count, config.worker_concurrency);
            let outcomes = dispatch_worker_batch(
                batch_ids,
                &id_to_pkg,
                &config,
                &deps,
                &artifact_registry,
                &circuit_breaker,
                remaining_usd,
                &mut retry_tier_overrides,
                &mut ready_workers,
                &mut warnings,
            )
            .await;
            commit_worker_batch(
                outcomes,
                &id_to_pkg,
                &dependents,
                &mut indegree,
                &mut ready_workers,
                &mut ready_qa,
                &mut runs,
                &mut completed,
                &mut worker_completed,
                &mut remaining_usd,
                &mut ledger,
                &mut warnings,
            );
        }
    }

    if completed.len() < id_to_pkg.len() && warnings.is_empty() {
        let unresolved: Vec<String> = id_to_pkg
            .keys()
            .filter(|id| !completed.contains(*id))
            .cloned()
            .collect();
        return Err(EngineError::Deadlock { unresolved });
    }

    let mut run_values: Vec<WorkerRun> = runs.into_values().collect();
    run_values.sort_by(|a, b| a.package_id.cmp(&b.package_id));
    let mut qa_values: Vec<QaResult> = qa_results.into_values().collect();
    qa_values.sort_by(|a, b| a.package_id.cmp(&b.package_id));

    let result = RunPackagesResult {
        runs: run_values,
        qa_results: qa_values,
        escalations,
        budget: BudgetSummary {
            starting_usd: project_budget_usd,
            remaining_usd,
            escalation_spend_usd: escalation_controller.escalation_spend_usd(),
        },
        warnings,
    };

    Ok((result, ledger))
}
