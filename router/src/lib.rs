//! Router: scores and selects a model for a task card from a set of
//! candidates, optionally applying cheap-first escalation-aware
//! promotion gating.

pub mod tokens;

use std::collections::{HashMap, HashSet};

use contracts::{
    CandidateAudit, Difficulty, EscalationAwareAudit, GateProgress, PrimaryBlocker,
    RouterDecision, RoutingAudit, SelectionPolicy, TaskCard, TaskType,
};

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no candidates supplied to the router")]
    NoCandidates,
    #[error("no candidate satisfies the quality/cost/score gate for this task card")]
    NoPassingCandidates,
}

/// A single candidate model's cost/quality projection for this task card.
#[derive(Debug, Clone)]
pub struct CandidateInput {
    pub model_id: String,
    pub predicted_cost_usd: f64,
    pub predicted_quality: f64,
    pub candidate_score: Option<f64>,
    pub expertise: f64,
    /// Calibration confidence for this model at the task card's task
    /// type; only consulted by cheap-first gating.
    pub calibration_confidence: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ThresholdConfig {
    pub min_quality_by_difficulty: HashMap<Difficulty, f64>,
    pub min_score_by_difficulty: HashMap<Difficulty, f64>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        let min_quality_by_difficulty = HashMap::from([
            (Difficulty::Low, 0.55),
            (Difficulty::Medium, 0.70),
            (Difficulty::High, 0.85),
        ]);
        let min_score_by_difficulty = min_quality_by_difficulty.clone();
        Self {
            min_quality_by_difficulty,
            min_score_by_difficulty,
        }
    }
}

impl ThresholdConfig {
    fn min_quality(&self, difficulty: Difficulty) -> f64 {
        self.min_quality_by_difficulty.get(&difficulty).copied().unwrap_or(0.7)
    }

    fn min_score(&self, difficulty: Difficulty) -> Option<f64> {
        self.min_score_by_difficulty.get(&difficulty).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    Normal,
    EscalationAware,
}

#[derive(Debug, Clone)]
pub struct EscalationAwareConfig {
    pub routing_mode: RoutingMode,
    pub cheap_first_min_confidence: f64,
    pub cheap_first_savings_min_pct: f64,
    pub cheap_first_max_gap_by_difficulty: HashMap<Difficulty, f64>,
    pub cheap_first_max_gap_by_task_type: Option<HashMap<TaskType, f64>>,
    pub cheap_first_budget_headroom_factor: f64,
    pub cheap_first_only_when_can_promote: bool,
    pub premium_task_types: HashSet<TaskType>,
}

impl Default for EscalationAwareConfig {
    fn default() -> Self {
        Self {
            routing_mode: RoutingMode::Normal,
            cheap_first_min_confidence: 0.6,
            cheap_first_savings_min_pct: 0.2,
            cheap_first_max_gap_by_difficulty: HashMap::from([
                (Difficulty::Low, 0.1),
                (Difficulty::Medium, 0.07),
                (Difficulty::High, 0.04),
            ]),
            cheap_first_max_gap_by_task_type: None,
            cheap_first_budget_headroom_factor: 1.5,
            cheap_first_only_when_can_promote: true,
            premium_task_types: HashSet::new(),
        }
    }
}

pub struct RoutingRequest<'a> {
    pub task_card: &'a TaskCard,
    pub candidates: Vec<CandidateInput>,
    pub thresholds: &'a ThresholdConfig,
    pub selection_policy: SelectionPolicy,
    pub cheapest_viable_chosen: bool,
    pub prefer_model_ids: Option<Vec<String>>,
    pub allowed_model_ids: Option<Vec<String>>,
    pub escalation: Option<&'a EscalationAwareConfig>,
    pub estimated_input_tokens: u64,
    pub estimated_output_tokens: u64,
}

struct Evaluated {
    candidate: CandidateInput,
    passed: bool,
    filtered_reason: Option<String>,
}

fn evaluate_candidates(request: &RoutingRequest<'_>) -> Vec<Evaluated> {
    let difficulty = request.task_card.difficulty;
    let min_quality = request.thresholds.min_quality(difficulty);
    let min_score = request.thresholds.min_score(difficulty);
    let max_cost = request.task_card.constraints.max_cost_usd;

    request
        .candidates
        .iter()
        .cloned()
        .map(|candidate| {
            let mut reasons = Vec::new();
            if candidate.predicted_quality < min_quality {
                reasons.push(format!(
                    "predicted_quality {:.3} below threshold {:.3}",
                    candidate.predicted_quality, min_quality
                ));
            }
            if let Some(max_cost) = max_cost {
                if candidate.predicted_cost_usd > max_cost {
                    reasons.push(format!(
                        "predicted_cost_usd {:.6} exceeds max_cost_usd {:.6}",
                        candidate.predicted_cost_usd, max_cost
                    ));
                }
            }
            if let Some(min_score) = min_score {
                if let Some(score) = candidate.candidate_score {
                    if score < min_score {
                        reasons.push(format!(
                            "candidate_score {:.3} below min_score {:.3}",
                            score, min_score
                        ));
                    }
                }
            }
            let passed = reasons.is_empty();
            Evaluated {
                candidate,
                passed,
                filtered_reason: if passed { None } else { Some(reasons.join("; ")) },
            }
        })
        .collect()
}

fn restrict_and_reorder(
    evaluated: Vec<Evaluated>,
    allowed_model_ids: &Option<Vec<String>>,
    prefer_model_ids: &Option<Vec<String>>,
) -> Vec<Evaluated> {
    let mut result: Vec<Evaluated> = match allowed_model_ids {
        Some(allowed) => {
            let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
            evaluated
                .into_iter()
                .filter(|e| allowed.contains(e.candidate.model_id.as_str()))
                .collect()
        }
        None => evaluated,
    };

    if let Some(prefer) = prefer_model_ids {
        let rank: HashMap<&str, usize> = prefer
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        result.sort_by_key(|e| {
            rank.get(e.candidate.model_id.as_str())
                .copied()
                .unwrap_or(usize::MAX)
        });
    }

    result
}

/// Picks a model id among `passed` candidates per `policy`, or `None` if
/// no candidate satisfies the gate (best_value falls back to
/// best_value_near_threshold instead of returning `None`).
fn select(
    evaluated: &[Evaluated],
    policy: SelectionPolicy,
    min_quality: f64,
) -> Option<(String, &'static str, bool)> {
    let passed: Vec<&Evaluated> = evaluated.iter().filter(|e| e.passed).collect();

    match policy {
        SelectionPolicy::LowestCostQualified => {
            passed
                .into_iter()
                .min_by(|a, b| {
                    a.candidate
                        .predicted_cost_usd
                        .partial_cmp(&b.candidate.predicted_cost_usd)
                        .unwrap()
                        .then_with(|| {
                            b.candidate
                                .expertise
                                .partial_cmp(&a.candidate.expertise)
                                .unwrap()
                        })
                        .then_with(|| a.candidate.model_id.cmp(&b.candidate.model_id))
                })
                .map(|e| (e.candidate.model_id.clone(), "lowest_cost_qualified", false))
        }
        SelectionPolicy::BestValue => {
            if let Some(best) = passed.into_iter().max_by(|a, b| {
                value_of(a).partial_cmp(&value_of(b)).unwrap()
            }) {
                return Some((best.candidate.model_id.clone(), "best_value", false));
            }
            // best_value_near_threshold: candidate closest below the
            // quality threshold, ties broken by best value.
            evaluated
                .iter()
                .filter(|e| e.candidate.predicted_quality < min_quality)
                .max_by(|a, b| {
                    a.candidate
                        .predicted_quality
                        .partial_cmp(&b.candidate.predicted_quality)
                        .unwrap()
                        .then_with(|| value_of(a).partial_cmp(&value_of(b)).unwrap())
                        .then_with(|| b.candidate.model_id.cmp(&a.candidate.model_id))
                })
                .map(|e| (e.candidate.model_id.clone(), "best_value_near_threshold", false))
        }
    }
}

fn value_of(e: &Evaluated) -> f64 {
    if e.candidate.predicted_cost_usd <= 0.0 {
        e.candidate.predicted_quality
    } else {
        e.candidate.predicted_quality / e.candidate.predicted_cost_usd
    }
}

fn cheapest_among_passed(evaluated: &[Evaluated]) -> Option<&Evaluated> {
    evaluated
        .iter()
        .filter(|e| e.passed)
        .min_by(|a, b| {
            a.candidate
                .predicted_cost_usd
                .partial_cmp(&b.candidate.predicted_cost_usd)
                .unwrap()
                .then_with(|| a.candidate.model_id.cmp(&b.candidate.model_id))
        })
}

struct CheapFirstOutcome {
    chosen_model_id: String,
    audit: EscalationAwareAudit,
}

/// Implements the cheap-first-with-promotion-target gate. `normal_model_id`
/// is the default selection; the function either confirms it or
/// substitutes a strictly cheaper candidate that clears every gate.
fn apply_cheap_first(
    evaluated: &[Evaluated],
    normal_model_id: &str,
    task_card: &TaskCard,
    config: &EscalationAwareConfig,
) -> CheapFirstOutcome {
    if config.premium_task_types.contains(&task_card.task_type) {
        return CheapFirstOutcome {
            chosen_model_id: normal_model_id.to_string(),
            audit: EscalationAwareAudit {
                gate_progress: GateProgress::default(),
                primary_blocker: Some(PrimaryBlocker::PremiumLane),
                premium_lane: true,
            },
        };
    }

    let normal = evaluated
        .iter()
        .find(|e| e.candidate.model_id == normal_model_id)
        .expect("normal choice must be among evaluated candidates");

    let max_gap = config
        .cheap_first_max_gap_by_task_type
        .as_ref()
        .and_then(|m| m.get(&task_card.task_type))
        .copied()
        .unwrap_or_else(|| {
            config
                .cheap_first_max_gap_by_difficulty
                .get(&task_card.difficulty)
                .copied()
                .unwrap_or(0.05)
        });

    let mut cheaper: Vec<&Evaluated> = evaluated
        .iter()
        .filter(|e| e.candidate.predicted_cost_usd < normal.candidate.predicted_cost_usd)
        .collect();
    cheaper.sort_by(|a, b| {
        a.candidate
            .predicted_cost_usd
            .partial_cmp(&b.candidate.predicted_cost_usd)
            .unwrap()
            .then_with(|| a.candidate.model_id.cmp(&b.candidate.model_id))
    });

    if cheaper.is_empty() {
        return CheapFirstOutcome {
            chosen_model_id: normal_model_id.to_string(),
            audit: EscalationAwareAudit {
                gate_progress: GateProgress::default(),
                primary_blocker: Some(PrimaryBlocker::NoCheapFirstCandidates),
                premium_lane: false,
            },
        };
    }

    let can_promote = evaluated
        .iter()
        .any(|e| e.candidate.predicted_quality > normal.candidate.predicted_quality);

    let mut after_savings = 0u32;
    let mut after_confidence = 0u32;
    let mut after_gap = 0u32;
    let mut accepted: Option<&Evaluated> = None;

    for c in &cheaper {
        let savings_pct = (normal.candidate.predicted_cost_usd - c.candidate.predicted_cost_usd)
            / normal.candidate.predicted_cost_usd;
        if savings_pct < config.cheap_first_savings_min_pct {
            continue;
        }
        after_savings += 1;

        let confidence = c.candidate.calibration_confidence.unwrap_or(0.0);
        if confidence < config.cheap_first_min_confidence {
            continue;
        }
        after_confidence += 1;

        let gap = normal.candidate.predicted_quality - c.candidate.predicted_quality;
        if gap > max_gap {
            continue;
        }
        after_gap += 1;

        if config.cheap_first_only_when_can_promote && !can_promote {
            continue;
        }

        let headroom_ok = match task_card.constraints.max_cost_usd {
            Some(max_cost) => normal.candidate.predicted_cost_usd * config.cheap_first_budget_headroom_factor <= max_cost,
            None => true,
        };
        if !headroom_ok {
            continue;
        }

        if accepted.is_none() {
            accepted = Some(c);
        }
    }

    let gate_progress = GateProgress {
        after_savings,
        after_confidence,
        after_gap,
    };

    if let Some(chosen) = accepted {
        return CheapFirstOutcome {
            chosen_model_id: chosen.candidate.model_id.clone(),
            audit: EscalationAwareAudit {
                gate_progress,
                primary_blocker: None,
                premium_lane: false,
            },
        };
    }

    let primary_blocker = if after_savings == 0 {
        PrimaryBlocker::Savings
    } else if after_confidence == 0 {
        PrimaryBlocker::Confidence
    } else if after_gap == 0 {
        PrimaryBlocker::Gap
    } else if config.cheap_first_only_when_can_promote && !can_promote {
        PrimaryBlocker::NoPromotionTarget
    } else {
        PrimaryBlocker::Budget
    };

    CheapFirstOutcome {
        chosen_model_id: normal_model_id.to_string(),
        audit: EscalationAwareAudit {
            gate_progress,
            primary_blocker: Some(primary_blocker),
            premium_lane: false,
        },
    }
}

/// Runs the full routing algorithm and returns a decision with a full
/// audit trail. Deterministic given identical inputs.
pub fn route(request: RoutingRequest<'_>) -> Result<RouterDecision, RouterError> {
    if request.candidates.is_empty() {
        return Err(RouterError::NoCandidates);
    }

    let difficulty = request.task_card.difficulty;
    let min_quality = request.thresholds.min_quality(difficulty);

    let evaluated = evaluate_candidates(&request);
    let evaluated = restrict_and_reorder(evaluated, &request.allowed_model_ids, &request.prefer_model_ids);

    if evaluated.iter().all(|e| !e.passed) && request.selection_policy == SelectionPolicy::LowestCostQualified {
        return Err(RouterError::NoPassingCandidates);
    }

    let (mut chosen_model_id, mut ranked_by, mut chosen_is_cheapest_viable) =
        select(&evaluated, request.selection_policy, min_quality)
            .ok_or(RouterError::NoPassingCandidates)?;

    if request.cheapest_viable_chosen {
        if let Some(cheapest) = cheapest_among_passed(&evaluated) {
            chosen_model_id = cheapest.candidate.model_id.clone();
            ranked_by = "cheapest_viable";
            chosen_is_cheapest_viable = true;
        }
    }

    let escalation_aware = match request.escalation {
        Some(config) if config.routing_mode == RoutingMode::EscalationAware => {
            let outcome = apply_cheap_first(&evaluated, &chosen_model_id, request.task_card, config);
            chosen_model_id = outcome.chosen_model_id;
            Some(outcome.audit)
        }
        _ => None,
    };

    let chosen = evaluated
        .iter()
        .find(|e| e.candidate.model_id == chosen_model_id)
        .expect("chosen model must be among evaluated candidates");

    let candidates_audit: Vec<CandidateAudit> = evaluated
        .iter()
        .map(|e| CandidateAudit {
            model_id: e.candidate.model_id.clone(),
            predicted_cost_usd: e.candidate.predicted_cost_usd,
            predicted_quality: e.candidate.predicted_quality,
            passed: e.passed,
            filtered_reason: e.filtered_reason.clone(),
        })
        .collect();

    Ok(RouterDecision {
        chosen_model_id: chosen.candidate.model_id.clone(),
        expected_cost_usd: chosen.candidate.predicted_cost_usd,
        estimated_input_tokens: request.estimated_input_tokens,
        estimated_output_tokens: request.estimated_output_tokens,
        routing_audit: RoutingAudit {
            candidates: candidates_audit,
            ranked_by: ranked_by.to_string(),
            enforce_cheapest_viable: request.cheapest_viable_chosen,
            chosen_is_cheapest_viable,
            escalation_aware,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Difficulty as D, TaskConstraints, TaskType as T};

    fn task_card(max_cost_usd: Option<f64>) -> TaskCard {
        TaskCard {
            id: "pkg-1".to_string(),
            task_type: T::Writing,
            difficulty: D::Medium,
            constraints: TaskConstraints {
                min_quality: None,
                max_cost_usd,
            },
        }
    }

    fn candidate(id: &str, cost: f64, quality: f64) -> CandidateInput {
        CandidateInput {
            model_id: id.to_string(),
            predicted_cost_usd: cost,
            predicted_quality: quality,
            candidate_score: None,
            expertise: 0.5,
            calibration_confidence: Some(0.9),
        }
    }

    #[test]
    fn lowest_cost_qualified_picks_cheapest_passing() {
        let card = task_card(None);
        let request = RoutingRequest {
            task_card: &card,
            candidates: vec![
                candidate("cheap", 0.001, 0.75),
                candidate("expensive", 0.02, 0.9),
            ],
            thresholds: &ThresholdConfig::default(),
            selection_policy: SelectionPolicy::LowestCostQualified,
            cheapest_viable_chosen: false,
            prefer_model_ids: None,
            allowed_model_ids: None,
            escalation: None,
            estimated_input_tokens: 100,
            estimated_output_tokens: 100,
        };
        let decision = route(request).unwrap();
        assert_eq!(decision.chosen_model_id, "cheap");
        assert_eq!(decision.routing_audit.ranked_by, "lowest_cost_qualified");
    }

    #[test]
    fn cheapest_viable_overrides_selection_policy() {
        let card = task_card(None);
        let request = RoutingRequest {
            task_card: &card,
            candidates: vec![
                candidate("cheap-mini", 0.001, 0.86),
                candidate("premium", 0.01, 0.92),
            ],
            thresholds: &ThresholdConfig {
                min_quality_by_difficulty: HashMap::from([(D::Medium, 0.8)]),
                min_score_by_difficulty: HashMap::new(),
            },
            selection_policy: SelectionPolicy::BestValue,
            cheapest_viable_chosen: true,
            prefer_model_ids: None,
            allowed_model_ids: None,
            escalation: None,
            estimated_input_tokens: 100,
            estimated_output_tokens: 100,
        };
        let decision = route(request).unwrap();
        assert_eq!(decision.chosen_model_id, "cheap-mini");
        assert!(decision.routing_audit.chosen_is_cheapest_viable);
        assert_eq!(decision.routing_audit.ranked_by, "cheapest_viable");
    }

    #[test]
    fn allowed_model_ids_restricts_candidate_pool() {
        let card = task_card(None);
        let request = RoutingRequest {
            task_card: &card,
            candidates: vec![candidate("a", 0.001, 0.8), candidate("b", 0.0005, 0.8)],
            thresholds: &ThresholdConfig::default(),
            selection_policy: SelectionPolicy::LowestCostQualified,
            cheapest_viable_chosen: false,
            prefer_model_ids: None,
            allowed_model_ids: Some(vec!["a".to_string()]),
            escalation: None,
            estimated_input_tokens: 100,
            estimated_output_tokens: 100,
        };
        let decision = route(request).unwrap();
        assert_eq!(decision.chosen_model_id, "a");
    }

    #[test]
    fn premium_task_type_skips_cheap_first() {
        let card = task_card(Some(1.0));
        let mut escalation = EscalationAwareConfig {
            routing_mode: RoutingMode::EscalationAware,
            ..Default::default()
        };
        escalation.premium_task_types.insert(T::Writing);
        let request = RoutingRequest {
            task_card: &card,
            candidates: vec![candidate("cheap", 0.0005, 0.76), candidate("normal", 0.002, 0.9)],
            thresholds: &ThresholdConfig::default(),
            selection_policy: SelectionPolicy::LowestCostQualified,
            cheapest_viable_chosen: false,
            prefer_model_ids: None,
            allowed_model_ids: None,
            escalation: Some(&escalation),
            estimated_input_tokens: 100,
            estimated_output_tokens: 100,
        };
        let decision = route(request).unwrap();
        let aware = decision.routing_audit.escalation_aware.unwrap();
        assert!(aware.premium_lane);
        assert_eq!(decision.chosen_model_id, "cheap");
    }

    #[test]
    fn cheap_first_promotes_cheaper_candidate_when_gates_clear() {
        let card = task_card(Some(1.0));
        let escalation = EscalationAwareConfig {
            routing_mode: RoutingMode::EscalationAware,
            cheap_first_savings_min_pct: 0.1,
            cheap_first_min_confidence: 0.5,
            cheap_first_max_gap_by_difficulty: HashMap::from([(D::Medium, 0.1)]),
            cheap_first_only_when_can_promote: true,
            ..Default::default()
        };
        let request = RoutingRequest {
            task_card: &card,
            candidates: vec![
                candidate("cheap", 0.0005, 0.80),
                candidate("normal", 0.002, 0.85),
                candidate("premium", 0.01, 0.95),
            ],
            thresholds: &ThresholdConfig::default(),
            selection_policy: SelectionPolicy::LowestCostQualified,
            cheapest_viable_chosen: false,
            prefer_model_ids: None,
            allowed_model_ids: None,
            escalation: Some(&escalation),
            estimated_input_tokens: 100,
            estimated_output_tokens: 100,
        };
        let decision = route(request).unwrap();
        assert_eq!(decision.chosen_model_id, "cheap");
        let aware = decision.routing_audit.escalation_aware.unwrap();
        assert!(aware.primary_blocker.is_none());
    }

    #[test]
    fn no_candidates_is_an_error() {
        let card = task_card(None);
        let request = RoutingRequest {
            task_card: &card,
            candidates: vec![],
            thresholds: &ThresholdConfig::default(),
            selection_policy: SelectionPolicy::LowestCostQualified,
            cheapest_viable_chosen: false,
            prefer_model_ids: None,
            allowed_model_ids: None,
            escalation: None,
            estimated_input_tokens: 0,
            estimated_output_tokens: 0,
        };
        assert!(matches!(route(request), Err(RouterError::NoCandidates)));
    }
}
