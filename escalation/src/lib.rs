//! Escalation controller: decides whether a low-scoring QA outcome
//! earns a single retry at a stricter tier, subject to a per-run spend
//! cap. Promotion is one-way: once `currentTier` steps up it never
//! steps back down within the same run.

use std::collections::HashMap;

use contracts::{Difficulty, TierProfile};
use serde_json::Value;

/// At most this fraction of the project budget may be spent on
/// escalation reruns across a run.
pub const ESCALATION_SPEND_CAP_PCT: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationReason {
    QualityThreshold,
    BudgetExceeded,
    LowTrust,
    Refusal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationAction {
    RetryUpgradeTier,
}

#[derive(Debug, Clone)]
pub struct EscalationEvent {
    pub reason: EscalationReason,
    pub action: EscalationAction,
    pub context: HashMap<String, Value>,
}

fn tier_rank(tier: TierProfile) -> u8 {
    match tier {
        TierProfile::Cheap => 0,
        TierProfile::Standard => 1,
        TierProfile::Premium => 2,
    }
}

pub struct EscalationInput<'a> {
    pub package_id: &'a str,
    pub difficulty: Difficulty,
    pub actual_quality: f64,
    pub min_score_by_difficulty: &'a HashMap<Difficulty, f64>,
    pub score_resolution: f64,
    /// The tier a retry would be routed at, if any stricter tier exists.
    pub higher_tier_candidate: Option<TierProfile>,
    pub predicted_rerun_cost_usd: f64,
    pub project_budget_usd: f64,
    pub require_eval_for_decision: bool,
    pub max_promotions: u32,
}

#[derive(Debug, Clone)]
pub struct EscalationOutcome {
    pub event: Option<EscalationEvent>,
    pub warning: Option<String>,
    pub retry: bool,
    pub promoted_tier: Option<TierProfile>,
}

impl EscalationOutcome {
    fn none() -> Self {
        Self {
            event: None,
            warning: None,
            retry: false,
            promoted_tier: None,
        }
    }
}

/// Per-run escalation state: promotions already granted per package,
/// cumulative escalation spend, and the current (possibly promoted)
/// tier used by subsequent routing decisions.
pub struct EscalationController {
    promotions_by_package: HashMap<String, u32>,
    escalation_spend_usd: f64,
    current_tier: TierProfile,
}

impl EscalationController {
    pub fn new(initial_tier: TierProfile) -> Self {
        Self {
            promotions_by_package: HashMap::new(),
            escalation_spend_usd: 0.0,
            current_tier: initial_tier,
        }
    }

    pub fn current_tier(&self) -> TierProfile {
        self.current_tier
    }

    pub fn escalation_spend_usd(&self) -> f64 {
        self.escalation_spend_usd
    }

    /// Evaluates a committed QA outcome against the `promote_on_low_score`
    /// policy. Mutates the controller's spend/promotion/tier state only
    /// when a retry is actually granted.
    pub fn evaluate(&mut self, input: EscalationInput<'_>) -> EscalationOutcome {
        if !input.require_eval_for_decision {
            return EscalationOutcome::none();
        }

        let promotions_used = self
            .promotions_by_package
            .get(input.package_id)
            .copied()
            .unwrap_or(0);
        if promotions_used >= input.max_promotions {
            return EscalationOutcome::none();
        }

        let Some(min_score) = input.min_score_by_difficulty.get(&input.difficulty).copied() else {
            return EscalationOutcome::none();
        };
        let threshold = min_score - input.score_resolution / 2.0;
        if input.actual_quality >= threshold {
            return EscalationOutcome::none();
        }

        let Some(target_tier) = input.higher_tier_candidate else {
            return EscalationOutcome::none();
        };

        let cap = ESCALATION_SPEND_CAP_PCT * input.project_budget_usd;
        if self.escalation_spend_usd + input.predicted_rerun_cost_usd > cap {
            return EscalationOutcome {
                event: None,
                warning: Some(format!(
                    "escalation spend cap exceeded for package {}: spent {:.6} + rerun {:.6} > cap {:.6}",
                    input.package_id, self.escalation_spend_usd, input.predicted_rerun_cost_usd, cap
                )),
                retry: false,
                promoted_tier: None,
            };
        }

        self.escalation_spend_usd += input.predicted_rerun_cost_usd;
        *self.promotions_by_package.entry(input.package_id.to_string()).or_insert(0) += 1;

        let promoted_tier = if tier_rank(target_tier) > tier_rank(self.current_tier) {
            self.current_tier = target_tier;
            Some(target_tier)
        } else {
            None
        };

        let mut context = HashMap::new();
        context.insert("packageId".to_string(), Value::String(input.package_id.to_string()));
        context.insert(
            "actualQuality".to_string(),
            serde_json::json!(input.actual_quality),
        );
        context.insert("threshold".to_string(), serde_json::json!(threshold));

        EscalationOutcome {
            event: Some(EscalationEvent {
                reason: EscalationReason::QualityThreshold,
                action: EscalationAction::RetryUpgradeTier,
                context,
            }),
            warning: None,
            retry: true,
            promoted_tier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min_scores() -> HashMap<Difficulty, f64> {
        HashMap::from([(Difficulty::High, 0.88)])
    }

    #[test]
    fn low_score_with_headroom_triggers_retry() {
        let mut controller = EscalationController::new(TierProfile::Standard);
        let scores = min_scores();
        let outcome = controller.evaluate(EscalationInput {
            package_id: "pkg-1",
            difficulty: Difficulty::High,
            actual_quality: 0.75,
            min_score_by_difficulty: &scores,
            score_resolution: 0.02,
            higher_tier_candidate: Some(TierProfile::Premium),
            predicted_rerun_cost_usd: 0.01,
            project_budget_usd: 1.0,
            require_eval_for_decision: true,
            max_promotions: 1,
        });
        assert!(outcome.retry);
        assert_eq!(controller.current_tier(), TierProfile::Premium);
        assert_eq!(controller.escalation_spend_usd(), 0.01);
    }

    #[test]
    fn spend_cap_exceedance_is_warning_not_retry() {
        let mut controller = EscalationController::new(TierProfile::Standard);
        let scores = min_scores();
        let outcome = controller.evaluate(EscalationInput {
            package_id: "pkg-1",
            difficulty: Difficulty::High,
            actual_quality: 0.5,
            min_score_by_difficulty: &scores,
            score_resolution: 0.02,
            higher_tier_candidate: Some(TierProfile::Premium),
            predicted_rerun_cost_usd: 5.0,
            project_budget_usd: 1.0,
            require_eval_for_decision: true,
            max_promotions: 1,
        });
        assert!(!outcome.retry);
        assert!(outcome.warning.is_some());
        assert_eq!(controller.current_tier(), TierProfile::Standard);
    }

    #[test]
    fn at_most_one_promotion_per_package() {
        let mut controller = EscalationController::new(TierProfile::Standard);
        let scores = min_scores();
        let input = || EscalationInput {
            package_id: "pkg-1",
            difficulty: Difficulty::High,
            actual_quality: 0.5,
            min_score_by_difficulty: &scores,
            score_resolution: 0.02,
            higher_tier_candidate: Some(TierProfile::Premium),
            predicted_rerun_cost_usd: 0.001,
            project_budget_usd: 1.0,
            require_eval_for_decision: true,
            max_promotions: 1,
        };
        let first = controller.evaluate(input());
        assert!(first.retry);
        let second = controller.evaluate(input());
        assert!(!second.retry);
    }

    #[test]
    fn quality_above_threshold_is_a_no_op() {
        let mut controller = EscalationController::new(TierProfile::Standard);
        let scores = min_scores();
        let outcome = controller.evaluate(EscalationInput {
            package_id: "pkg-1",
            difficulty: Difficulty::High,
            actual_quality: 0.95,
            min_score_by_difficulty: &scores,
            score_resolution: 0.02,
            higher_tier_candidate: Some(TierProfile::Premium),
            predicted_rerun_cost_usd: 0.001,
            project_budget_usd: 1.0,
            require_eval_for_decision: true,
            max_promotions: 1,
        });
        assert!(!outcome.retry);
        assert!(outcome.event.is_none());
    }
}
