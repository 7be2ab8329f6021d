//! Cost model: predicted-cost computation from pricing and token usage,
//! and pricing-mismatch detection between independently computed
//! predictions.

use contracts::{Difficulty, PerformancePrior, Pricing, TaskType};

const DEFAULT_COST_MULTIPLIER: f64 = 1.0;
const MISMATCH_DEFAULT_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, Copy)]
pub struct TokenUsage {
    pub input: f64,
    pub output: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct CostInputsBreakdown {
    pub input_usd: f64,
    pub output_usd: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct PredictedCost {
    pub predicted_cost_usd: f64,
    pub expected_cost_usd: f64,
    pub cost_multiplier_used: f64,
    pub inputs_breakdown: CostInputsBreakdown,
}

/// Finds the prior for `(taskType, difficulty)` among `priors`, if any.
fn find_prior(
    priors: Option<&[PerformancePrior]>,
    task_type: TaskType,
    difficulty: Difficulty,
) -> Option<&PerformancePrior> {
    priors?
        .iter()
        .find(|p| p.task_type == task_type && p.difficulty == difficulty)
}

/// `expectedCostUSD = input/1000 * inPer1k + output/1000 * outPer1k`;
/// `predictedCostUSD = expectedCostUSD * costMultiplier`, both rounded
/// to 6 decimals. `costMultiplier` comes from the matching prior, or 1
/// when no prior is supplied.
pub fn compute_predicted_cost(
    pricing: &Pricing,
    usage: TokenUsage,
    priors: Option<&[PerformancePrior]>,
    task_type: TaskType,
    difficulty: Difficulty,
) -> PredictedCost {
    let input_usd = (usage.input / 1000.0) * pricing.in_per_1k;
    let output_usd = (usage.output / 1000.0) * pricing.out_per_1k;
    let expected_cost_usd = round6(input_usd + output_usd);

    let cost_multiplier_used = find_prior(priors, task_type, difficulty)
        .map(|p| p.cost_multiplier)
        .unwrap_or(DEFAULT_COST_MULTIPLIER);

    let predicted_cost_usd = round6(expected_cost_usd * cost_multiplier_used);

    PredictedCost {
        predicted_cost_usd,
        expected_cost_usd,
        cost_multiplier_used,
        inputs_breakdown: CostInputsBreakdown {
            input_usd: round6(input_usd),
            output_usd: round6(output_usd),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingMismatch {
    pub mismatch: bool,
    pub ratio: f64,
}

/// Flags a mismatch iff `ratio > threshold || ratio < 1/threshold` and
/// `catalogPredicted > 0`; when `catalogPredicted <= 0` the ratio is
/// undefined and no mismatch is reported.
pub fn detect_pricing_mismatch(
    router_predicted: f64,
    catalog_predicted: f64,
    threshold: Option<f64>,
) -> PricingMismatch {
    let threshold = threshold.unwrap_or(MISMATCH_DEFAULT_THRESHOLD);
    if catalog_predicted <= 0.0 {
        return PricingMismatch {
            mismatch: false,
            ratio: f64::NAN,
        };
    }
    let ratio = router_predicted / catalog_predicted;
    let mismatch = ratio > threshold || ratio < 1.0 / threshold;
    PricingMismatch { mismatch, ratio }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::Currency;

    fn pricing(in_per_1k: f64, out_per_1k: f64) -> Pricing {
        Pricing {
            in_per_1k,
            out_per_1k,
            currency: Currency::Usd,
        }
    }

    #[test]
    fn predicted_cost_without_prior_uses_default_multiplier() {
        let result = compute_predicted_cost(
            &pricing(0.003, 0.009),
            TokenUsage {
                input: 1000.0,
                output: 500.0,
            },
            None,
            TaskType::Writing,
            Difficulty::Medium,
        );
        assert_eq!(result.expected_cost_usd, 0.0075);
        assert_eq!(result.predicted_cost_usd, 0.0075);
        assert_eq!(result.cost_multiplier_used, 1.0);
    }

    #[test]
    fn predicted_cost_applies_matching_prior_multiplier() {
        let mut prior = PerformancePrior::cold_start(TaskType::Writing, Difficulty::Medium, Utc::now());
        prior.cost_multiplier = 1.5;
        let result = compute_predicted_cost(
            &pricing(0.003, 0.009),
            TokenUsage {
                input: 1000.0,
                output: 500.0,
            },
            Some(std::slice::from_ref(&prior)),
            TaskType::Writing,
            Difficulty::Medium,
        );
        assert_eq!(result.expected_cost_usd, 0.0075);
        assert_eq!(result.predicted_cost_usd, 0.01125);
    }

    #[test]
    fn non_matching_prior_falls_back_to_default_multiplier() {
        let prior = PerformancePrior::cold_start(TaskType::Research, Difficulty::High, Utc::now());
        let result = compute_predicted_cost(
            &pricing(0.003, 0.009),
            TokenUsage {
                input: 1000.0,
                output: 500.0,
            },
            Some(std::slice::from_ref(&prior)),
            TaskType::Writing,
            Difficulty::Medium,
        );
        assert_eq!(result.cost_multiplier_used, 1.0);
    }

    #[test]
    fn mismatch_detected_above_threshold() {
        let result = detect_pricing_mismatch(0.01, 0.002, None);
        assert!(result.mismatch);
        assert_eq!(result.ratio, 5.0);
    }

    #[test]
    fn mismatch_detected_below_inverse_threshold() {
        let result = detect_pricing_mismatch(0.001, 0.01, None);
        assert!(result.mismatch);
    }

    #[test]
    fn no_mismatch_within_bounds() {
        let result = detect_pricing_mismatch(0.0105, 0.01, None);
        assert!(!result.mismatch);
    }

    #[test]
    fn zero_catalog_predicted_never_mismatches() {
        let result = detect_pricing_mismatch(0.01, 0.0, None);
        assert!(!result.mismatch);
    }
}
