//! Per-(model, task-type, difficulty) rolling performance priors.

use std::collections::HashMap;

use chrono::Utc;
use contracts::{Difficulty, Governance, ModelStatus, PerformancePrior, TaskType};
use parking_lot::RwLock;

use crate::observation::Observation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PriorKey {
    model_id_hash: u64,
    task_type: TaskType,
    difficulty: Difficulty,
}

fn key_for(model_id: &str, task_type: TaskType, difficulty: Difficulty) -> PriorKey {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    model_id.hash(&mut hasher);
    PriorKey {
        model_id_hash: hasher.finish(),
        task_type,
        difficulty,
    }
}

struct PriorEntry {
    model_id: String,
    observations: Vec<Observation>,
    prior: PerformancePrior,
}

#[derive(Default)]
pub struct PriorStore {
    entries: RwLock<HashMap<PriorKey, PriorEntry>>,
}

/// Result of folding in a new observation: the recomputed prior plus
/// any status transition the governance thresholds now call for.
pub struct RecomputedPrior {
    pub prior: PerformancePrior,
    pub status_transition: Option<ModelStatus>,
}

impl PriorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_priors_for_model(&self, model_id: &str) -> Vec<PerformancePrior> {
        self.entries
            .read()
            .values()
            .filter(|entry| entry.model_id == model_id)
            .map(|entry| entry.prior.clone())
            .collect()
    }

    /// Records `observation` and recomputes the prior for
    /// `(model_id, task_type, difficulty)`, then evaluates whether the
    /// model's status should transition given `current_status` and
    /// `governance`.
    pub fn record_observation(
        &self,
        model_id: &str,
        task_type: TaskType,
        difficulty: Difficulty,
        observation: Observation,
        current_status: ModelStatus,
        governance: Option<&Governance>,
    ) -> RecomputedPrior {
        let key = key_for(model_id, task_type, difficulty);
        let mut entries = self.entries.write();
        let entry = entries.entry(key).or_insert_with(|| PriorEntry {
            model_id: model_id.to_string(),
            observations: Vec::new(),
            prior: PerformancePrior::cold_start(task_type, difficulty, Utc::now()),
        });

        entry.observations.push(observation);
        entry.prior = recompute(&entry.observations, task_type, difficulty);

        let status_transition =
            evaluate_status_transition(current_status, &entry.prior, governance);

        RecomputedPrior {
            prior: entry.prior.clone(),
            status_transition,
        }
    }
}

fn recompute(observations: &[Observation], task_type: TaskType, difficulty: Difficulty) -> PerformancePrior {
    let n = observations.len() as f64;

    let mean_actual_quality: f64 =
        observations.iter().map(|o| o.actual_quality).sum::<f64>() / n;
    let pre_adjustment = mean_actual_quality.clamp(0.0, 1.0);

    let defect_rate = observations
        .iter()
        .filter(|o| o.defect_count > 0)
        .count() as f64
        / n;

    // Never reduce quality_prior below 0.9x its pre-adjustment value.
    let defect_factor = (1.0 - defect_rate).max(0.9);
    let quality_prior = (pre_adjustment * defect_factor).clamp(0.0, 1.0);

    let mut ratios: Vec<f64> = observations.iter().map(|o| o.cost_ratio()).collect();
    let cost_multiplier = (ratios.iter().sum::<f64>() / n).clamp(0.2, 5.0);

    ratios.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let variance_band_low = percentile(&ratios, 20.0);
    let variance_band_high = percentile(&ratios, 80.0);

    let calibration_confidence = (n / 50.0).min(1.0);

    PerformancePrior {
        task_type,
        difficulty,
        quality_prior,
        cost_multiplier,
        variance_band_low,
        variance_band_high,
        defect_rate,
        calibration_confidence,
        sample_count: observations.len() as u64,
        last_updated: Utc::now(),
    }
}

/// Nearest-rank percentile over an already-sorted slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = rank - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

fn evaluate_status_transition(
    current_status: ModelStatus,
    prior: &PerformancePrior,
    governance: Option<&Governance>,
) -> Option<ModelStatus> {
    let min_quality_prior = governance.and_then(|g| g.min_quality_prior);
    let max_cost_variance_ratio = governance.and_then(|g| g.max_cost_variance_ratio);
    let disable_auto_disable = governance.map(|g| g.disable_auto_disable).unwrap_or(false);

    match current_status {
        ModelStatus::Active => {
            let quality_floor = min_quality_prior.unwrap_or(0.55).max(0.55);
            let quality_failing = prior.sample_count >= 30 && prior.quality_prior < quality_floor;
            let cost_failing = max_cost_variance_ratio
                .map(|ratio| prior.cost_multiplier > ratio)
                .unwrap_or(false);
            if prior.sample_count >= 30 && (quality_failing || cost_failing) {
                Some(ModelStatus::Probation)
            } else {
                None
            }
        }
        ModelStatus::Probation => {
            let quality_ceiling = min_quality_prior.unwrap_or(0.75).max(0.75);
            let cost_within_bounds = max_cost_variance_ratio
                .map(|ratio| prior.cost_multiplier <= ratio)
                .unwrap_or(true);
            if prior.sample_count >= 50 && prior.quality_prior >= quality_ceiling && cost_within_bounds
            {
                return Some(ModelStatus::Active);
            }

            let quality_floor = min_quality_prior.unwrap_or(0.55).max(0.55);
            let still_failing = prior.quality_prior < quality_floor
                || max_cost_variance_ratio
                    .map(|ratio| prior.cost_multiplier > ratio)
                    .unwrap_or(false);
            if prior.sample_count >= 60 && still_failing && !disable_auto_disable {
                Some(ModelStatus::Disabled)
            } else {
                None
            }
        }
        ModelStatus::Disabled => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(actual_quality: f64, predicted_quality: f64, actual_cost: f64, predicted_cost: f64, defects: u32) -> Observation {
        Observation {
            actual_quality,
            predicted_quality,
            actual_cost_usd: actual_cost,
            predicted_cost_usd: predicted_cost,
            defect_count: defects,
            ts_iso: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn sample_count_matches_observation_count() {
        let store = PriorStore::new();
        for i in 0..5 {
            store.record_observation(
                "model-a",
                TaskType::Writing,
                Difficulty::Medium,
                obs(0.8, 0.8, 0.01 * (i as f64 + 1.0), 0.01, 0),
                ModelStatus::Active,
                None,
            );
        }
        let priors = store.load_priors_for_model("model-a");
        assert_eq!(priors.len(), 1);
        assert_eq!(priors[0].sample_count, 5);
        assert!(priors[0].quality_prior >= 0.0 && priors[0].quality_prior <= 1.0);
        assert!(priors[0].cost_multiplier >= 0.2 && priors[0].cost_multiplier <= 5.0);
    }

    #[test]
    fn defect_rate_never_drops_quality_below_90_percent_of_pre_adjustment() {
        let store = PriorStore::new();
        let mut result = None;
        for _ in 0..10 {
            result = Some(store.record_observation(
                "model-b",
                TaskType::CodeGeneration,
                Difficulty::High,
                obs(1.0, 1.0, 0.01, 0.01, 1),
                ModelStatus::Active,
                None,
            ));
        }
        let prior = result.unwrap().prior;
        // pre_adjustment = 1.0, defect_rate = 1.0, factor floored at 0.9.
        assert!((prior.quality_prior - 0.9).abs() < 1e-9);
    }

    #[test]
    fn active_transitions_to_probation_after_enough_bad_samples() {
        let store = PriorStore::new();
        let mut last_transition = None;
        for _ in 0..30 {
            let result = store.record_observation(
                "model-c",
                TaskType::Analysis,
                Difficulty::Low,
                obs(0.2, 0.8, 0.01, 0.01, 1),
                ModelStatus::Active,
                None,
            );
            last_transition = result.status_transition;
        }
        assert_eq!(last_transition, Some(ModelStatus::Probation));
    }
}
