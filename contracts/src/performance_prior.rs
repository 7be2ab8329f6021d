//! Performance prior: rolling per-(model, task-type, difficulty)
//! calibration summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::work_package::{Difficulty, TaskType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformancePrior {
    pub task_type: TaskType,
    pub difficulty: Difficulty,
    pub quality_prior: f64,
    pub cost_multiplier: f64,
    pub variance_band_low: f64,
    pub variance_band_high: f64,
    pub defect_rate: f64,
    pub calibration_confidence: f64,
    pub sample_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl PerformancePrior {
    pub fn cold_start(task_type: TaskType, difficulty: Difficulty, now: DateTime<Utc>) -> Self {
        Self {
            task_type,
            difficulty,
            quality_prior: 0.75,
            cost_multiplier: 1.0,
            variance_band_low: 0.8,
            variance_band_high: 1.2,
            defect_rate: 0.0,
            calibration_confidence: 0.0,
            sample_count: 0,
            last_updated: now,
        }
    }
}
