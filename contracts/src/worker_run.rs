//! Worker run and QA result records.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRun {
    pub package_id: String,
    pub model_id: String,
    pub output: String,
    pub predicted_quality: f64,
    pub actual_quality: Option<f64>,
    pub predicted_cost_usd: f64,
    pub actual_cost_usd: f64,
    pub is_estimated_cost: bool,
    pub self_confidence: Option<f64>,
    pub artifact_id: String,
    pub artifact_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QaModelId {
    Deterministic,
    Model(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaResult {
    pub package_id: String,
    pub worker_package_id: String,
    pub pass: bool,
    pub quality_score: f64,
    pub defects: Vec<String>,
    pub model_id: QaModelId,
}
