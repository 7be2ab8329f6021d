//! Model registry entry: canonical catalog record.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::work_package::{TaskType, TierProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Active,
    Probation,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelIdentity {
    pub provider: String,
    pub model_id: String,
    pub status: ModelStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pricing {
    pub in_per_1k: f64,
    pub out_per_1k: f64,
    pub currency: Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    Usd,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Governance {
    pub min_quality_prior: Option<f64>,
    pub max_cost_variance_ratio: Option<f64>,
    pub max_recent_escalations: Option<u32>,
    pub disable_auto_disable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTimestamps {
    pub created_iso: String,
    pub updated_iso: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRegistryEntry {
    pub id: String,
    pub identity: ModelIdentity,
    pub pricing: Pricing,
    pub expertise: HashMap<TaskType, f64>,
    pub reliability: f64,
    pub allowed_tiers: Vec<TierProfile>,
    pub governance: Option<Governance>,
    pub timestamps: ModelTimestamps,
}

impl ModelRegistryEntry {
    pub fn expertise_for(&self, task_type: TaskType) -> f64 {
        self.expertise.get(&task_type).copied().unwrap_or(0.5)
    }
}
