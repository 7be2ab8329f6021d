//! Task card: the routing input derived per-package at scheduling time.

use serde::{Deserialize, Serialize};

use crate::work_package::{Difficulty, TaskType};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskConstraints {
    pub min_quality: Option<f64>,
    pub max_cost_usd: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCard {
    pub id: String,
    pub task_type: TaskType,
    pub difficulty: Difficulty,
    pub constraints: TaskConstraints,
}
