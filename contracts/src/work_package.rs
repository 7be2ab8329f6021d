//! Work package: a node of the plan DAG.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Worker,
    Qa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Low,
    Medium,
    High,
}

impl Difficulty {
    /// Ordinal rank used by the scheduler's priority sort:
    /// high=3, medium=2, low=1.
    pub fn rank(self) -> u8 {
        match self {
            Difficulty::High => 3,
            Difficulty::Medium => 2,
            Difficulty::Low => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierProfile {
    Cheap,
    Standard,
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Writing,
    CodeGeneration,
    CodeReview,
    Analysis,
    Research,
    Aggregation,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellCheckKind {
    Shell,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaCheck {
    pub kind: ShellCheckKind,
    /// Dot-delimited allowlist key, e.g. `npm.build`.
    pub command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPolicy {
    pub skip_llm_on_pass: bool,
    pub always_llm_for_high_risk: bool,
}

impl Default for QaPolicy {
    fn default() -> Self {
        Self {
            skip_llm_on_pass: true,
            always_llm_for_high_risk: false,
        }
    }
}

/// A node of the plan DAG: either a Worker (produces an artifact) or a
/// QA (validates exactly one Worker's artifact).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkPackage {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub inputs: HashMap<String, String>,
    #[serde(default)]
    pub outputs_schema: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub estimated_tokens: u64,
    pub importance: u8,
    pub task_type: TaskType,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tier_profile_override: Option<TierProfile>,
    #[serde(default)]
    pub qa_checks: Vec<QaCheck>,
    #[serde(default)]
    pub qa_policy: Option<QaPolicy>,
    #[serde(default)]
    pub cheapest_viable_chosen: bool,
}

impl WorkPackage {
    pub fn is_qa(&self) -> bool {
        self.role == Role::Qa
    }
}
