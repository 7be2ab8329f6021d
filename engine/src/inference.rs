//! Keyword-based task classification used as a consistency check
//! against a package's declared `taskType`/`difficulty` (§4.8 item 1).
//!
//! Plans arrive with `taskType`/`difficulty` already set by the
//! directive-to-plan decomposition collaborator (out of scope, §1), so
//! the scheduler trusts those fields for routing. This module exists
//! to flag a plan whose name/description reads as a different task
//! type than the one it was tagged with — a smell worth a debug log,
//! not worth overriding the declared field outright.

use contracts::{Difficulty, TaskType};

const WRITING_KEYWORDS: &[&str] = &["write", "draft", "compose", "copy", "narrative", "article"];
const CODE_GEN_KEYWORDS: &[&str] = &["implement", "build", "function", "api", "endpoint", "module", "feature"];
const CODE_REVIEW_KEYWORDS: &[&str] = &["review", "audit", "lint", "refactor"];
const ANALYSIS_KEYWORDS: &[&str] = &["analy", "evaluate", "assess", "compare"];
const RESEARCH_KEYWORDS: &[&str] = &["research", "investigate", "survey", "explore"];
const AGGREGATION_KEYWORDS: &[&str] = &["aggregat", "assemble", "compile", "merge", "report"];

const HIGH_DIFFICULTY_KEYWORDS: &[&str] = &["complex", "distributed", "concurrent", "critical", "migration"];
const LOW_DIFFICULTY_KEYWORDS: &[&str] = &["simple", "trivial", "minor", "typo", "rename"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Infers a task type from `name`/`description` text, falling back to
/// [`TaskType::Other`] when no keyword set matches. Checked in a fixed
/// priority order so overlapping keywords (e.g. "review the research")
/// resolve deterministically.
pub fn infer_task_type(name: &str, description: &str) -> TaskType {
    let text = format!("{name} {description}").to_lowercase();

    if contains_any(&text, AGGREGATION_KEYWORDS) {
        TaskType::Aggregation
    } else if contains_any(&text, CODE_REVIEW_KEYWORDS) {
        TaskType::CodeReview
    } else if contains_any(&text, CODE_GEN_KEYWORDS) {
        TaskType::CodeGeneration
    } else if contains_any(&text, RESEARCH_KEYWORDS) {
        TaskType::Research
    } else if contains_any(&text, ANALYSIS_KEYWORDS) {
        TaskType::Analysis
    } else if contains_any(&text, WRITING_KEYWORDS) {
        TaskType::Writing
    } else {
        TaskType::Other
    }
}

/// Infers a difficulty signal from `name`/`description`, defaulting to
/// [`Difficulty::Medium`] when neither keyword set matches.
pub fn infer_difficulty(name: &str, description: &str) -> Difficulty {
    let text = format!("{name} {description}").to_lowercase();
    if contains_any(&text, HIGH_DIFFICULTY_KEYWORDS) {
        Difficulty::High
    } else if contains_any(&text, LOW_DIFFICULTY_KEYWORDS) {
        Difficulty::Low
    } else {
        Difficulty::Medium
    }
}

/// `true` when the keyword inference disagrees with the package's
/// declared `taskType`; logged by the caller as a debug-level
/// consistency warning, never used to override routing.
pub fn disagrees_with_declared(name: &str, description: &str, declared: TaskType) -> bool {
    let inferred = infer_task_type(name, description);
    inferred != TaskType::Other && inferred != declared
}
