//! Directive-length token estimation heuristic.
//!
//! Short directives should produce smaller estimates than the baseline
//! defaults for the task type; longer directives scale up but never
//! below a task-type-specific floor.

use contracts::{Difficulty, TaskType};

const BASELINE_DIRECTIVE_CHARS: f64 = 400.0;

fn base_input_tokens(task_type: TaskType) -> f64 {
    match task_type {
        TaskType::Writing => 600.0,
        TaskType::CodeGeneration => 900.0,
        TaskType::CodeReview => 700.0,
        TaskType::Analysis => 800.0,
        TaskType::Research => 750.0,
        TaskType::Aggregation => 1200.0,
        TaskType::Other => 500.0,
    }
}

fn base_output_tokens(task_type: TaskType, difficulty: Difficulty) -> f64 {
    let base = match task_type {
        TaskType::Writing => 500.0,
        TaskType::CodeGeneration => 900.0,
        TaskType::CodeReview => 400.0,
        TaskType::Analysis => 600.0,
        TaskType::Research => 650.0,
        TaskType::Aggregation => 1500.0,
        TaskType::Other => 350.0,
    };
    base * match difficulty {
        Difficulty::Low => 0.7,
        Difficulty::Medium => 1.0,
        Difficulty::High => 1.4,
    }
}

/// `input ≈ f(directive length, taskType)`: scales the task type's
/// baseline input estimate by the directive's length relative to a
/// fixed reference length, floored at 40% of baseline.
pub fn estimate_input_tokens(directive_len: usize, task_type: TaskType) -> u64 {
    let base = base_input_tokens(task_type);
    let scale = (directive_len as f64 / BASELINE_DIRECTIVE_CHARS).max(0.4);
    (base * scale).round() as u64
}

/// `output ≈ g(taskType, difficulty)`: independent of directive length,
/// scaled by difficulty.
pub fn estimate_output_tokens(task_type: TaskType, difficulty: Difficulty) -> u64 {
    base_output_tokens(task_type, difficulty).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_directive_produces_smaller_input_estimate() {
        let short = estimate_input_tokens(40, TaskType::Writing);
        let baseline = estimate_input_tokens(400, TaskType::Writing);
        assert!(short < baseline);
    }

    #[test]
    fn higher_difficulty_increases_output_estimate() {
        let low = estimate_output_tokens(TaskType::CodeGeneration, Difficulty::Low);
        let high = estimate_output_tokens(TaskType::CodeGeneration, Difficulty::High);
        assert!(high > low);
    }
}
