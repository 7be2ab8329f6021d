//! Decides whether a deterministic QA result is sufficient or whether
//! an LLM QA second pass is required.

use contracts::QaPolicy;

/// Stop after the deterministic pass unless the policy demands a
/// second opinion: the package failed deterministically, the policy
/// doesn't trust a deterministic pass on its own, importance crosses
/// the second-pass threshold, or high-risk packages always get one.
pub fn should_run_llm_pass(
    deterministic_pass: bool,
    policy: &QaPolicy,
    importance: u8,
    llm_second_pass_importance_threshold: u8,
) -> bool {
    let stop_after_deterministic = deterministic_pass
        && policy.skip_llm_on_pass
        && importance < llm_second_pass_importance_threshold
        && !policy.always_llm_for_high_risk;
    !stop_after_deterministic
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_pass_skips_llm_by_default() {
        let policy = QaPolicy::default();
        assert!(!should_run_llm_pass(true, &policy, 1, 4));
    }

    #[test]
    fn deterministic_failure_always_runs_llm() {
        let policy = QaPolicy::default();
        assert!(should_run_llm_pass(false, &policy, 1, 4));
    }

    #[test]
    fn high_importance_forces_llm_even_on_pass() {
        let policy = QaPolicy::default();
        assert!(should_run_llm_pass(true, &policy, 5, 4));
    }

    #[test]
    fn always_llm_for_high_risk_overrides_skip() {
        let policy = QaPolicy {
            skip_llm_on_pass: true,
            always_llm_for_high_risk: true,
        };
        assert!(should_run_llm_pass(true, &policy, 1, 4));
    }
}
