//! QA subsystem: deterministic shell checks plus an optional LLM QA
//! second pass behind a strict JSON contract. Computes a pass/fail
//! verdict and quality score; the scheduler's commit step is
//! responsible for the resulting ledger decisions and escalation
//! events, so this crate never touches the ledger.

pub mod shell;
pub mod verdict;

use async_trait::async_trait;
use contracts::{QaCheck, QaPolicy, QaVerdictContract};

pub use shell::{run_shell_check, summarize, CheckStatus, ShellAllowlist, ShellCheckOutcome, ShellCheckSummary};
pub use verdict::should_run_llm_pass;

#[derive(Debug, thiserror::Error)]
pub enum QaError {
    #[error("LLM QA transport error: {0}")]
    Transport(String),
}

/// The external LLM text-completion collaborator, scoped to QA calls.
#[async_trait]
pub trait LlmQaCaller: Send + Sync {
    async fn call(&self, model_id: &str, prompt: &str) -> Result<String, QaError>;
}

#[derive(Debug, Clone)]
pub struct QaVerdict {
    pub pass: bool,
    pub quality_score: f64,
    pub defects: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct QaOutcome {
    pub verdict: QaVerdict,
    pub shell_summary: Option<ShellCheckSummary>,
    pub used_llm: bool,
    /// Non-fatal: the LLM's response failed to parse or violated the
    /// strict-JSON schema; the deterministic result is kept as-is.
    pub llm_rejected_warning: Option<String>,
    /// The LLM step was skipped because its predicted cost would
    /// exceed the remaining run budget.
    pub budget_gated: bool,
}

pub struct QaRunRequest<'a> {
    pub qa_checks: &'a [QaCheck],
    pub allowlist: &'a ShellAllowlist,
    pub cwd: &'a std::path::Path,
    pub policy: QaPolicy,
    pub importance: u8,
    pub llm_second_pass_importance_threshold: u8,
    pub llm_model_id: Option<&'a str>,
    pub llm_prompt: Option<&'a str>,
    pub predicted_llm_cost_usd: f64,
    pub remaining_budget_usd: f64,
}

/// Runs the deterministic shell checks (if any), then decides whether
/// an LLM QA second pass is needed and, if so, whether the budget
/// permits it. When both passes run, the LLM's verdict is authoritative
/// downstream; the deterministic result is retained only for QA trust
/// agreement scoring.
pub async fn run_qa<C: LlmQaCaller + ?Sized>(
    request: QaRunRequest<'_>,
    llm_caller: &C,
) -> QaOutcome {
    let shell_summary = if request.qa_checks.is_empty() {
        None
    } else {
        let mut outcomes = Vec::with_capacity(request.qa_checks.len());
        for check in request.qa_checks {
            outcomes.push(run_shell_check(check, request.allowlist, request.cwd).await);
        }
        Some(summarize(outcomes))
    };

    let (deterministic_pass, deterministic_score) = match &shell_summary {
        Some(summary) => (summary.pass, summary.quality_score),
        None => (true, shell::NO_CHECKS_QUALITY_SCORE),
    };

    let mut verdict = QaVerdict {
        pass: deterministic_pass,
        quality_score: deterministic_score,
        defects: Vec::new(),
    };

    let wants_llm = should_run_llm_pass(
        deterministic_pass,
        &request.policy,
        request.importance,
        request.llm_second_pass_importance_threshold,
    );

    if !wants_llm || request.llm_model_id.is_none() || request.llm_prompt.is_none() {
        return QaOutcome {
            verdict,
            shell_summary,
            used_llm: false,
            llm_rejected_warning: None,
            budget_gated: false,
        };
    }

    if request.predicted_llm_cost_usd > request.remaining_budget_usd {
        tracing::warn!(
            predicted = request.predicted_llm_cost_usd,
            remaining = request.remaining_budget_usd,
            "skipping LLM QA pass: budget gated"
        );
        return QaOutcome {
            verdict,
            shell_summary,
            used_llm: false,
            llm_rejected_warning: None,
            budget_gated: true,
        };
    }

    let model_id = request.llm_model_id.unwrap();
    let prompt = request.llm_prompt.unwrap();

    let response = match llm_caller.call(model_id, prompt).await {
        Ok(text) => text,
        Err(err) => {
            return QaOutcome {
                verdict,
                shell_summary,
                used_llm: false,
                llm_rejected_warning: Some(format!("LLM QA transport error: {err}")),
                budget_gated: false,
            };
        }
    };

    match QaVerdictContract::try_from_text(&response) {
        Ok(contract) => {
            verdict = QaVerdict {
                pass: contract.pass,
                quality_score: contract.quality_score,
                defects: contract.defects,
            };
            QaOutcome {
                verdict,
                shell_summary,
                used_llm: true,
                llm_rejected_warning: None,
                budget_gated: false,
            }
        }
        Err(err) => QaOutcome {
            verdict,
            shell_summary,
            used_llm: false,
            llm_rejected_warning: Some(format!("LLM QA response rejected: {err}")),
            budget_gated: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct StubCaller(String);

    #[async_trait]
    impl LlmQaCaller for StubCaller {
        async fn call(&self, _model_id: &str, _prompt: &str) -> Result<String, QaError> {
            Ok(self.0.clone())
        }
    }

    fn base_request<'a>(
        checks: &'a [QaCheck],
        allowlist: &'a ShellAllowlist,
        cwd: &'a PathBuf,
    ) -> QaRunRequest<'a> {
        QaRunRequest {
            qa_checks: checks,
            allowlist,
            cwd,
            policy: QaPolicy::default(),
            importance: 1,
            llm_second_pass_importance_threshold: 4,
            llm_model_id: Some("qa-model"),
            llm_prompt: Some("review this output"),
            predicted_llm_cost_usd: 0.001,
            remaining_budget_usd: 1.0,
        }
    }

    #[tokio::test]
    async fn no_checks_skips_llm_by_default() {
        let checks: Vec<QaCheck> = vec![];
        let allowlist = ShellAllowlist::default();
        let cwd = PathBuf::from(".");
        let caller = StubCaller(String::new());
        let outcome = run_qa(base_request(&checks, &allowlist, &cwd), &caller).await;
        assert!(!outcome.used_llm);
        assert!(outcome.verdict.pass);
        assert_eq!(outcome.verdict.quality_score, shell::NO_CHECKS_QUALITY_SCORE);
    }

    #[tokio::test]
    async fn budget_gated_skips_llm_and_keeps_deterministic_result() {
        let checks: Vec<QaCheck> = vec![];
        let allowlist = ShellAllowlist::default();
        let cwd = PathBuf::from(".");
        let caller = StubCaller(String::new());
        let mut request = base_request(&checks, &allowlist, &cwd);
        request.importance = 5; // forces wants_llm = true
        request.predicted_llm_cost_usd = 10.0;
        request.remaining_budget_usd = 0.01;
        let outcome = run_qa(request, &caller).await;
        assert!(outcome.budget_gated);
        assert!(!outcome.used_llm);
    }

    #[tokio::test]
    async fn valid_llm_verdict_becomes_authoritative() {
        let checks: Vec<QaCheck> = vec![];
        let allowlist = ShellAllowlist::default();
        let cwd = PathBuf::from(".");
        let caller = StubCaller(r#"{"pass": false, "qualityScore": 0.4, "defects": ["missing tests"]}"#.to_string());
        let mut request = base_request(&checks, &allowlist, &cwd);
        request.importance = 5;
        let outcome = run_qa(request, &caller).await;
        assert!(outcome.used_llm);
        assert!(!outcome.verdict.pass);
        assert_eq!(outcome.verdict.quality_score, 0.4);
    }

    #[tokio::test]
    async fn unparseable_llm_response_keeps_deterministic_result() {
        let checks: Vec<QaCheck> = vec![];
        let allowlist = ShellAllowlist::default();
        let cwd = PathBuf::from(".");
        let caller = StubCaller("not json".to_string());
        let mut request = base_request(&checks, &allowlist, &cwd);
        request.importance = 5;
        let outcome = run_qa(request, &caller).await;
        assert!(!outcome.used_llm);
        assert!(outcome.llm_rejected_warning.is_some());
        assert!(outcome.verdict.pass);
    }
}
