//! Sandboxed shell QA checks: allowlisted commands only, hard 90s
//! timeout, last-2000-bytes output capture.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use contracts::QaCheck;
use tokio::process::Command;
use tokio::time::timeout;

const SHELL_CHECK_TIMEOUT: Duration = Duration::from_secs(90);
const OUTPUT_TAIL_BYTES: usize = 2_000;

/// Maps a dot-delimited allowlist key (e.g. `npm.build`) to the program
/// and argument vector actually invoked. Anything missing from the map
/// is refused without being spawned.
#[derive(Debug, Clone)]
pub struct ShellAllowlist {
    commands: HashMap<String, Vec<String>>,
}

impl Default for ShellAllowlist {
    fn default() -> Self {
        let mut commands = HashMap::new();
        commands.insert("npm.build".to_string(), vec!["npm".into(), "run".into(), "build".into()]);
        commands.insert("npm.lint".to_string(), vec!["npm".into(), "run".into(), "lint".into()]);
        commands.insert("npm.test".to_string(), vec!["npm".into(), "test".into()]);
        Self { commands }
    }
}

impl ShellAllowlist {
    pub fn new(commands: HashMap<String, Vec<String>>) -> Self {
        Self { commands }
    }

    pub fn resolve(&self, key: &str) -> Option<&[String]> {
        self.commands.get(key).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Passed,
    Failed,
    /// A "missing script" style failure (the allowlisted command exists
    /// but the target project has no such script); counts as skipped,
    /// not a real failure.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct ShellCheckOutcome {
    pub command_key: String,
    pub status: CheckStatus,
    pub stdout_tail: String,
    pub stderr_tail: String,
}

fn tail_bytes(buf: &[u8], limit: usize) -> String {
    let start = buf.len().saturating_sub(limit);
    String::from_utf8_lossy(&buf[start..]).to_string()
}

fn looks_like_missing_script(stderr: &str, stdout: &str) -> bool {
    let haystack = format!("{stderr} {stdout}").to_lowercase();
    haystack.contains("missing script")
}

/// Runs a single shell QA check. Commands outside the allowlist are
/// refused with exit code 1 and never spawned.
pub async fn run_shell_check(
    check: &QaCheck,
    allowlist: &ShellAllowlist,
    cwd: &Path,
) -> ShellCheckOutcome {
    let Some(argv) = allowlist.resolve(&check.command) else {
        return ShellCheckOutcome {
            command_key: check.command.clone(),
            status: CheckStatus::Failed,
            stdout_tail: String::new(),
            stderr_tail: format!("Command not allowed: {}", check.command),
        };
    };

    let Some((program, args)) = argv.split_first() else {
        return ShellCheckOutcome {
            command_key: check.command.clone(),
            status: CheckStatus::Failed,
            stdout_tail: String::new(),
            stderr_tail: format!("Command not allowed: {}", check.command),
        };
    };

    let spawn = Command::new(program).args(args).current_dir(cwd).output();

    match timeout(SHELL_CHECK_TIMEOUT, spawn).await {
        Ok(Ok(output)) => {
            let stdout_tail = tail_bytes(&output.stdout, OUTPUT_TAIL_BYTES);
            let stderr_tail = tail_bytes(&output.stderr, OUTPUT_TAIL_BYTES);
            let status = if output.status.success() {
                CheckStatus::Passed
            } else if looks_like_missing_script(&stderr_tail, &stdout_tail) {
                CheckStatus::Skipped
            } else {
                CheckStatus::Failed
            };
            ShellCheckOutcome {
                command_key: check.command.clone(),
                status,
                stdout_tail,
                stderr_tail,
            }
        }
        Ok(Err(err)) => ShellCheckOutcome {
            command_key: check.command.clone(),
            status: CheckStatus::Failed,
            stdout_tail: String::new(),
            stderr_tail: format!("failed to spawn: {err}"),
        },
        Err(_) => ShellCheckOutcome {
            command_key: check.command.clone(),
            status: CheckStatus::Failed,
            stdout_tail: String::new(),
            stderr_tail: "[timeout]".to_string(),
        },
    }
}

/// The default deterministic quality score when a package carries no
/// shell checks at all.
pub const NO_CHECKS_QUALITY_SCORE: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct ShellCheckSummary {
    pub pass: bool,
    pub quality_score: f64,
    pub outcomes: Vec<ShellCheckOutcome>,
}

/// Aggregates a batch of shell check outcomes into a pass/fail verdict
/// and a bucketed quality score per the counts of passed/skipped/failed
/// checks.
pub fn summarize(outcomes: Vec<ShellCheckOutcome>) -> ShellCheckSummary {
    if outcomes.is_empty() {
        return ShellCheckSummary {
            pass: true,
            quality_score: NO_CHECKS_QUALITY_SCORE,
            outcomes,
        };
    }

    let failed = outcomes.iter().filter(|o| o.status == CheckStatus::Failed).count();
    let skipped = outcomes.iter().filter(|o| o.status == CheckStatus::Skipped).count();
    let passed = outcomes.len() - failed - skipped;

    let pass = failed == 0;
    let quality_score = if failed > 0 {
        0.3
    } else if passed == 0 {
        0.7
    } else if skipped > 0 {
        0.85
    } else {
        1.0
    };

    ShellCheckSummary {
        pass,
        quality_score,
        outcomes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: CheckStatus) -> ShellCheckOutcome {
        ShellCheckOutcome {
            command_key: "npm.test".to_string(),
            status,
            stdout_tail: String::new(),
            stderr_tail: String::new(),
        }
    }

    #[test]
    fn no_checks_uses_default_score() {
        let summary = summarize(vec![]);
        assert!(summary.pass);
        assert_eq!(summary.quality_score, NO_CHECKS_QUALITY_SCORE);
    }

    #[test]
    fn any_real_failure_fails_the_whole_check() {
        let summary = summarize(vec![outcome(CheckStatus::Passed), outcome(CheckStatus::Failed)]);
        assert!(!summary.pass);
        assert_eq!(summary.quality_score, 0.3);
    }

    #[test]
    fn all_skipped_passes_with_low_confidence_score() {
        let summary = summarize(vec![outcome(CheckStatus::Skipped), outcome(CheckStatus::Skipped)]);
        assert!(summary.pass);
        assert_eq!(summary.quality_score, 0.7);
    }

    #[test]
    fn mixed_passed_and_skipped_scores_in_between() {
        let summary = summarize(vec![outcome(CheckStatus::Passed), outcome(CheckStatus::Skipped)]);
        assert!(summary.pass);
        assert_eq!(summary.quality_score, 0.85);
    }

    #[test]
    fn all_passed_scores_perfect() {
        let summary = summarize(vec![outcome(CheckStatus::Passed), outcome(CheckStatus::Passed)]);
        assert!(summary.pass);
        assert_eq!(summary.quality_score, 1.0);
    }

    #[tokio::test]
    async fn disallowed_command_is_never_spawned() {
        let check = QaCheck {
            kind: contracts::ShellCheckKind::Shell,
            command: "rm.rf".to_string(),
        };
        let outcome = run_shell_check(&check, &ShellAllowlist::default(), Path::new(".")).await;
        assert_eq!(outcome.status, CheckStatus::Failed);
        assert!(outcome.stderr_tail.contains("Command not allowed"));
    }
}
