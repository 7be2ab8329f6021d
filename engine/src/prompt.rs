//! Worker prompt assembly (§4.8 item 4): task name/description/
//! acceptance criteria/inputs, each bounded per-value, plus dependency
//! artifact excerpts bounded per-dep and in total. The aggregation
//! package additionally gets a fixed strict-JSON-schema preamble and
//! its required-files list.

use contracts::WorkPackage;

const PER_VALUE_CHAR_CAP: usize = 2_000;
const PER_DEP_EXCERPT_CAP: usize = 6_000;
const TOTAL_DEP_EXCERPT_CAP: usize = 18_000;

const AGGREGATION_PREAMBLE: &str = r#"Respond with a single strict JSON object matching exactly this shape, and nothing else:
{"fileTree": string[], "files": {string: string}, "report": {"summary": string, "aggregations": {string: any}}}
Do not wrap the JSON in prose or markdown fences."#;

fn bounded(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        s.to_string()
    } else {
        s.chars().take(cap).collect()
    }
}

/// A dependency's artifact excerpt, already fetched from the registry.
pub struct DependencyExcerpt {
    pub package_id: String,
    pub text: String,
}

/// Assembles the worker prompt. `required_files` is `Some` only for the
/// aggregation package.
pub fn build_worker_prompt(
    pkg: &WorkPackage,
    dependency_excerpts: &[DependencyExcerpt],
    required_files: Option<&[String]>,
) -> String {
    let mut sections = Vec::new();

    if let Some(files) = required_files {
        sections.push(AGGREGATION_PREAMBLE.to_string());
        if !files.is_empty() {
            sections.push(format!("Required files: {}", files.join(", ")));
        }
    }

    sections.push(format!("Task: {}", bounded(&pkg.name, PER_VALUE_CHAR_CAP)));
    sections.push(format!(
        "Description: {}",
        bounded(&pkg.description, PER_VALUE_CHAR_CAP)
    ));

    if !pkg.acceptance_criteria.is_empty() {
        let criteria = pkg
            .acceptance_criteria
            .iter()
            .map(|c| bounded(c, PER_VALUE_CHAR_CAP))
            .collect::<Vec<_>>()
            .join("\n- ");
        sections.push(format!("Acceptance criteria:\n- {criteria}"));
    }

    if !pkg.inputs.is_empty() {
        let mut keys: Vec<&String> = pkg.inputs.keys().collect();
        keys.sort();
        let inputs = keys
            .into_iter()
            .map(|k| format!("{k}: {}", bounded(&pkg.inputs[k], PER_VALUE_CHAR_CAP)))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Inputs:\n{inputs}"));
    }

    if !dependency_excerpts.is_empty() {
        let mut remaining = TOTAL_DEP_EXCERPT_CAP;
        let mut dep_sections = Vec::new();
        for dep in dependency_excerpts {
            if remaining == 0 {
                break;
            }
            let cap = PER_DEP_EXCERPT_CAP.min(remaining);
            let excerpt = bounded(&dep.text, cap);
            remaining = remaining.saturating_sub(excerpt.chars().count());
            dep_sections.push(format!("--- {} ---\n{excerpt}", dep.package_id));
        }
        sections.push(format!("Dependency outputs:\n{}", dep_sections.join("\n")));
    }

    sections.join("\n\n")
}

/// Scans the tail of a worker's response for a trailing `{"selfConfidence": ...}`
/// JSON line. Best-effort: only the last non-empty line is considered,
/// matching the source lineage's "dynamic JSON from LLMs" convention of
/// treating unstructured trailers as optional, ignorable metadata on
/// failure rather than a parse error.
pub fn extract_self_confidence(text: &str) -> Option<f64> {
    let last_line = text.lines().rev().find(|l| !l.trim().is_empty())?;
    let value: serde_json::Value = serde_json::from_str(last_line.trim()).ok()?;
    value.get("selfConfidence")?.as_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn pkg() -> WorkPackage {
        use contracts::{Difficulty, Role, TaskType};
        WorkPackage {
            id: "w1".into(),
            role: Role::Worker,
            name: "Write the README".into(),
            description: "Summarize the project".into(),
            acceptance_criteria: vec!["mentions install steps".into()],
            inputs: HashMap::from([("tone".to_string(), "friendly".to_string())]),
            outputs_schema: None,
            dependencies: vec![],
            estimated_tokens: 500,
            importance: 3,
            task_type: TaskType::Writing,
            difficulty: Difficulty::Medium,
            tier_profile_override: None,
            qa_checks: vec![],
            qa_policy: None,
            cheapest_viable_chosen: false,
        }
    }

    #[test]
    fn prompt_includes_name_description_and_criteria() {
        let prompt = build_worker_prompt(&pkg(), &[], None);
        assert!(prompt.contains("Write the README"));
        assert!(prompt.contains("Summarize the project"));
        assert!(prompt.contains("mentions install steps"));
    }

    #[test]
    fn aggregation_preamble_only_present_for_aggregation_package() {
        let plain = build_worker_prompt(&pkg(), &[], None);
        assert!(!plain.contains("strict JSON"));
        let agg = build_worker_prompt(&pkg(), &[], Some(&["report.json".to_string()]));
        assert!(agg.contains("strict JSON"));
        assert!(agg.contains("report.json"));
    }

    #[test]
    fn dependency_excerpts_are_capped_in_total() {
        let deps: Vec<DependencyExcerpt> = (0..5)
            .map(|i| DependencyExcerpt {
                package_id: format!("dep-{i}"),
                text: "x".repeat(10_000),
            })
            .collect();
        let prompt = build_worker_prompt(&pkg(), &deps, None);
        let dep_section_start = prompt.find("Dependency outputs:").unwrap();
        assert!(prompt[dep_section_start..].len() <= TOTAL_DEP_EXCERPT_CAP + 500);
    }

    #[test]
    fn extracts_trailing_self_confidence_line() {
        let text = "Here is my answer.\n{\"selfConfidence\": 0.82}";
        assert_eq!(extract_self_confidence(text), Some(0.82));
    }

    #[test]
    fn missing_trailer_yields_none() {
        assert_eq!(extract_self_confidence("just prose, no json"), None);
    }
}
