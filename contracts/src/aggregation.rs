//! Strict-JSON contract for the aggregation package's output and the
//! package-id dispatched output validator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{ContractError, ContractKind, ValidationIssue};
use crate::schema::AGGREGATION_OUTPUT_SCHEMA;

/// Substrings banned from the aggregation package's serialized output,
/// matched case-insensitively. Anything landing here is almost always
/// an LLM apologizing instead of emitting the strict-JSON contract.
pub const BANNED_PHRASES: &[&str] = &[
    "i cannot",
    "i'm unable to",
    "as an ai language model",
    "i apologize",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregationReport {
    pub summary: String,
    pub aggregations: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregationOutputContract {
    #[serde(rename = "fileTree")]
    pub file_tree: Vec<String>,
    pub files: HashMap<String, String>,
    pub report: AggregationReport,
}

impl AggregationOutputContract {
    /// The canonical synthetic output emitted when a dependency
    /// artifact is missing or empty.
    pub fn missing_dependencies_synthetic() -> Self {
        Self {
            file_tree: vec![],
            files: HashMap::new(),
            report: AggregationReport {
                summary: "Dependency artifacts missing".to_string(),
                aggregations: HashMap::new(),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        let value = serde_json::to_value(self)
            .map_err(|err| ContractError::serialization(ContractKind::AggregationOutput, err))?;
        validate_aggregation_output_value(&value)
    }
}

/// Package-id dispatched output validator: only the aggregation package
/// gets this strict treatment; it rejects banned phrases, non-JSON
/// output, and JSON missing the required keys.
pub fn validate_aggregation_package_output(
    package_id: &str,
    aggregation_package_id: &str,
    raw_output: &str,
) -> Result<AggregationOutputContract, ContractError> {
    debug_assert_eq!(package_id, aggregation_package_id);

    let lowered = raw_output.to_lowercase();
    for phrase in BANNED_PHRASES {
        if lowered.contains(phrase) {
            return Err(ContractError::BannedPhrase {
                kind: ContractKind::AggregationOutput,
                phrase: phrase.to_string(),
            });
        }
    }

    let value: Value = serde_json::from_str(raw_output)
        .map_err(|err| ContractError::serialization(ContractKind::AggregationOutput, err))?;
    validate_aggregation_output_value(&value)?;
    serde_json::from_value(value)
        .map_err(|err| ContractError::serialization(ContractKind::AggregationOutput, err))
}

pub fn validate_aggregation_output_value(value: &Value) -> Result<(), ContractError> {
    match AGGREGATION_OUTPUT_SCHEMA.validate(value) {
        Ok(_) => Ok(()),
        Err(errors) => {
            let issues: Vec<ValidationIssue> = errors
                .map(|error| ValidationIssue {
                    instance_path: error.instance_path.to_string(),
                    schema_path: error.schema_path.to_string(),
                    message: error.to_string(),
                })
                .collect();
            Err(ContractError::validation(
                ContractKind::AggregationOutput,
                issues,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AggregationOutputContract {
        AggregationOutputContract {
            file_tree: vec!["src/lib.rs".into()],
            files: HashMap::from([("src/lib.rs".to_string(), "fn main() {}".to_string())]),
            report: AggregationReport {
                summary: "ok".into(),
                aggregations: HashMap::new(),
            },
        }
    }

    #[test]
    fn valid_output_round_trips() {
        let contract = sample();
        contract.validate().expect("valid");
        let raw = serde_json::to_string(&contract).unwrap();
        let parsed = validate_aggregation_package_output("agg-1", "agg-1", &raw).unwrap();
        assert_eq!(parsed, contract);
    }

    #[test]
    fn rejects_banned_phrase() {
        let err = validate_aggregation_package_output(
            "agg-1",
            "agg-1",
            "I apologize, but I cannot complete this aggregation.",
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::BannedPhrase { .. }));
    }

    #[test]
    fn rejects_non_json() {
        let err = validate_aggregation_package_output("agg-1", "agg-1", "not json at all").unwrap_err();
        assert_eq!(err.kind(), ContractKind::AggregationOutput);
    }

    #[test]
    fn rejects_missing_keys() {
        let err =
            validate_aggregation_package_output("agg-1", "agg-1", r#"{"fileTree": []}"#).unwrap_err();
        assert_eq!(err.kind(), ContractKind::AggregationOutput);
        assert!(!err.issues().is_empty());
    }

    #[test]
    fn missing_dependencies_synthetic_is_valid() {
        AggregationOutputContract::missing_dependencies_synthetic()
            .validate()
            .expect("synthetic output must satisfy its own contract");
    }
}
