//! Strict-JSON contract for an LLM QA call's response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ContractError, ContractKind, ValidationIssue};
use crate::schema::QA_VERDICT_SCHEMA;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QaVerdictContract {
    pub pass: bool,
    #[serde(rename = "qualityScore")]
    pub quality_score: f64,
    pub defects: Vec<String>,
}

impl QaVerdictContract {
    pub fn validate(&self) -> Result<(), ContractError> {
        let value = serde_json::to_value(self)
            .map_err(|err| ContractError::serialization(ContractKind::QaVerdict, err))?;
        validate_qa_verdict_value(&value)
    }

    /// Extract and validate the first JSON value found in `text`.
    ///
    /// LLM QA responses sometimes wrap the JSON payload in prose or
    /// markdown fences; this scans for the first `{ ... }` span and
    /// tries that before giving up.
    pub fn try_from_text(text: &str) -> Result<Self, ContractError> {
        let candidate = first_json_object(text).ok_or_else(|| ContractError::Extraction {
            kind: ContractKind::QaVerdict,
            message: "no JSON object found in response text".to_string(),
        })?;
        let value: Value = serde_json::from_str(candidate)
            .map_err(|err| ContractError::serialization(ContractKind::QaVerdict, err))?;
        Self::try_from_value(value)
    }

    pub fn try_from_value(value: Value) -> Result<Self, ContractError> {
        validate_qa_verdict_value(&value)?;
        serde_json::from_value(value)
            .map_err(|err| ContractError::serialization(ContractKind::QaVerdict, err))
    }
}

pub fn validate_qa_verdict_value(value: &Value) -> Result<(), ContractError> {
    match QA_VERDICT_SCHEMA.validate(value) {
        Ok(_) => Ok(()),
        Err(errors) => {
            let issues: Vec<ValidationIssue> = errors
                .map(|error| ValidationIssue {
                    instance_path: error.instance_path.to_string(),
                    schema_path: error.schema_path.to_string(),
                    message: error.to_string(),
                })
                .collect();
            Err(ContractError::validation(ContractKind::QaVerdict, issues))
        }
    }
}

/// Extracts the first balanced-brace `{...}` span in `text`, scanning
/// left to right and tracking nesting depth so an embedded JSON blob is
/// found even when it is not the whole string.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
