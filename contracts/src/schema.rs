use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::debug;

use crate::error::ContractKind;

/// Raw schema sources embedded at compile time.
pub(crate) static QA_VERDICT_SCHEMA_RAW: &str =
    include_str!("../schemas/qa-verdict.schema.json");
pub(crate) static AGGREGATION_OUTPUT_SCHEMA_RAW: &str =
    include_str!("../schemas/aggregation-output.schema.json");

fn compile(kind: ContractKind, raw: &'static str) -> JSONSchema {
    let parsed: Value = serde_json::from_str(raw)
        .unwrap_or_else(|err| panic!("Failed to parse {kind:?} JSON schema embedded resource: {err}"));
    debug!(target: "contracts", ?kind, "Compiling contract schema");
    JSONSchema::compile(&parsed).unwrap_or_else(|err| panic!("Failed to compile {kind:?} JSON schema: {err}"))
}

pub(crate) static QA_VERDICT_SCHEMA: Lazy<JSONSchema> =
    Lazy::new(|| compile(ContractKind::QaVerdict, QA_VERDICT_SCHEMA_RAW));

pub(crate) static AGGREGATION_OUTPUT_SCHEMA: Lazy<JSONSchema> =
    Lazy::new(|| compile(ContractKind::AggregationOutput, AGGREGATION_OUTPUT_SCHEMA_RAW));
