use std::fmt;

/// Contract artifact categories handled by the interoperability layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    QaVerdict,
    AggregationOutput,
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContractKind::QaVerdict => "qa-verdict",
            ContractKind::AggregationOutput => "aggregation-output",
        };
        write!(f, "{}", label)
    }
}

/// Detailed validation failure emitted by the contract validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub instance_path: String,
    pub schema_path: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (instance: {}, schema: {})",
            self.message, self.instance_path, self.schema_path
        )
    }
}

/// Errors raised by the interoperability contract layer.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("{kind} contract validation failed")]
    Validation {
        kind: ContractKind,
        issues: Vec<ValidationIssue>,
    },
    #[error("{kind} contract (de)serialization error: {source}")]
    Serialization {
        kind: ContractKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} contains a banned phrase: {phrase}")]
    BannedPhrase { kind: ContractKind, phrase: String },
    #[error("{kind} contract extraction failed: {message}")]
    Extraction { kind: ContractKind, message: String },
}

impl ContractError {
    pub fn validation(kind: ContractKind, issues: Vec<ValidationIssue>) -> Self {
        Self::Validation { kind, issues }
    }

    pub fn serialization(kind: ContractKind, source: serde_json::Error) -> Self {
        Self::Serialization { kind, source }
    }

    pub fn kind(&self) -> ContractKind {
        match self {
            ContractError::Validation { kind, .. } => *kind,
            ContractError::Serialization { kind, .. } => *kind,
            ContractError::BannedPhrase { kind, .. } => *kind,
            ContractError::Extraction { kind, .. } => *kind,
        }
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            ContractError::Validation { issues, .. } => issues,
            _ => &[],
        }
    }
}
