//! Error taxonomy (kinds, not type names): validation errors are the
//! run's terminal failure; everything else the scheduler can continue
//! past, surfacing a warning instead.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("graph validation failed: {0}")]
    Validation(String),
    #[error("deadlock: {unresolved:?} package(s) never became ready")]
    Deadlock { unresolved: Vec<String> },
}
