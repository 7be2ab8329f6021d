//! External collaborator traits: the seams spec §1 names as explicitly
//! out of scope (LLM transport, deliverable assembly). The engine only
//! owns the trait and a thin adapter wiring QA's own collaborator trait
//! to the same transport; callers supply a real implementation.

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, thiserror::Error)]
#[error("LLM transport error: {0}")]
pub struct TransportError(pub String);

/// Text-completion collaborator (spec §6): `execute(modelId, prompt) ->
/// {text, usage}`. Errors surface as a warning for the affected
/// package; that package never completes and its dependents stay
/// blocked.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn execute(&self, model_id: &str, prompt: &str) -> Result<LlmResponse, TransportError>;
}

#[derive(Debug, Clone, Default)]
pub struct AssemblyOutcome {
    pub compilation_success: bool,
    pub file_count: u32,
}

#[derive(Debug, thiserror::Error)]
#[error("assembly collaborator error: {0}")]
pub struct AssemblyError(pub String);

/// Deliverable assembly/compile-verification collaborator (spec §1,
/// explicitly out of scope to implement). Only invoked for the
/// aggregation package, after its QA pass.
#[async_trait]
pub trait AssemblyCollaborator: Send + Sync {
    async fn assemble(&self, content: &str) -> Result<AssemblyOutcome, AssemblyError>;
}

/// Adapts an [`LlmTransport`] to [`qa::LlmQaCaller`] so the same
/// transport serves both worker dispatch and the LLM QA second pass.
pub struct QaLlmAdapter<T: LlmTransport + ?Sized> {
    transport: std::sync::Arc<T>,
}

impl<T: LlmTransport + ?Sized> QaLlmAdapter<T> {
    pub fn new(transport: std::sync::Arc<T>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: LlmTransport + ?Sized> qa::LlmQaCaller for QaLlmAdapter<T> {
    async fn call(&self, model_id: &str, prompt: &str) -> Result<String, qa::QaError> {
        self.transport
            .execute(model_id, prompt)
            .await
            .map(|r| r.text)
            .map_err(|err| qa::QaError::Transport(err.0))
    }
}
