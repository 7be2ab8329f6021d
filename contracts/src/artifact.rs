//! Artifact: a worker's textual output, content-addressed and
//! size-capped.

use serde::{Deserialize, Serialize};

/// Per-content character cap; content beyond this is truncated before
/// hashing.
pub const ARTIFACT_CONTENT_CAP: usize = 200_000;

/// Registry-wide caps that drive oldest-first eviction.
pub const ARTIFACT_REGISTRY_MAX_COUNT: usize = 200;
pub const ARTIFACT_REGISTRY_MAX_CHARS: usize = 10_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: String,
    pub package_id: String,
    pub model_id: String,
    pub content: String,
    pub hash: String,
    pub created_at_iso: String,
    pub content_length: usize,
    pub is_evicted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactExcerpt {
    pub head: String,
    pub tail: String,
    pub total_length: usize,
    pub is_evicted: bool,
}
