//! In-memory artifact registry.
//!
//! One registry instance lives per run session. Content is hashed and
//! size-capped on `create`; once the registry-wide caps are exceeded,
//! the oldest non-evicted entries have their content cleared (metadata
//! always survives).

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use contracts::{
    Artifact, ArtifactExcerpt, ARTIFACT_CONTENT_CAP, ARTIFACT_REGISTRY_MAX_CHARS,
    ARTIFACT_REGISTRY_MAX_COUNT,
};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("no artifact found for package {package_id}")]
    NotFound { package_id: String },
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<String, Artifact>,
    /// Most-recent artifact id per package, so `getByPackageId` is O(1).
    latest_by_package: HashMap<String, String>,
    /// Insertion order, oldest first, for eviction.
    order: VecDeque<String>,
    total_chars: usize,
}

pub struct ArtifactRegistry {
    inner: RwLock<Inner>,
}

impl Default for ArtifactRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ExcerptLimits {
    pub head_limit: usize,
    pub tail_limit: usize,
}

impl Default for ExcerptLimits {
    fn default() -> Self {
        Self {
            head_limit: 8_000,
            tail_limit: 2_000,
        }
    }
}

pub struct CreatedArtifact {
    pub artifact_id: String,
    pub hash: String,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Stores `content` (truncated to [`ARTIFACT_CONTENT_CAP`] before
    /// hashing), runs an eviction pass, and returns the canonical
    /// sha-256 hex digest of the stored content.
    pub fn create(&self, package_id: &str, model_id: &str, content: &str) -> CreatedArtifact {
        let truncated: String = if content.len() > ARTIFACT_CONTENT_CAP {
            content.chars().take(ARTIFACT_CONTENT_CAP).collect()
        } else {
            content.to_string()
        };

        let hash = hex_sha256(&truncated);
        let artifact_id = format!("art-{}", Uuid::new_v4());
        let content_length = truncated.chars().count();

        let artifact = Artifact {
            artifact_id: artifact_id.clone(),
            package_id: package_id.to_string(),
            model_id: model_id.to_string(),
            content: truncated,
            hash: hash.clone(),
            created_at_iso: Utc::now().to_rfc3339(),
            content_length,
            is_evicted: false,
        };

        let mut inner = self.inner.write();
        inner.total_chars += content_length;
        inner.order.push_back(artifact_id.clone());
        inner
            .latest_by_package
            .insert(package_id.to_string(), artifact_id.clone());
        inner.by_id.insert(artifact_id.clone(), artifact);
        evict_if_needed(&mut inner);

        CreatedArtifact { artifact_id, hash }
    }

    pub fn get_by_package_id(&self, package_id: &str) -> Option<Artifact> {
        let inner = self.inner.read();
        let id = inner.latest_by_package.get(package_id)?;
        inner.by_id.get(id).cloned()
    }

    pub fn get_excerpt_by_package_id(
        &self,
        package_id: &str,
        limits: ExcerptLimits,
    ) -> Result<ArtifactExcerpt, ArtifactError> {
        let artifact = self
            .get_by_package_id(package_id)
            .ok_or_else(|| ArtifactError::NotFound {
                package_id: package_id.to_string(),
            })?;

        let combined = limits.head_limit + limits.tail_limit;
        let chars: Vec<char> = artifact.content.chars().collect();

        if chars.len() <= combined {
            return Ok(ArtifactExcerpt {
                head: artifact.content.clone(),
                tail: String::new(),
                total_length: artifact.content_length,
                is_evicted: artifact.is_evicted,
            });
        }

        let head: String = chars[..limits.head_limit].iter().collect();
        let tail: String = chars[chars.len() - limits.tail_limit..].iter().collect();

        Ok(ArtifactExcerpt {
            head,
            tail,
            total_length: artifact.content_length,
            is_evicted: artifact.is_evicted,
        })
    }
}

fn evict_if_needed(inner: &mut Inner) {
    while inner.order.len() > ARTIFACT_REGISTRY_MAX_COUNT
        || inner.total_chars > ARTIFACT_REGISTRY_MAX_CHARS
    {
        let Some(oldest_id) = inner
            .order
            .iter()
            .find(|id| !inner.by_id.get(*id).map(|a| a.is_evicted).unwrap_or(true))
            .cloned()
        else {
            break;
        };

        if let Some(artifact) = inner.by_id.get_mut(&oldest_id) {
            inner.total_chars = inner.total_chars.saturating_sub(artifact.content_length);
            artifact.content.clear();
            artifact.is_evicted = true;
            debug!(artifact_id = %oldest_id, "evicted artifact content, metadata retained");
        }

        // Stop if everything non-evicted has been cleared but the
        // count cap is still exceeded: count eviction only clears
        // content, it does not remove metadata, so re-check count
        // against live (non-cleared) entries instead of looping
        // forever once all content is gone.
        if inner.order.iter().all(|id| {
            inner
                .by_id
                .get(id)
                .map(|a| a.is_evicted)
                .unwrap_or(true)
        }) {
            break;
        }
    }
}

fn hex_sha256(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_returns_canonical_hash() {
        let registry = ArtifactRegistry::new();
        let created = registry.create("pkg-1", "model-a", "hello");
        assert_eq!(created.hash, hex_sha256("hello"));
    }

    #[test]
    fn get_by_package_id_returns_most_recent() {
        let registry = ArtifactRegistry::new();
        registry.create("pkg-1", "model-a", "first");
        let second = registry.create("pkg-1", "model-a", "second");
        let fetched = registry.get_by_package_id("pkg-1").unwrap();
        assert_eq!(fetched.artifact_id, second.artifact_id);
        assert_eq!(fetched.content, "second");
    }

    #[test]
    fn excerpt_returns_whole_content_when_short() {
        let registry = ArtifactRegistry::new();
        registry.create("pkg-1", "model-a", "short content");
        let excerpt = registry
            .get_excerpt_by_package_id("pkg-1", ExcerptLimits::default())
            .unwrap();
        assert_eq!(excerpt.head, "short content");
        assert!(excerpt.tail.is_empty());
    }

    #[test]
    fn excerpt_splits_head_and_tail_for_long_content() {
        let registry = ArtifactRegistry::new();
        let content = "a".repeat(20_000);
        registry.create("pkg-1", "model-a", &content);
        let excerpt = registry
            .get_excerpt_by_package_id(
                "pkg-1",
                ExcerptLimits {
                    head_limit: 100,
                    tail_limit: 50,
                },
            )
            .unwrap();
        assert_eq!(excerpt.head.len(), 100);
        assert_eq!(excerpt.tail.len(), 50);
        assert_eq!(excerpt.total_length, 20_000);
    }

    #[test]
    fn content_beyond_cap_is_truncated_before_hashing() {
        let registry = ArtifactRegistry::new();
        let oversized = "x".repeat(ARTIFACT_CONTENT_CAP + 500);
        let created = registry.create("pkg-1", "model-a", &oversized);
        let stored = registry.get_by_package_id("pkg-1").unwrap();
        assert_eq!(stored.content_length, ARTIFACT_CONTENT_CAP);
        assert_eq!(created.hash, stored.hash);
    }

    #[test]
    fn eviction_clears_content_but_keeps_metadata() {
        let registry = ArtifactRegistry::new();
        // Exceed the count cap; each create is for a distinct package id.
        for i in 0..(ARTIFACT_REGISTRY_MAX_COUNT + 10) {
            registry.create(&format!("pkg-{i}"), "model-a", "some content");
        }

        let first = registry.get_by_package_id("pkg-0").unwrap();
        assert!(first.is_evicted);
        assert!(first.content.is_empty());
        // Metadata survives.
        assert_eq!(first.package_id, "pkg-0");
        assert_eq!(first.model_id, "model-a");

        let last = registry
            .get_by_package_id(&format!("pkg-{}", ARTIFACT_REGISTRY_MAX_COUNT + 9))
            .unwrap();
        assert!(!last.is_evicted);
    }
}
