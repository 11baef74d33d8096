//! The artifact store seam.

use super::ArtifactRef;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Descriptive details of a fetched artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactDetails {
    /// Artifact name, e.g. `iris-logreg-model:v3`.
    pub name: String,
    /// Version tag, e.g. `v3`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Artifact type as recorded by the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Free-form metadata attached at training time (metrics, class names).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ArtifactDetails {
    /// Numeric metadata value, if present.
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(|v| v.as_f64())
    }

    /// String list metadata value, if present and well-formed.
    pub fn string_list(&self, key: &str) -> Option<Vec<String>> {
        let items = self.metadata.get(key)?.as_array()?;
        items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

/// An artifact materialized on local disk.
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    /// Directory the artifact was downloaded into.
    pub local_dir: PathBuf,
    /// Files belonging to the artifact.
    pub files: Vec<PathBuf>,
    pub details: ArtifactDetails,
}

/// A remote store that can materialize an artifact by identifier.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Download the artifact into `cache_dir` and describe it.
    async fn fetch(&self, reference: &ArtifactRef, cache_dir: &Path) -> Result<FetchedArtifact>;
}
