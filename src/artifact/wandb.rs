//! Weights & Biases artifact store client.
//!
//! Looks artifacts up through the public GraphQL API and downloads their
//! files through the signed URLs it returns.

use super::store::{ArtifactDetails, ArtifactStore, FetchedArtifact};
use super::ArtifactRef;
use crate::error::{Result, ServeError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Default connection timeout for store requests.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of files listed per artifact.
const MAX_FILES: u32 = 100;

/// Default cap on the size of a single downloaded file (256 MiB).
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 256 * 1024 * 1024;

const ARTIFACT_QUERY: &str = r#"
query ArtifactByName($entityName: String!, $projectName: String!, $name: String!, $first: Int!) {
  project(name: $projectName, entityName: $entityName) {
    artifact(name: $name) {
      id
      versionIndex
      description
      createdAt
      updatedAt
      metadata
      artifactType { name }
      files(first: $first) {
        edges { node { name directUrl sizeBytes } }
      }
    }
  }
}
"#;

const VIEWER_QUERY: &str = "query Viewer { viewer { entity } }";

/// Client for the W&B artifact store.
#[derive(Clone)]
pub struct WandbClient {
    base_url: String,
    api_key: Option<String>,
    max_download_bytes: u64,
    client: Client,
}

impl WandbClient {
    /// Create a client. `request_timeout` bounds each individual HTTP call.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            client,
        }
    }

    /// Override the per-file download size limit.
    pub fn with_max_download_bytes(mut self, limit: u64) -> Self {
        self.max_download_bytes = limit;
        self
    }

    fn api_key(&self, reference: &str) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ServeError::fetch(reference, "WANDB_API_KEY is not set"))
    }

    async fn graphql<T: DeserializeOwned>(&self, reference: &str, query: &str, variables: Value) -> Result<T> {
        let api_key = self.api_key(reference)?;
        let url = format!("{}/graphql", self.base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth("api", Some(api_key))
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ServeError::fetch(
                reference,
                format!("authentication failed (HTTP {}); check WANDB_API_KEY", status.as_u16()),
            ));
        }
        if status.is_server_error() {
            return Err(ServeError::Network(format!("artifact store returned HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(ServeError::fetch(reference, format!("artifact store returned HTTP {}", status.as_u16())));
        }

        let body: GraphqlResponse<T> = response
            .json()
            .await
            .map_err(|e| ServeError::fetch(reference, format!("malformed response: {}", e)))?;

        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(ServeError::fetch(reference, messages.join("; ")));
        }

        body.data
            .ok_or_else(|| ServeError::fetch(reference, "response carried no data"))
    }

    /// Entity owning the API key, used when none is configured.
    async fn default_entity(&self, reference: &str) -> Result<String> {
        let data: ViewerData = self.graphql(reference, VIEWER_QUERY, json!({})).await?;
        data.viewer
            .and_then(|v| v.entity)
            .ok_or_else(|| ServeError::fetch(reference, "could not determine default entity for API key"))
    }

    async fn lookup(&self, reference: &ArtifactRef) -> Result<ArtifactNode> {
        let artifact_id = reference.to_string();
        let entity = match &reference.entity {
            Some(entity) => entity.clone(),
            None => self.default_entity(&artifact_id).await?,
        };

        let variables = json!({
            "entityName": entity,
            "projectName": reference.project,
            "name": reference.qualified_name(),
            "first": MAX_FILES,
        });

        let data: ArtifactData = self.graphql(&artifact_id, ARTIFACT_QUERY, variables).await?;
        let project = data
            .project
            .ok_or_else(|| ServeError::fetch(&artifact_id, format!("project '{}/{}' not found", entity, reference.project)))?;

        project.artifact.ok_or_else(|| {
            ServeError::fetch(
                &artifact_id,
                "artifact not found. Check WANDB_ENTITY/WANDB_PROJECT values, or set \
                 WANDB_ARTIFACT to a full path like 'entity/project/artifact:alias'",
            )
        })
    }

    /// Download one file into `dir`. A file already on disk is reused only
    /// when `reuse_cached` is set and its size matches the listing.
    async fn download(&self, reference: &str, file: &FileNode, dir: &Path, reuse_cached: bool) -> Result<PathBuf> {
        // Only the final component is trusted as a file name.
        let file_name = Path::new(&file.name)
            .file_name()
            .ok_or_else(|| ServeError::fetch(reference, format!("invalid file name '{}'", file.name)))?;
        let path = dir.join(file_name);

        if let Some(expected) = file.size_bytes {
            self.check_size(reference, &file.name, expected)?;
            if reuse_cached {
                if let Ok(meta) = tokio::fs::metadata(&path).await {
                    if meta.len() == expected {
                        debug!(file = %path.display(), "Using cached artifact file");
                        return Ok(path);
                    }
                }
            }
        }

        let url = file
            .direct_url
            .as_deref()
            .ok_or_else(|| ServeError::fetch(reference, format!("file '{}' has no download URL", file.name)))?;

        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(ServeError::Network(format!("file download returned HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(ServeError::fetch(
                reference,
                format!("download of '{}' failed with HTTP {}", file.name, status.as_u16()),
            ));
        }
        if let Some(length) = response.content_length() {
            self.check_size(reference, &file.name, length)?;
        }

        // Stream into a partial file so an aborted download never looks cached.
        let partial = dir.join(format!("{}.part", file_name.to_string_lossy()));
        let mut out = tokio::fs::File::create(&partial).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if let Err(e) = self.check_size(reference, &file.name, written) {
                drop(out);
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        drop(out);
        tokio::fs::rename(&partial, &path).await?;

        debug!(file = %path.display(), bytes = written, "Downloaded artifact file");
        Ok(path)
    }

    fn check_size(&self, reference: &str, name: &str, bytes: u64) -> Result<()> {
        if bytes > self.max_download_bytes {
            return Err(ServeError::fetch(
                reference,
                format!("file '{}' exceeds the {} byte download limit", name, self.max_download_bytes),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for WandbClient {
    async fn fetch(&self, reference: &ArtifactRef, cache_dir: &Path) -> Result<FetchedArtifact> {
        let artifact_id = reference.to_string();
        let node = self.lookup(reference).await?;

        let version = node.version_index.map(|v| format!("v{}", v));
        let dir = cache_dir.join(format!(
            "{}-{}",
            reference.name,
            version.as_deref().unwrap_or(&reference.alias)
        ));
        tokio::fs::create_dir_all(&dir).await?;

        // Without a version the directory is keyed by alias, which may move.
        let reuse_cached = version.is_some();
        let mut files = Vec::new();
        for edge in node.files.map(|f| f.edges).unwrap_or_default() {
            files.push(self.download(&artifact_id, &edge.node, &dir, reuse_cached).await?);
        }

        info!(artifact = %artifact_id, files = files.len(), dir = %dir.display(), "Artifact downloaded");

        let details = ArtifactDetails {
            name: match &version {
                Some(v) => format!("{}:{}", reference.name, v),
                None => reference.qualified_name(),
            },
            version,
            artifact_type: node.artifact_type.map(|t| t.name),
            description: node.description,
            created_at: node.created_at,
            updated_at: node.updated_at,
            metadata: parse_metadata(node.metadata),
        };

        Ok(FetchedArtifact {
            local_dir: dir,
            files,
            details,
        })
    }
}

/// Artifact metadata arrives either as an object or as a JSON-encoded string.
fn parse_metadata(raw: Option<Value>) -> serde_json::Map<String, Value> {
    match raw {
        Some(Value::Object(map)) => map,
        Some(Value::String(s)) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        },
        _ => serde_json::Map::new(),
    }
}

// GraphQL wire types

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct ViewerData {
    viewer: Option<Viewer>,
}

#[derive(Deserialize)]
struct Viewer {
    entity: Option<String>,
}

#[derive(Deserialize)]
struct ArtifactData {
    project: Option<ProjectNode>,
}

#[derive(Deserialize)]
struct ProjectNode {
    artifact: Option<ArtifactNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactNode {
    version_index: Option<u32>,
    description: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
    metadata: Option<Value>,
    artifact_type: Option<ArtifactTypeNode>,
    files: Option<FileConnection>,
}

#[derive(Deserialize)]
struct ArtifactTypeNode {
    name: String,
}

#[derive(Deserialize)]
struct FileConnection {
    edges: Vec<FileEdge>,
}

#[derive(Deserialize)]
struct FileEdge {
    node: FileNode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileNode {
    name: String,
    direct_url: Option<String>,
    size_bytes: Option<u64>,
}
