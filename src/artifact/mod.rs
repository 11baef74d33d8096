//! Artifact resolution and retrieval.
//!
//! Turns configuration into a fully-qualified artifact identifier of the form
//! `[entity/]project/artifact_name:alias` and fetches it from the remote store.

pub mod store;
pub mod wandb;

pub use store::{ArtifactDetails, ArtifactStore, FetchedArtifact};
pub use wandb::WandbClient;

use crate::config::ArtifactConfig;
use crate::error::{Result, ServeError};
use std::fmt;
use std::str::FromStr;

/// A parsed artifact identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    /// Account namespace. `None` means the API key's default entity.
    pub entity: Option<String>,
    pub project: String,
    pub name: String,
    pub alias: String,
}

impl ArtifactRef {
    /// The `name:alias` form the store looks artifacts up by.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.name, self.alias)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity {
            Some(entity) => write!(f, "{}/{}/{}:{}", entity, self.project, self.name, self.alias),
            None => write!(f, "{}/{}:{}", self.project, self.name, self.alias),
        }
    }
}

impl FromStr for ArtifactRef {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (path, alias) = match s.rsplit_once(':') {
            Some((path, alias)) if !alias.is_empty() => (path, alias),
            Some((path, _)) => (path, "latest"),
            None => (s, "latest"),
        };

        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let (entity, project, name) = match parts.as_slice() {
            [entity, project, name] => (Some(entity.to_string()), *project, *name),
            [project, name] => (None, *project, *name),
            _ => {
                return Err(ServeError::Configuration(format!(
                    "Invalid artifact reference '{}': expected [entity/]project/name[:alias]",
                    s
                )))
            }
        };

        Ok(Self {
            entity,
            project: project.to_string(),
            name: name.to_string(),
            alias: alias.to_string(),
        })
    }
}

/// Normalize entity/project inputs, correcting common misconfigurations.
///
/// Handles `WANDB_PROJECT` set to `entity/project`, `project/project`, or
/// carrying stray slashes.
pub fn normalize_entity_project(
    entity: Option<&str>,
    project: &str,
) -> Result<(Option<String>, String)> {
    let mut entity = entity
        .map(|e| e.trim().trim_matches('/'))
        .filter(|e| !e.is_empty())
        .map(str::to_string);
    let mut project = project.trim().trim_matches('/').to_string();

    if project.contains('/') {
        let parts: Vec<&str> = project.split('/').filter(|p| !p.is_empty()).collect();
        project = match (parts.as_slice(), entity.as_deref()) {
            ([first, second], _) if first == second => first.to_string(),
            ([first, second], None) => {
                entity = Some(first.to_string());
                second.to_string()
            }
            ([first, second, ..], Some(e)) if *first == e => second.to_string(),
            (parts, _) => parts.last().map(|p| p.to_string()).unwrap_or_default(),
        };
    }

    if project.is_empty() {
        return Err(ServeError::Configuration(
            "WANDB_PROJECT is required and cannot be empty".to_string(),
        ));
    }

    Ok((entity, project))
}

/// Resolve the artifact identifier to fetch.
///
/// An explicit reference wins and is returned verbatim (trimmed). Otherwise
/// the identifier is composed from the normalized entity and project.
pub fn resolve(config: &ArtifactConfig) -> Result<String> {
    if let Some(reference) = config.reference.as_deref().map(str::trim) {
        if !reference.is_empty() {
            return Ok(reference.to_string());
        }
    }

    let (entity, project) = normalize_entity_project(config.entity.as_deref(), &config.project)?;

    let reference = ArtifactRef {
        entity,
        project,
        name: config.name.clone(),
        alias: config.alias.clone(),
    };
    Ok(reference.to_string())
}
