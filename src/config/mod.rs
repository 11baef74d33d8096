//! Configuration module for the iris inference service.

use crate::error::{Result, ServeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default artifact base name published by the training pipeline.
pub const DEFAULT_ARTIFACT_NAME: &str = "iris-logreg-model";

/// Default W&B project when `WANDB_PROJECT` is unset.
pub const DEFAULT_PROJECT: &str = "mlops-capstone";

/// Default W&B API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.wandb.ai";

/// Main configuration for the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServeConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Artifact store configuration.
    #[serde(default)]
    pub artifact: ArtifactConfig,
    /// Model shape configuration.
    #[serde(default)]
    pub model: ModelConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl ServeConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServeError::Configuration(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            ServeError::Configuration(format!("Failed to parse config: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::default();
        config.apply_lookup(get);
        config
    }

    /// Overlay environment-style variables onto this configuration.
    pub fn apply_lookup<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = get("IRIS_BIND_ADDR").and_then(|a| a.parse().ok()) {
            self.server.bind_addr = addr;
        }

        let artifact = &mut self.artifact;
        if let Some(key) = get("WANDB_API_KEY") {
            artifact.api_key = Some(key);
        }
        if let Some(entity) = get("WANDB_ENTITY") {
            artifact.entity = Some(entity);
        }
        if let Some(project) = get("WANDB_PROJECT") {
            artifact.project = project;
        }
        if let Some(reference) = get("WANDB_ARTIFACT").or_else(|| get("MODEL_ARTIFACT")) {
            artifact.reference = Some(reference);
        }
        if let Some(alias) = get("MODEL_ALIAS") {
            artifact.alias = alias;
        }
        if let Some(base_url) = get("WANDB_BASE_URL") {
            artifact.base_url = base_url;
        }
        if let Some(dir) = get("MODEL_CACHE_DIR") {
            artifact.cache_dir = PathBuf::from(dir);
        }
    }

    /// Validate configuration.
    ///
    /// Only structural problems are rejected here. A missing API key or
    /// project is a model-loading failure and surfaces as degraded state.
    pub fn validate(&self) -> Result<()> {
        if self.model.feature_names.is_empty() {
            return Err(ServeError::Configuration(
                "model.feature_names must not be empty".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for name in &self.model.feature_names {
            if !seen.insert(name.as_str()) {
                return Err(ServeError::Configuration(format!(
                    "model.feature_names contains duplicate '{}'",
                    name
                )));
            }
        }

        if self.model.class_labels.is_empty() {
            return Err(ServeError::Configuration(
                "model.class_labels must not be empty".to_string(),
            ));
        }

        if self.artifact.max_attempts == 0 {
            return Err(ServeError::Configuration(
                "artifact.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP surface.
    pub bind_addr: SocketAddr,
    /// Grace period for in-flight requests on shutdown.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Artifact store configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// W&B API key. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Account or team namespace.
    #[serde(default)]
    pub entity: Option<String>,
    /// Project name (normalized at resolution time).
    pub project: String,
    /// Full artifact reference overriding composed resolution.
    #[serde(default)]
    pub reference: Option<String>,
    /// Artifact base name.
    pub name: String,
    /// Version alias.
    pub alias: String,
    /// W&B API base URL.
    pub base_url: String,
    /// Local download cache.
    pub cache_dir: PathBuf,
    /// Upper bound on a single fetch attempt.
    #[serde(with = "humantime_serde")]
    pub download_timeout: Duration,
    /// Total fetch attempts (first try plus retries).
    pub max_attempts: u32,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            entity: None,
            project: DEFAULT_PROJECT.to_string(),
            reference: None,
            name: DEFAULT_ARTIFACT_NAME.to_string(),
            alias: "latest".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_dir: PathBuf::from("/tmp/model"),
            download_timeout: Duration::from_secs(60),
            max_attempts: 2,
        }
    }
}

impl fmt::Debug for ArtifactConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("entity", &self.entity)
            .field("project", &self.project)
            .field("reference", &self.reference)
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("base_url", &self.base_url)
            .field("cache_dir", &self.cache_dir)
            .field("download_timeout", &self.download_timeout)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// Expected model shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Request field names, in predictor input order.
    pub feature_names: Vec<String>,
    /// Labels used when the artifact does not publish `target_classes`.
    pub class_labels: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            feature_names: ["sepal_length", "sepal_width", "petal_length", "petal_width"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            class_labels: ["setosa", "versicolor", "virginica"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus `/metrics` route.
    pub metrics_enabled: bool,
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Serde helper for Duration using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(s_val) = s.strip_suffix('s') {
            s_val
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string())
        } else if let Some(m) = s.strip_suffix('m') {
            m.parse::<u64>()
                .map(|v| Duration::from_secs(v * 60))
                .map_err(|e| e.to_string())
        } else {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        }
    }
}
