//! Model loading lifecycle.
//!
//! The loader never fails outright: every error on the way from configuration
//! to predictor is folded into a degraded [`ModelState`], keeping the HTTP
//! surface reachable for diagnosis.

use super::predictor::load_model_file;
use super::state::{LoadedModel, ModelState};
use crate::artifact::{self, ArtifactRef, ArtifactStore, WandbClient};
use crate::config::{ArtifactConfig, ModelConfig, ServeConfig};
use crate::error::{Result, ServeError};
use crate::observability;
use crate::resilience::{with_timeout, RetryConfig, RetryExecutor};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Metadata key carrying class names in training order.
const TARGET_CLASSES_KEY: &str = "target_classes";

/// Fetches and deserializes the configured model artifact.
pub struct ModelLoader {
    store: Arc<dyn ArtifactStore>,
    artifact: ArtifactConfig,
    model: ModelConfig,
}

impl ModelLoader {
    pub fn new(store: Arc<dyn ArtifactStore>, artifact: ArtifactConfig, model: ModelConfig) -> Self {
        Self {
            store,
            artifact,
            model,
        }
    }

    /// Build a loader backed by the W&B store described in `config`.
    pub fn from_config(config: &ServeConfig) -> Self {
        let client = WandbClient::new(
            config.artifact.base_url.clone(),
            config.artifact.api_key.clone(),
            config.artifact.download_timeout,
        );
        Self::new(Arc::new(client), config.artifact.clone(), config.model.clone())
    }

    /// Attempt a full load. Each call re-fetches from the store.
    pub async fn load(&self) -> ModelState {
        let reference = match artifact::resolve(&self.artifact) {
            Ok(reference) => reference,
            Err(e) => {
                warn!(error = %e, "Model artifact could not be resolved");
                observability::record_model_load(false);
                return self.degraded(None, e);
            }
        };

        match self.try_load(&reference).await {
            Ok(model) => {
                info!(
                    artifact = %model.source_reference,
                    version = model.artifact.version.as_deref().unwrap_or("unknown"),
                    classes = model.class_labels.len(),
                    "Model loaded"
                );
                observability::record_model_load(true);
                ModelState::Ready(model)
            }
            Err(e) => {
                warn!(artifact = %reference, error = %e, "Model loading failed");
                observability::record_model_load(false);
                self.degraded(Some(reference), e)
            }
        }
    }

    fn degraded(&self, reference: Option<String>, error: ServeError) -> ModelState {
        ModelState::degraded(
            reference,
            error,
            self.model.feature_names.clone(),
            self.model.class_labels.clone(),
        )
    }

    async fn try_load(&self, reference: &str) -> Result<LoadedModel> {
        let parsed: ArtifactRef = reference.parse()?;
        let cache_dir = self.artifact.cache_dir.as_path();
        let timeout = self.artifact.download_timeout;

        let retry = RetryExecutor::new(RetryConfig::with_attempts(self.artifact.max_attempts));
        let fetched = retry
            .execute(|attempt| {
                info!(artifact = %reference, attempt, "Fetching model artifact");
                with_timeout(timeout, self.store.fetch(&parsed, cache_dir))
            })
            .await?;

        let model_file = select_model_file(&fetched.files)
            .ok_or_else(|| ServeError::fetch(reference, "model file not found in artifact"))?;
        let predictor = load_model_file(&model_file)?;

        let expected = self.model.feature_names.len();
        if predictor.n_features() != expected {
            return Err(ServeError::Deserialization(format!(
                "model expects {} features, service is configured for {}",
                predictor.n_features(),
                expected
            )));
        }

        let class_labels = fetched
            .details
            .string_list(TARGET_CLASSES_KEY)
            .filter(|labels| !labels.is_empty())
            .unwrap_or_else(|| self.model.class_labels.clone());

        if predictor.n_classes() > class_labels.len() {
            return Err(ServeError::Deserialization(format!(
                "model predicts {} classes but only {} labels are known",
                predictor.n_classes(),
                class_labels.len()
            )));
        }

        Ok(LoadedModel {
            predictor,
            source_reference: reference.to_string(),
            loaded_at: Utc::now(),
            feature_names: self.model.feature_names.clone(),
            class_labels,
            artifact: fetched.details,
        })
    }
}

/// Pick the model file out of an artifact's files.
///
/// Preference: a JSON file named like a model, then a pickle-style file
/// (which the predictor loader rejects with a clear error), then any JSON file.
pub fn select_model_file(files: &[PathBuf]) -> Option<PathBuf> {
    let json: Vec<&PathBuf> = files
        .iter()
        .filter(|p| extension(p).as_deref() == Some("json"))
        .collect();
    let pickled = files
        .iter()
        .find(|p| matches!(extension(p).as_deref(), Some("joblib" | "pkl" | "pickle")));

    json.iter()
        .find(|p| named_model(p))
        .copied()
        .or(pickled)
        .or_else(|| json.first().copied())
        .cloned()
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn named_model(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_ascii_lowercase().contains("model"))
        .unwrap_or(false)
}
