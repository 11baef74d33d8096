//! Process-wide model state.
//!
//! [`ModelState`] is an immutable snapshot: either a ready predictor with its
//! provenance, or the reason loading failed. [`ModelHandle`] holds the current
//! snapshot and swaps it wholesale on reload, so a request that has taken a
//! snapshot never sees a half-updated state.

use super::predictor::Predictor;
use crate::artifact::ArtifactDetails;
use crate::error::{Result, ServeError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Availability of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Ready,
    Degraded,
}

/// A successfully loaded model.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub predictor: Arc<dyn Predictor>,
    pub source_reference: String,
    pub loaded_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub class_labels: Vec<String>,
    pub artifact: ArtifactDetails,
}

/// Why the model is unavailable.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    /// Identifier that was attempted, if resolution succeeded.
    pub source_reference: Option<String>,
    pub attempted_at: DateTime<Utc>,
    pub error: String,
    pub feature_names: Vec<String>,
    pub class_labels: Vec<String>,
}

/// Model state snapshot.
#[derive(Debug, Clone)]
pub enum ModelState {
    Ready(LoadedModel),
    Degraded(LoadFailure),
}

impl ModelState {
    /// Build a degraded state from an error.
    pub fn degraded(
        source_reference: Option<String>,
        error: impl ToString,
        feature_names: Vec<String>,
        class_labels: Vec<String>,
    ) -> Self {
        ModelState::Degraded(LoadFailure {
            source_reference,
            attempted_at: Utc::now(),
            error: error.to_string(),
            feature_names,
            class_labels,
        })
    }

    pub fn status(&self) -> ModelStatus {
        match self {
            ModelState::Ready(_) => ModelStatus::Ready,
            ModelState::Degraded(_) => ModelStatus::Degraded,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ModelState::Ready(_))
    }

    /// The loaded model, or `ModelUnavailable` carrying the load error.
    pub fn ready(&self) -> Result<&LoadedModel> {
        match self {
            ModelState::Ready(model) => Ok(model),
            ModelState::Degraded(failure) => Err(ServeError::ModelUnavailable(failure.error.clone())),
        }
    }

    pub fn feature_names(&self) -> &[String] {
        match self {
            ModelState::Ready(model) => &model.feature_names,
            ModelState::Degraded(failure) => &failure.feature_names,
        }
    }

    pub fn class_labels(&self) -> &[String] {
        match self {
            ModelState::Ready(model) => &model.class_labels,
            ModelState::Degraded(failure) => &failure.class_labels,
        }
    }

    pub fn source_reference(&self) -> Option<&str> {
        match self {
            ModelState::Ready(model) => Some(&model.source_reference),
            ModelState::Degraded(failure) => failure.source_reference.as_deref(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ModelState::Ready(_) => None,
            ModelState::Degraded(failure) => Some(&failure.error),
        }
    }
}

/// Shared, atomically replaceable handle to the current model state.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    current: Arc<RwLock<Arc<ModelState>>>,
}

impl ModelHandle {
    pub fn new(state: ModelState) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(state))),
        }
    }

    /// Take a snapshot of the current state.
    pub fn snapshot(&self) -> Arc<ModelState> {
        self.current.read().clone()
    }

    /// Replace the state, returning the previous snapshot.
    pub fn replace(&self, state: ModelState) -> Arc<ModelState> {
        let next = Arc::new(state);
        std::mem::replace(&mut *self.current.write(), next)
    }
}
