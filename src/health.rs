//! Health reporting for the inference service.
//!
//! The health endpoint always answers 200: a degraded model is reported in
//! the body so operators can see why the service cannot predict.

use crate::model::{ModelState, ModelStatus};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Metadata key holding the held-out accuracy recorded at training time.
pub const ACCURACY_KEY: &str = "test_accuracy";

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Model availability.
    pub status: ModelStatus,
    /// Whether a predictor is loaded.
    pub model: bool,
    /// Load error while degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Accuracy from artifact metadata, when recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_accuracy: Option<f64>,
    /// Service version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Timestamp.
    pub timestamp: String,
}

/// Builds health responses from the current model snapshot.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    version: String,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            start_time: Instant::now(),
        }
    }

    /// Service version reported in responses.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Report on the given state.
    pub fn check(&self, state: &ModelState) -> HealthResponse {
        let model_accuracy = match state {
            ModelState::Ready(model) => model.artifact.metric(ACCURACY_KEY),
            ModelState::Degraded(_) => None,
        };

        HealthResponse {
            status: state.status(),
            model: state.is_ready(),
            error: state.error().map(str::to_string),
            model_accuracy,
            version: self.version.clone(),
            uptime_seconds: self.uptime().as_secs(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Time since the checker was created.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
