//! Error types for the iris inference service.
//!
//! This module provides a unified error type [`ServeError`] for all service
//! operations, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Configuration**: the artifact identifier cannot be built or parsed
//! - **Artifact fetch**: network, authentication or missing-artifact failures
//! - **Validation**: a malformed prediction request
//! - **Model unavailable**: a prediction attempted while the model is degraded
//! - **Internal**: an unexpected predictor failure
//!
//! Startup errors never escape the loader; they are folded into the degraded
//! model state. Per-request errors are mapped to HTTP responses through the
//! [`IntoResponse`] implementation below.
//!
//! # Example
//!
//! ```rust
//! use iris_serve::error::{Result, ServeError};
//!
//! fn require_project(project: &str) -> Result<&str> {
//!     if project.is_empty() {
//!         return Err(ServeError::Configuration("WANDB_PROJECT is required".into()));
//!     }
//!     Ok(project)
//! }
//!
//! assert!(require_project("").is_err());
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::io;
use thiserror::Error;

/// Main error type for service operations.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Could not fetch artifact {reference}: {reason}")]
    ArtifactFetch { reference: String, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Model not ready: {0}")]
    ModelUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ServeError {
    /// Build an artifact fetch error for the given reference.
    pub fn fetch(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        ServeError::ArtifactFetch {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable.
    ///
    /// Only transport-level failures qualify. Authentication and missing
    /// artifacts will not fix themselves on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServeError::Timeout(_) | ServeError::Network(_))
    }

    /// HTTP status code for this error at the request boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServeError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServeError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for ServeError {
    fn from(e: serde_json::Error) -> Self {
        ServeError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for ServeError {
    fn from(e: reqwest::Error) -> Self {
        ServeError::Network(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
        }
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, ServeError>;
