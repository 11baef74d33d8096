//! HTTP surface of the inference service.

use super::prediction::{self, PredictionRequest, PredictionResponse};
use crate::artifact::ArtifactDetails;
use crate::error::{Result, ServeError};
use crate::health::{HealthChecker, HealthResponse};
use crate::model::{
    sanity_check, validate_performance, ModelHandle, ModelLoader, ModelState, PerformanceValidation,
    SanityCheck,
};
use crate::observability;
use crate::shutdown::ShutdownCoordinator;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    model: ModelHandle,
    loader: Arc<ModelLoader>,
    health: HealthChecker,
    reload_lock: Arc<Mutex<()>>,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(model: ModelHandle, loader: Arc<ModelLoader>, version: impl Into<String>) -> Self {
        Self {
            model,
            loader,
            health: HealthChecker::new(version),
            reload_lock: Arc::new(Mutex::new(())),
            metrics: None,
        }
    }

    /// Expose metrics through `GET /metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Re-run the loader and swap in the result.
    ///
    /// Reloads are serialized; readers keep whatever snapshot they hold.
    pub async fn reload(&self) -> Arc<ModelState> {
        let _guard = self.reload_lock.lock().await;
        info!("Reloading model");

        let next = self.loader.load().await;
        let previous = self.model.replace(next);
        let current = self.model.snapshot();
        info!(
            previous = ?previous.status(),
            current = ?current.status(),
            "Model reload complete"
        );
        current
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/model/info", get(model_info))
        .route("/model/validation", get(model_validation))
        .route("/model/reload", post(reload))
        .route("/predict", post(predict))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

/// Serve until `coordinator` signals shutdown, then drain in-flight requests
/// for at most the coordinator's timeout.
pub async fn serve(listener: TcpListener, state: AppState, coordinator: ShutdownCoordinator) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "Inference server listening");

    let signal = coordinator.clone();
    let server = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { signal.wait_for_shutdown().await });
    let mut handle = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut handle => return flatten(joined),
        _ = coordinator.wait_for_shutdown() => {}
    }

    let drain_timeout = coordinator.timeout();
    match tokio::time::timeout(drain_timeout, &mut handle).await {
        Ok(joined) => flatten(joined),
        Err(_) => {
            warn!(timeout = ?drain_timeout, "Graceful shutdown timed out, aborting open connections");
            handle.abort();
            Ok(())
        }
    }
}

fn flatten(
    joined: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    joined
        .map_err(|e| ServeError::Internal(format!("server task failed: {}", e)))?
        .map_err(|e| ServeError::Network(e.to_string()))
}

// Response types

#[derive(Serialize)]
struct ServiceInfo {
    message: &'static str,
    version: String,
    model_ready: bool,
    endpoints: BTreeMap<&'static str, &'static str>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum ModelInfoResponse {
    Ready {
        source_reference: String,
        loaded_at: DateTime<Utc>,
        model_kind: &'static str,
        feature_names: Vec<String>,
        class_labels: Vec<String>,
        artifact: ArtifactDetails,
    },
    Degraded {
        source_reference: Option<String>,
        attempted_at: DateTime<Utc>,
        error: String,
        feature_names: Vec<String>,
        class_labels: Vec<String>,
    },
}

impl From<&ModelState> for ModelInfoResponse {
    fn from(state: &ModelState) -> Self {
        match state {
            ModelState::Ready(model) => ModelInfoResponse::Ready {
                source_reference: model.source_reference.clone(),
                loaded_at: model.loaded_at,
                model_kind: model.predictor.kind(),
                feature_names: model.feature_names.clone(),
                class_labels: model.class_labels.clone(),
                artifact: model.artifact.clone(),
            },
            ModelState::Degraded(failure) => ModelInfoResponse::Degraded {
                source_reference: failure.source_reference.clone(),
                attempted_at: failure.attempted_at,
                error: failure.error.clone(),
                feature_names: failure.feature_names.clone(),
                class_labels: failure.class_labels.clone(),
            },
        }
    }
}

#[derive(Serialize)]
struct ValidationResponse {
    source_reference: String,
    sanity_check: SanityCheck,
    validation_results: PerformanceValidation,
    model_metadata: serde_json::Map<String, serde_json::Value>,
}

// Handlers

async fn root(State(app): State<AppState>) -> Json<ServiceInfo> {
    let endpoints = BTreeMap::from([
        ("health", "/health"),
        ("model_info", "/model/info"),
        ("model_validation", "/model/validation"),
        ("model_reload", "/model/reload"),
        ("predict", "/predict"),
        ("metrics", "/metrics"),
    ]);

    Json(ServiceInfo {
        message: "Iris Classification API",
        version: app.health.version().to_string(),
        model_ready: app.model.snapshot().is_ready(),
        endpoints,
    })
}

async fn health(State(app): State<AppState>) -> Json<HealthResponse> {
    Json(app.health.check(&app.model.snapshot()))
}

async fn model_info(State(app): State<AppState>) -> Json<ModelInfoResponse> {
    Json(ModelInfoResponse::from(app.model.snapshot().as_ref()))
}

async fn model_validation(State(app): State<AppState>) -> Result<Json<ValidationResponse>> {
    let snapshot = app.model.snapshot();
    let model = snapshot.ready()?;

    Ok(Json(ValidationResponse {
        source_reference: model.source_reference.clone(),
        sanity_check: sanity_check(model),
        validation_results: validate_performance(&model.artifact),
        model_metadata: model.artifact.metadata.clone(),
    }))
}

async fn predict(State(app): State<AppState>, body: Bytes) -> Result<Json<PredictionResponse>> {
    let snapshot = app.model.snapshot();

    let outcome = PredictionRequest::from_json(&body, snapshot.feature_names())
        .and_then(|request| prediction::predict(&request, &snapshot));

    match outcome {
        Ok(response) => {
            observability::record_prediction("ok");
            Ok(Json(response))
        }
        Err(e) => {
            let label = match e {
                ServeError::Validation(_) => "invalid",
                ServeError::ModelUnavailable(_) => "unavailable",
                _ => "error",
            };
            observability::record_prediction(label);
            Err(e)
        }
    }
}

async fn reload(State(app): State<AppState>) -> Json<HealthResponse> {
    let state = app.reload().await;
    Json(app.health.check(&state))
}

async fn render_metrics(State(app): State<AppState>) -> Response {
    match &app.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics are disabled").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::state::tests::{degraded_state, ready_state};
    use serde_json::Value;

    #[test]
    fn test_model_info_ready_shape() {
        let value = serde_json::to_value(ModelInfoResponse::from(&ready_state())).unwrap();
        assert_eq!(value["status"], "ready");
        assert_eq!(value["model_kind"], "logistic_regression");
        assert_eq!(value["class_labels"].as_array().unwrap().len(), 3);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_model_info_degraded_shape() {
        let value = serde_json::to_value(ModelInfoResponse::from(&degraded_state())).unwrap();
        assert_eq!(value["status"], "degraded");
        assert_eq!(value["error"], "invalid API key");
        assert_eq!(value["source_reference"], Value::Null);
        assert!(value["attempted_at"].is_string());
    }
}
