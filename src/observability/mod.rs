//! Observability for the inference service.
//!
//! Provides logging and Prometheus metrics.

use crate::config::ObservabilityConfig;
use crate::error::{Result, ServeError};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| ServeError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| ServeError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!("Observability initialized");
    Ok(())
}

/// Install the Prometheus recorder and return a handle for rendering.
pub fn install_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServeError::Internal(format!("Failed to install metrics recorder: {}", e)))?;

    register_metrics();
    Ok(handle)
}

/// Register standard metrics.
fn register_metrics() {
    gauge!("iris_model_ready").set(0.0);
    counter!("iris_model_loads_total", "outcome" => "ready").absolute(0);
    counter!("iris_model_loads_total", "outcome" => "degraded").absolute(0);
    counter!("iris_predictions_total", "outcome" => "ok").absolute(0);
}

/// Record the outcome of a model load.
pub fn record_model_load(ready: bool) {
    let outcome = if ready { "ready" } else { "degraded" };
    counter!("iris_model_loads_total", "outcome" => outcome).increment(1);
    gauge!("iris_model_ready").set(if ready { 1.0 } else { 0.0 });
}

/// Record a prediction request outcome.
pub fn record_prediction(outcome: &'static str) {
    counter!("iris_predictions_total", "outcome" => outcome).increment(1);
}
