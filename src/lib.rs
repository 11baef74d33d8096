//! Iris Serve - an HTTP inference service for an iris classifier.
//!
//! At startup the service resolves a model artifact in a Weights & Biases
//! registry, downloads it, and serves predictions over HTTP. If loading fails
//! the process keeps running in a degraded state so the failure can be
//! inspected through the health and model-info endpoints.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Iris Serve                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  HTTP: /health | /model/info | /model/validation | /predict │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Prediction: request validation | availability gate         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Model State: Ready(predictor) | Degraded(error)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Loader: artifact resolution | W&B download | retry         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use iris_serve::config::ServeConfig;
//!
//! #[tokio::main]
//! async fn main() -> iris_serve::Result<()> {
//!     let config = ServeConfig::from_env();
//!     iris_serve::run(config).await
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod health;
pub mod model;
pub mod observability;
pub mod resilience;
pub mod serving;
pub mod shutdown;

// Re-exports
pub use error::{Result, ServeError};

use config::ServeConfig;
use model::{ModelHandle, ModelLoader};
use serving::AppState;
use shutdown::{ShutdownCoordinator, SignalHandler};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Service version reported by the HTTP surface.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the inference service until SIGINT or SIGTERM.
///
/// Only configuration and bind failures are returned as errors; a model that
/// cannot be loaded leaves the service running in a degraded state.
pub async fn run(config: ServeConfig) -> Result<()> {
    observability::init(&config.observability)?;
    config.validate()?;

    info!(version = VERSION, "Starting iris inference service");

    let metrics = if config.observability.metrics_enabled {
        Some(observability::install_metrics()?)
    } else {
        None
    };

    let listener = TcpListener::bind(config.server.bind_addr).await?;

    let loader = Arc::new(ModelLoader::from_config(&config));
    let model = ModelHandle::new(loader.load().await);

    let mut state = AppState::new(model, loader, VERSION);
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }

    let coordinator = ShutdownCoordinator::with_timeout(config.server.shutdown_timeout);
    let signal_coordinator = coordinator.clone();
    tokio::spawn(async move {
        SignalHandler::new(signal_coordinator).run().await;
    });

    serving::serve(listener, state, coordinator).await?;

    info!("Iris inference service stopped");
    Ok(())
}
