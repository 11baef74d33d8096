//! Common test utilities for integration tests.

#![allow(dead_code)]

pub mod wandb_stub;

use async_trait::async_trait;
use iris_serve::artifact::{ArtifactDetails, ArtifactRef, ArtifactStore, FetchedArtifact};
use iris_serve::config::{ArtifactConfig, ModelConfig};
use iris_serve::model::{ModelHandle, ModelLoader};
use iris_serve::serving::{self, AppState};
use iris_serve::shutdown::ShutdownCoordinator;
use iris_serve::ServeError;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub use wandb_stub::*;

/// Test error type
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

/// Classic setosa sample.
pub const SETOSA: [f64; 4] = [5.1, 3.5, 1.4, 0.2];
/// Classic virginica sample.
pub const VIRGINICA: [f64; 4] = [6.9, 3.1, 5.8, 2.3];

/// Multinomial logistic regression fitted on iris, in the served JSON format.
pub fn iris_model_json() -> String {
    json!({
        "kind": "logistic_regression",
        "multi_class": "multinomial",
        "coef": [
            [-0.4233, 0.9674, -2.5172, -1.0794],
            [0.5345, -0.3216, -0.2064, -0.9442],
            [-0.1112, -0.6458, 2.7236, 2.0236]
        ],
        "intercept": [9.8497, 2.2379, -12.0876]
    })
    .to_string()
}

/// Training metrics as recorded alongside the model artifact.
pub fn training_metadata() -> serde_json::Map<String, Value> {
    json!({
        "test_accuracy": 0.9667,
        "train_accuracy": 0.975,
        "test_f1": 0.9666,
        "cv_mean": 0.9583,
        "cv_std": 0.0264,
        "target_classes": ["setosa", "versicolor", "virginica"]
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

/// Prediction request body for a feature vector.
pub fn request_body(values: [f64; 4]) -> Value {
    json!({
        "sepal_length": values[0],
        "sepal_width": values[1],
        "petal_length": values[2],
        "petal_width": values[3],
    })
}

/// In-memory artifact store whose failure mode can be switched at runtime.
pub struct MemoryStore {
    files: Vec<(String, String)>,
    metadata: serde_json::Map<String, Value>,
    failure: Mutex<Option<String>>,
    fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn with_model() -> Self {
        Self {
            files: vec![("model.json".to_string(), iris_model_json())],
            metadata: training_metadata(),
            failure: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        let store = Self::with_model();
        store.fail_with(Some(reason));
        store
    }

    /// Make subsequent fetches fail (non-retryably) or succeed.
    pub fn fail_with(&self, reason: Option<&str>) {
        *self.failure.lock() = reason.map(str::to_string);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn fetch(&self, reference: &ArtifactRef, cache_dir: &Path) -> iris_serve::Result<FetchedArtifact> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.failure.lock().clone() {
            return Err(ServeError::fetch(reference.to_string(), reason));
        }

        let dir = cache_dir.join(format!("{}-v0", reference.name));
        std::fs::create_dir_all(&dir)?;
        let mut files = Vec::new();
        for (name, content) in &self.files {
            let path = dir.join(name);
            std::fs::write(&path, content)?;
            files.push(path);
        }

        Ok(FetchedArtifact {
            local_dir: dir,
            files,
            details: ArtifactDetails {
                name: format!("{}:v0", reference.name),
                version: Some("v0".to_string()),
                artifact_type: Some("model".to_string()),
                metadata: self.metadata.clone(),
                ..Default::default()
            },
        })
    }
}

/// Artifact settings pointing at `acme/mlops-capstone` with a temp cache.
pub fn artifact_config(cache_dir: &Path) -> ArtifactConfig {
    ArtifactConfig {
        api_key: Some(VALID_API_KEY.to_string()),
        entity: Some("acme".to_string()),
        cache_dir: cache_dir.to_path_buf(),
        download_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// A running inference server bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    coordinator: ShutdownCoordinator,
    handle: JoinHandle<iris_serve::Result<()>>,
    _cache: TempDir,
}

impl TestServer {
    /// Load a model through `store` and serve it.
    pub async fn start(store: Arc<dyn ArtifactStore>) -> Self {
        let cache = TempDir::new().expect("Failed to create temp directory");
        let loader = ModelLoader::new(store, artifact_config(cache.path()), ModelConfig::default());
        Self::start_with_loader(loader, cache).await
    }

    pub async fn start_with_loader(loader: ModelLoader, cache: TempDir) -> Self {
        Self::launch(loader, cache, None).await
    }

    /// Like [`TestServer::start`], with `/metrics` rendering through `handle`.
    pub async fn start_with_metrics(store: Arc<dyn ArtifactStore>, handle: PrometheusHandle) -> Self {
        let cache = TempDir::new().expect("Failed to create temp directory");
        let loader = ModelLoader::new(store, artifact_config(cache.path()), ModelConfig::default());
        Self::launch(loader, cache, Some(handle)).await
    }

    async fn launch(loader: ModelLoader, cache: TempDir, metrics: Option<PrometheusHandle>) -> Self {
        let loader = Arc::new(loader);
        let model = ModelHandle::new(loader.load().await);
        let mut state = AppState::new(model, loader, "test");
        if let Some(handle) = metrics {
            state = state.with_metrics(handle);
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let addr = listener.local_addr().expect("No local address");
        let coordinator = ShutdownCoordinator::with_timeout(Duration::from_secs(2));

        let handle = tokio::spawn(serving::serve(listener, state, coordinator.clone()));

        Self {
            addr,
            client: reqwest::Client::new(),
            coordinator,
            handle,
            _cache: cache,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> (u16, Value) {
        let response = self.client.get(self.url(path)).send().await.expect("request failed");
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    pub async fn post(&self, path: &str, body: &Value) -> (u16, Value) {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("request failed");
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    /// Trigger graceful shutdown and wait for the server task.
    pub async fn shutdown(self) {
        self.coordinator.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked");
        assert!(result.is_ok(), "server returned error: {:?}", result.err());
    }
}
