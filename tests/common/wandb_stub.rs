//! Minimal stand-in for the W&B GraphQL API and file host.

use super::{iris_model_json, training_metadata};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

/// API key accepted by the stub.
pub const VALID_API_KEY: &str = "test-key";
/// `Authorization` header value for `api:test-key`.
const VALID_AUTHORIZATION: &str = "Basic YXBpOnRlc3Qta2V5";

pub const STUB_ENTITY: &str = "acme";
pub const STUB_PROJECT: &str = "mlops-capstone";
pub const STUB_ARTIFACT: &str = "iris-logreg-model:latest";
pub const STUB_VERSION: u32 = 3;

#[derive(Clone)]
struct StubState {
    addr: SocketAddr,
    model: Arc<String>,
    versioned: bool,
    downloads: Arc<AtomicUsize>,
    graphql_calls: Arc<AtomicUsize>,
}

/// Running stub server.
pub struct WandbStub {
    pub addr: SocketAddr,
    downloads: Arc<AtomicUsize>,
    graphql_calls: Arc<AtomicUsize>,
}

impl WandbStub {
    pub async fn start() -> Self {
        Self::spawn(true).await
    }

    /// Stub whose artifact listing carries no `versionIndex`.
    pub async fn start_unversioned() -> Self {
        Self::spawn(false).await
    }

    async fn spawn(versioned: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind stub");
        let addr = listener.local_addr().expect("No stub address");

        let downloads = Arc::new(AtomicUsize::new(0));
        let graphql_calls = Arc::new(AtomicUsize::new(0));
        let state = StubState {
            addr,
            model: Arc::new(iris_model_json()),
            versioned,
            downloads: downloads.clone(),
            graphql_calls: graphql_calls.clone(),
        };

        let app = Router::new()
            .route("/graphql", post(graphql))
            .route("/files/:name", get(file))
            .with_state(state);

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            downloads,
            graphql_calls,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn graphql_calls(&self) -> usize {
        self.graphql_calls.load(Ordering::SeqCst)
    }
}

async fn graphql(State(stub): State<StubState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    stub.graphql_calls.fetch_add(1, Ordering::SeqCst);

    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == VALID_AUTHORIZATION)
        .unwrap_or(false);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }

    let query = body["query"].as_str().unwrap_or_default();
    if query.contains("viewer") {
        return Json(json!({"data": {"viewer": {"entity": STUB_ENTITY}}})).into_response();
    }

    let vars = &body["variables"];
    let known = vars["entityName"] == STUB_ENTITY
        && vars["projectName"] == STUB_PROJECT
        && vars["name"] == STUB_ARTIFACT;
    if !known {
        return Json(json!({"data": {"project": {"artifact": null}}})).into_response();
    }

    let metadata = Value::Object(training_metadata()).to_string();
    let version_index = if stub.versioned { json!(STUB_VERSION) } else { Value::Null };
    Json(json!({
        "data": {
            "project": {
                "artifact": {
                    "id": "QXJ0aWZhY3Q6Mw==",
                    "versionIndex": version_index,
                    "description": "Logistic regression trained on iris",
                    "createdAt": "2024-05-01T10:00:00",
                    "updatedAt": "2024-05-01T10:05:00",
                    "metadata": metadata,
                    "artifactType": {"name": "model"},
                    "files": {
                        "edges": [{
                            "node": {
                                "name": "model.json",
                                "directUrl": format!("http://{}/files/model.json", stub.addr),
                                "sizeBytes": stub.model.len()
                            }
                        }]
                    }
                }
            }
        }
    }))
    .into_response()
}

async fn file(State(stub): State<StubState>, Path(name): Path<String>) -> Response {
    if name != "model.json" {
        return StatusCode::NOT_FOUND.into_response();
    }
    stub.downloads.fetch_add(1, Ordering::SeqCst);
    stub.model.as_str().to_string().into_response()
}
