//! Prometheus metrics rendered through `GET /metrics`.
//!
//! The recorder is process-global, so this binary holds a single test.

mod common;

use common::*;
use iris_serve::observability;
use std::sync::Arc;

#[tokio::test]
async fn test_metrics_record_loads_and_predictions() {
    let handle = observability::install_metrics().expect("recorder installs once per process");
    let server = TestServer::start_with_metrics(Arc::new(MemoryStore::with_model()), handle).await;

    let (status, _) = server.post("/predict", &request_body(SETOSA)).await;
    assert_eq!(status, 200);
    let (status, _) = server.post("/predict", &request_body(VIRGINICA)).await;
    assert_eq!(status, 200);
    let (status, _) = server
        .post("/predict", &serde_json::json!({"sepal_length": 5.1}))
        .await;
    assert_eq!(status, 422);

    let response = server.client.get(server.url("/metrics")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    let text = response.text().await.unwrap();

    assert!(text.contains("iris_predictions_total{outcome=\"ok\"} 2"), "{}", text);
    assert!(text.contains("iris_predictions_total{outcome=\"invalid\"} 1"), "{}", text);
    assert!(text.contains("iris_model_loads_total{outcome=\"ready\"} 1"), "{}", text);
    assert!(text.contains("iris_model_ready 1"), "{}", text);

    server.shutdown().await;
}
