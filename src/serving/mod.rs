//! Prediction handling and the HTTP server.

pub mod http;
pub mod prediction;

pub use http::{router, serve, AppState};
pub use prediction::{predict, ModelSummary, PredictionRequest, PredictionResponse};
