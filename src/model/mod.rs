//! Model loading, state, and inference.
//!
//! - [`loader`]: fetches the artifact and builds a [`ModelState`]
//! - [`predictor`]: deserialized models behind the [`Predictor`] trait
//! - [`state`]: the immutable state snapshot and its swappable handle
//! - [`validation`]: sanity and performance checks

pub mod loader;
pub mod predictor;
pub mod state;
pub mod validation;

pub use loader::ModelLoader;
pub use predictor::{load_model_file, LogisticRegression, ModelFile, Prediction, Predictor};
pub use state::{LoadFailure, LoadedModel, ModelHandle, ModelState, ModelStatus};
pub use validation::{sanity_check, validate_performance, PerformanceValidation, SanityCheck};
