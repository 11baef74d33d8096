//! Sanity and performance checks on a loaded model.

use super::state::LoadedModel;
use crate::artifact::ArtifactDetails;
use serde::Serialize;

/// Accuracy at or above which the model is rated excellent.
const EXCELLENT_ACCURACY: f64 = 0.9;
/// Accuracy below which a warning is raised.
const GOOD_ACCURACY: f64 = 0.8;
/// Cross-validation standard deviation considered stable.
const MAX_CV_STD: f64 = 0.05;
/// Train/test accuracy gap tolerated before flagging overfitting.
const MAX_TRAIN_TEST_GAP: f64 = 0.1;

const PERFORMANCE_KEYS: [&str; 4] = ["test_accuracy", "test_f1", "cv_mean", "cv_std"];

/// Result of checking that the predictor accepts the configured input shape.
#[derive(Debug, Clone, Serialize)]
pub struct SanityCheck {
    pub expected_features: usize,
    pub predictor_features: usize,
    pub accepts_feature_count: bool,
    pub dummy_inference_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dummy_prediction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run one inference on an all-zero vector of the configured width.
pub fn sanity_check(model: &LoadedModel) -> SanityCheck {
    let expected = model.feature_names.len();
    let actual = model.predictor.n_features();

    let (dummy_inference_ok, dummy_prediction, error) = match model.predictor.predict(&vec![0.0; expected]) {
        Ok(prediction) => match model.class_labels.get(prediction.index) {
            Some(label) => (true, Some(label.clone()), None),
            None => (
                false,
                None,
                Some(format!("class index {} has no label", prediction.index)),
            ),
        },
        Err(e) => (false, None, Some(e.to_string())),
    };

    SanityCheck {
        expected_features: expected,
        predictor_features: actual,
        accepts_feature_count: expected == actual,
        dummy_inference_ok,
        dummy_prediction,
        error,
    }
}

/// Verdict derived from training metrics recorded in artifact metadata.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceValidation {
    pub model_loaded: bool,
    pub performance_metrics_available: bool,
    pub validation_passed: bool,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Rate the model from its recorded metrics.
pub fn validate_performance(details: &ArtifactDetails) -> PerformanceValidation {
    let mut result = PerformanceValidation {
        model_loaded: true,
        ..Default::default()
    };

    if details.metadata.is_empty() {
        result
            .warnings
            .push("No metadata available for model validation".to_string());
        return result;
    }

    if !PERFORMANCE_KEYS.iter().any(|k| details.metadata.contains_key(*k)) {
        return result;
    }
    result.performance_metrics_available = true;

    if let Some(accuracy) = details.metric("test_accuracy") {
        if accuracy >= EXCELLENT_ACCURACY {
            result
                .recommendations
                .push("Model accuracy is excellent (>=90%)".to_string());
        } else if accuracy >= GOOD_ACCURACY {
            result
                .recommendations
                .push("Model accuracy is good (>=80%)".to_string());
        } else {
            result
                .warnings
                .push(format!("Model accuracy is below 80%: {:.2}%", accuracy * 100.0));
        }
    }

    if let Some(cv_std) = details.metric("cv_std") {
        if cv_std <= MAX_CV_STD {
            result
                .recommendations
                .push("Model shows good stability (low CV variance)".to_string());
        } else {
            result
                .warnings
                .push(format!("Model shows high variance: {:.3}", cv_std));
        }
    }

    if let (Some(train), Some(test)) = (details.metric("train_accuracy"), details.metric("test_accuracy")) {
        let gap = (train - test).abs();
        if gap <= MAX_TRAIN_TEST_GAP {
            result
                .recommendations
                .push("No significant overfitting detected".to_string());
        } else {
            result
                .warnings
                .push(format!("Potential overfitting: train-test gap = {:.3}", gap));
        }
    }

    result.validation_passed = result.warnings.is_empty();
    result
}
