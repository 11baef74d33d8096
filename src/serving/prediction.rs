// Prediction request handling

use crate::artifact::ArtifactDetails;
use crate::error::{Result, ServeError};
use crate::model::ModelState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::error;

/// Validated feature vector, ordered by the configured feature names.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    values: Vec<f64>,
}

impl PredictionRequest {
    /// Parse a raw JSON body.
    pub fn from_json(body: &[u8], feature_names: &[String]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ServeError::Validation(format!("request body is not valid JSON: {}", e)))?;

        match value {
            Value::Object(fields) => Self::from_fields(&fields, feature_names),
            _ => Err(ServeError::Validation(format!(
                "request body must be an object with fields: {}",
                feature_names.join(", ")
            ))),
        }
    }

    /// Build from a JSON object holding exactly the named numeric fields.
    pub fn from_fields(fields: &Map<String, Value>, feature_names: &[String]) -> Result<Self> {
        let missing: Vec<&str> = feature_names
            .iter()
            .filter(|name| !fields.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ServeError::Validation(format!(
                "missing field(s): {}",
                missing.join(", ")
            )));
        }

        let mut unexpected: Vec<&str> = fields
            .keys()
            .filter(|key| !feature_names.contains(key))
            .map(String::as_str)
            .collect();
        if !unexpected.is_empty() {
            unexpected.sort_unstable();
            return Err(ServeError::Validation(format!(
                "unexpected field(s): {}",
                unexpected.join(", ")
            )));
        }

        let values = feature_names
            .iter()
            .map(|name| {
                fields
                    .get(name)
                    .and_then(Value::as_f64)
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| ServeError::Validation(format!("field '{}' must be a number", name)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { values })
    }

    /// Build directly from ordered values.
    pub fn from_values(values: Vec<f64>, feature_names: &[String]) -> Result<Self> {
        if values.len() != feature_names.len() {
            return Err(ServeError::Validation(format!(
                "expected {} features, got {}",
                feature_names.len(),
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ServeError::Validation("feature values must be finite".into()));
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Training metrics echoed with each prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub accuracy: Option<f64>,
    pub f1_score: Option<f64>,
    pub cv_mean: Option<f64>,
}

impl ModelSummary {
    pub fn from_details(details: &ArtifactDetails) -> Self {
        Self {
            accuracy: details.metric("test_accuracy"),
            f1_score: details.metric("test_f1"),
            cv_mean: details.metric("cv_mean"),
        }
    }
}

/// Prediction result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predicted_class: String,
    pub predicted_index: usize,
    /// Label to probability, when the predictor supports estimates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<BTreeMap<String, f64>>,
    pub model_info: ModelSummary,
}

/// Run one prediction against a state snapshot.
///
/// The request is already validated; a degraded state yields
/// [`ServeError::ModelUnavailable`].
pub fn predict(request: &PredictionRequest, state: &ModelState) -> Result<PredictionResponse> {
    let model = state.ready()?;

    let prediction = model.predictor.predict(request.values()).map_err(|e| {
        error!(error = %e, "Predictor failed");
        e
    })?;

    let predicted_class = model.class_labels.get(prediction.index).cloned().ok_or_else(|| {
        error!(index = prediction.index, labels = model.class_labels.len(), "Predicted index has no label");
        ServeError::Internal(format!("predicted class index {} has no label", prediction.index))
    })?;

    let probabilities = match prediction.probabilities {
        Some(probs) if probs.len() > model.class_labels.len() => {
            return Err(ServeError::Internal(format!(
                "predictor returned {} probabilities for {} labels",
                probs.len(),
                model.class_labels.len()
            )));
        }
        Some(probs) => Some(
            model
                .class_labels
                .iter()
                .cloned()
                .zip(probs)
                .collect::<BTreeMap<_, _>>(),
        ),
        None => None,
    };

    Ok(PredictionResponse {
        predicted_class,
        predicted_index: prediction.index,
        probabilities,
        model_info: ModelSummary::from_details(&model.artifact),
    })
}
