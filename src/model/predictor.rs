//! In-memory predictors deserialized from artifact model files.
//!
//! Model files are JSON documents tagged by `kind`:
//!
//! ```json
//! {
//!   "kind": "logistic_regression",
//!   "multi_class": "multinomial",
//!   "coef": [[-0.42, 0.97, -2.4, -1.0], [0.53, -0.32, -0.2, -0.94], [-0.11, -0.65, 2.6, 1.95]],
//!   "intercept": [9.8, 2.2, -12.0]
//! }
//! ```

use crate::error::{Result, ServeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Raw predictor output.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Predicted class index.
    pub index: usize,
    /// Probabilities indexed by class, when the predictor supports them.
    pub probabilities: Option<Vec<f64>>,
}

/// A loaded model that maps a feature vector to a class.
pub trait Predictor: Send + Sync + fmt::Debug {
    /// Model family name.
    fn kind(&self) -> &'static str;

    /// Number of input features expected.
    fn n_features(&self) -> usize;

    /// Number of output classes.
    fn n_classes(&self) -> usize;

    /// Run inference on a single feature vector.
    fn predict(&self, features: &[f64]) -> Result<Prediction>;
}

/// Multi-class strategy of a logistic regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiClass {
    /// Softmax over all class scores.
    #[default]
    Multinomial,
    /// Independent sigmoids, normalized.
    Ovr,
}

/// Linear classifier with one coefficient row per class.
///
/// A single row is treated as a binary classifier for the positive class,
/// matching how scikit-learn stores two-class models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
    #[serde(default)]
    pub multi_class: MultiClass,
    /// Class index emitted for each output column. Defaults to `0..n`.
    #[serde(default)]
    pub classes: Option<Vec<usize>>,
}

impl LogisticRegression {
    /// Check shapes and values.
    pub fn validate(&self) -> Result<()> {
        let width = self
            .coef
            .first()
            .map(Vec::len)
            .ok_or_else(|| ServeError::Deserialization("coef must have at least one row".into()))?;

        if width == 0 {
            return Err(ServeError::Deserialization("coef rows must not be empty".into()));
        }
        if self.coef.iter().any(|row| row.len() != width) {
            return Err(ServeError::Deserialization("coef rows have inconsistent lengths".into()));
        }
        if self.intercept.len() != self.coef.len() {
            return Err(ServeError::Deserialization(format!(
                "intercept has {} entries, expected {}",
                self.intercept.len(),
                self.coef.len()
            )));
        }
        if self
            .coef
            .iter()
            .flatten()
            .chain(self.intercept.iter())
            .any(|v| !v.is_finite())
        {
            return Err(ServeError::Deserialization("model parameters must be finite".into()));
        }
        if let Some(classes) = &self.classes {
            let mut sorted = classes.clone();
            sorted.sort_unstable();
            if !sorted.iter().copied().eq(0..self.n_classes()) {
                return Err(ServeError::Deserialization(format!(
                    "classes must be a permutation of 0..{}",
                    self.n_classes()
                )));
            }
        }
        Ok(())
    }

    /// Decision values `w·x + b`, all divided by `scale`.
    fn scores(&self, features: &[f64], scale: f64) -> Vec<f64> {
        self.coef
            .iter()
            .zip(&self.intercept)
            .map(|(row, b)| row.iter().zip(features).map(|(w, x)| w * (x / scale)).sum::<f64>() + b / scale)
            .collect()
    }

    /// Column with the largest decision value.
    fn decide(&self, scores: &[f64]) -> Option<usize> {
        match scores {
            [single] if !single.is_nan() => Some(usize::from(*single > 0.0)),
            _ => argmax(scores),
        }
    }

    fn probabilities(&self, scores: &[f64]) -> Vec<f64> {
        if scores.len() == 1 {
            let p = sigmoid(scores[0]);
            return vec![1.0 - p, p];
        }

        match self.multi_class {
            MultiClass::Multinomial => softmax(scores),
            MultiClass::Ovr => {
                let raw: Vec<f64> = scores.iter().map(|&s| sigmoid(s)).collect();
                let total: f64 = raw.iter().sum();
                if total > 0.0 {
                    raw.iter().map(|p| p / total).collect()
                } else {
                    vec![1.0 / raw.len() as f64; raw.len()]
                }
            }
        }
    }
}

impl Predictor for LogisticRegression {
    fn kind(&self) -> &'static str {
        "logistic_regression"
    }

    fn n_features(&self) -> usize {
        self.coef.first().map(Vec::len).unwrap_or(0)
    }

    fn n_classes(&self) -> usize {
        if self.coef.len() == 1 {
            2
        } else {
            self.coef.len()
        }
    }

    fn predict(&self, features: &[f64]) -> Result<Prediction> {
        if features.len() != self.n_features() {
            return Err(ServeError::Internal(format!(
                "predictor expects {} features, got {}",
                self.n_features(),
                features.len()
            )));
        }

        let mut scores = self.scores(features, 1.0);
        let overflowed = scores.iter().any(|s| !s.is_finite());
        if overflowed {
            // A positive scale keeps the ordering of the decision values.
            let scale = features.iter().fold(1.0_f64, |m, x| m.max(x.abs()));
            scores = self.scores(features, scale);
        }
        let column = self
            .decide(&scores)
            .ok_or_else(|| ServeError::Internal("predictor produced no comparable scores".into()))?;

        let by_column = if overflowed {
            let mut one_hot = vec![0.0; self.n_classes()];
            one_hot[column] = 1.0;
            one_hot
        } else {
            self.probabilities(&scores)
        };

        let (index, probabilities) = match &self.classes {
            Some(classes) => {
                let mut by_class = vec![0.0; by_column.len()];
                for (col, p) in by_column.iter().enumerate() {
                    by_class[classes[col]] = *p;
                }
                (classes[column], by_class)
            }
            None => (column, by_column),
        };

        Ok(Prediction {
            index,
            probabilities: Some(probabilities),
        })
    }
}

/// Serialized model file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelFile {
    LogisticRegression(LogisticRegression),
}

impl ModelFile {
    /// Validate and convert into a shareable predictor.
    pub fn into_predictor(self) -> Result<Arc<dyn Predictor>> {
        match self {
            ModelFile::LogisticRegression(model) => {
                model.validate()?;
                Ok(Arc::new(model))
            }
        }
    }
}

/// Deserialize a model file from disk.
pub fn load_model_file(path: &Path) -> Result<Arc<dyn Predictor>> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if matches!(extension, "joblib" | "pkl" | "pickle") {
        return Err(ServeError::Deserialization(format!(
            "'{}' is a pickle-based model; export the model as JSON",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let file: ModelFile = serde_json::from_str(&content).map_err(|e| {
        ServeError::Deserialization(format!("invalid model file '{}': {}", path.display(), e))
    })?;
    file.into_predictor()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}
