//! Logistic-regression label prediction.
//!
//! Two weight layouts are accepted, matching what common trainers export:
//!
//! * **Multinomial** — one coefficient row and intercept per class;
//!   probabilities are `softmax(W·x + b)`.
//! * **Binary** — exactly two classes but a single row; the row scores the
//!   *second* class, so `p₁ = σ(w·x + b)` and `p₀ = 1 − p₁`.
//!
//! Ties between maximal probabilities resolve to the class listed first.

use crate::model::vectorizer::FeatureVector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Fitted logistic-regression weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Class labels in output order.
    pub classes: Vec<String>,
    /// One row per class (multinomial) or a single row (binary).
    pub coefficients: Vec<Vec<f64>>,
    /// One intercept per coefficient row.
    pub intercepts: Vec<f64>,
}

/// Why a prediction could not be produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictError {
    #[error("feature vector has dimension {found}, classifier expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("classifier produced a non-finite score for class '{class}'")]
    NonFinite { class: String },
}

/// The predicted label and the full probability distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Index into [`LogisticRegression::classes`].
    pub index: usize,
    pub label: String,
    /// Probability of `label`.
    pub confidence: f64,
    /// Per-class probabilities in class order; sums to 1.
    pub probabilities: Vec<f64>,
}

impl LogisticRegression {
    /// Expected feature dimension.
    pub fn n_features(&self) -> usize {
        self.coefficients.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_binary(&self) -> bool {
        self.classes.len() == 2 && self.coefficients.len() == 1
    }

    /// Check the weight shapes. Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.classes.len() < 2 {
            return Err(format!(
                "classifier needs at least 2 classes, found {}",
                self.classes.len()
            ));
        }
        let mut seen = HashSet::new();
        for class in &self.classes {
            if class.trim().is_empty() {
                return Err("classifier has an empty class label".into());
            }
            if !seen.insert(class.as_str()) {
                return Err(format!("class label '{}' appears twice", class));
            }
        }
        let rows = self.coefficients.len();
        if rows != self.classes.len() && !self.is_binary() {
            return Err(format!(
                "classifier has {} classes but {} coefficient rows",
                self.classes.len(),
                rows
            ));
        }
        if self.intercepts.len() != rows {
            return Err(format!(
                "classifier has {} coefficient rows but {} intercepts",
                rows,
                self.intercepts.len()
            ));
        }
        let width = self.n_features();
        if width == 0 {
            return Err("classifier coefficient rows are empty".into());
        }
        if let Some(row) = self.coefficients.iter().position(|r| r.len() != width) {
            return Err(format!(
                "coefficient row {} has {} columns, expected {}",
                row,
                self.coefficients[row].len(),
                width
            ));
        }
        let all_finite = self
            .coefficients
            .iter()
            .flatten()
            .chain(self.intercepts.iter())
            .all(|w| w.is_finite());
        if !all_finite {
            return Err("classifier weights contain NaN or infinity".into());
        }
        Ok(())
    }

    /// Raw linear scores `W·x + b`, one per coefficient row.
    pub fn decision_function(&self, x: &FeatureVector) -> Vec<f64> {
        self.coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| x.dot(row) + b)
            .collect()
    }

    /// Per-class probabilities in class order.
    pub fn predict_proba(&self, x: &FeatureVector) -> Result<Vec<f64>, PredictError> {
        if x.dimension() != self.n_features() {
            return Err(PredictError::DimensionMismatch {
                expected: self.n_features(),
                found: x.dimension(),
            });
        }
        let scores = self.decision_function(x);
        if let Some(bad) = scores.iter().position(|s| !s.is_finite()) {
            return Err(PredictError::NonFinite {
                class: self.classes.get(bad).cloned().unwrap_or_default(),
            });
        }
        if self.is_binary() {
            let p1 = sigmoid(scores[0]);
            Ok(vec![1.0 - p1, p1])
        } else {
            Ok(softmax(&scores))
        }
    }

    /// Most probable class. Exact ties go to the earliest class.
    pub fn predict(&self, x: &FeatureVector) -> Result<Prediction, PredictError> {
        let probabilities = self.predict_proba(x)?;
        let index = argmax_first(&probabilities);
        Ok(Prediction {
            index,
            label: self.classes[index].clone(),
            confidence: probabilities[index],
            probabilities,
        })
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Numerically stable softmax.
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn argmax_first(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
