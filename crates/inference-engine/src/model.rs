//! Scoring Model Artifacts
//!
//! A model file is JSON with one optional section per capability:
//!
//! ```json
//! {
//!   "name": "pump-7 isolation baseline",
//!   "outlier_probability": {"mean": [50.0, 0.12], "scale": [4.0, 0.03]},
//!   "decision_function": {"weights": [0.01, -2.5], "intercept": 0.4}
//! }
//! ```

use crate::InferenceError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Models that estimate the probability that a feature vector is an outlier
pub trait OutlierModel: Send + Sync {
    /// Outlier probability in `[0, 1]`
    fn outlier_probability(&self, features: &[f64]) -> Result<f64, InferenceError>;
}

/// Models that report a signed distance to a decision boundary
pub trait DecisionModel: Send + Sync {
    /// Signed distance; positive is the inlier side
    fn decision_distance(&self, features: &[f64]) -> Result<f64, InferenceError>;
}

/// Deserialized model file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelArtifact {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub outlier_probability: Option<GaussianOutlierModel>,
    #[serde(default)]
    pub decision_function: Option<LinearDecisionModel>,
}

impl ModelArtifact {
    /// Read and validate a model file
    pub fn from_path(path: &Path) -> Result<Self, InferenceError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            InferenceError::ModelLoadError(format!("{}: {}", path.display(), e))
        })?;
        let artifact = Self::from_json(&raw)?;
        info!(
            "Loaded scoring model {} from {}",
            artifact.name.as_deref().unwrap_or("<unnamed>"),
            path.display()
        );
        Ok(artifact)
    }

    /// Parse and validate a model from JSON text
    pub fn from_json(raw: &str) -> Result<Self, InferenceError> {
        let artifact: Self = serde_json::from_str(raw)
            .map_err(|e| InferenceError::ModelLoadError(e.to_string()))?;

        if let Some(model) = &artifact.outlier_probability {
            model.validate()?;
        }
        if let Some(model) = &artifact.decision_function {
            model.validate()?;
        }
        Ok(artifact)
    }
}

/// Diagonal gaussian baseline.
///
/// The squared standardized distance `d²` is mapped through the chi-square
/// CDF with two degrees of freedom, `1 - exp(-d²/2)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianOutlierModel {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl GaussianOutlierModel {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, InferenceError> {
        let model = Self { mean, scale };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), InferenceError> {
        if self.mean.is_empty() || self.mean.len() != self.scale.len() {
            return Err(InferenceError::ModelLoadError(format!(
                "outlier_probability needs equal, non-empty mean/scale (got {} and {})",
                self.mean.len(),
                self.scale.len()
            )));
        }
        if self.mean.iter().any(|m| !m.is_finite())
            || self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0)
        {
            return Err(InferenceError::ModelLoadError(
                "outlier_probability mean must be finite and scale positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl OutlierModel for GaussianOutlierModel {
    fn outlier_probability(&self, features: &[f64]) -> Result<f64, InferenceError> {
        check_shape(self.mean.len(), features.len())?;

        let d2: f64 = features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| {
                let z = (x - m) / s;
                z * z
            })
            .sum();

        Ok(1.0 - (-d2 / 2.0).exp())
    }
}

/// Linear decision function `w·x + b`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearDecisionModel {
    pub weights: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

impl LinearDecisionModel {
    pub fn new(weights: Vec<f64>, intercept: f64) -> Result<Self, InferenceError> {
        let model = Self { weights, intercept };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), InferenceError> {
        if self.weights.is_empty()
            || self.weights.iter().any(|w| !w.is_finite())
            || !self.intercept.is_finite()
        {
            return Err(InferenceError::ModelLoadError(
                "decision_function needs finite, non-empty weights".to_string(),
            ));
        }
        Ok(())
    }
}

impl DecisionModel for LinearDecisionModel {
    fn decision_distance(&self, features: &[f64]) -> Result<f64, InferenceError> {
        check_shape(self.weights.len(), features.len())?;
        Ok(features
            .iter()
            .zip(&self.weights)
            .map(|(x, w)| x * w)
            .sum::<f64>()
            + self.intercept)
    }
}

/// Feature count must match the trained dimension
fn check_shape(expected: usize, actual: usize) -> Result<(), InferenceError> {
    if actual == expected {
        Ok(())
    } else {
        Err(InferenceError::InvalidInputShape {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}
