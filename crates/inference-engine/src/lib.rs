//! Anomaly Scoring Engine
//!
//! Scores spectral feature vectors against a pretrained model. The scoring
//! capability is selected once when the model is loaded.

mod model;
mod scorer;

pub use model::{
    DecisionModel, GaussianOutlierModel, LinearDecisionModel, ModelArtifact, OutlierModel,
};
pub use scorer::{AnomalyScore, AnomalyScorer, ScoringStrategy};

use thiserror::Error;

/// Errors during model loading or scoring
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Model returned a non-finite score: {0}")]
    NonFiniteScore(f64),
}
