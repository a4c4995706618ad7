//! Anomaly Scorer

use crate::model::{DecisionModel, ModelArtifact, OutlierModel};
use crate::InferenceError;
use feature_engine::FeatureVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Score attached to a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScore {
    /// Score value; neutral `0.0` when not available
    pub value: f64,
    /// Whether `value` came from a model
    pub available: bool,
}

impl AnomalyScore {
    pub fn scored(value: f64) -> Self {
        Self {
            value,
            available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            value: 0.0,
            available: false,
        }
    }

    /// The score, or `None` when the frame was not scored
    pub fn value(&self) -> Option<f64> {
        self.available.then_some(self.value)
    }
}

/// Capability chosen when the model was loaded
pub enum ScoringStrategy {
    /// Probabilistic outlier score in `[0, 1]`
    OutlierProbability(Box<dyn OutlierModel>),
    /// Signed distance to a decision boundary
    DecisionDistance(Box<dyn DecisionModel>),
}

impl ScoringStrategy {
    /// Pick a strategy from a model file, preferring the probabilistic score
    pub fn from_artifact(artifact: ModelArtifact) -> Option<Self> {
        if let Some(model) = artifact.outlier_probability {
            Some(Self::OutlierProbability(Box::new(model)))
        } else {
            artifact
                .decision_function
                .map(|model| Self::DecisionDistance(Box::new(model)))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OutlierProbability(_) => "outlier_probability",
            Self::DecisionDistance(_) => "decision_distance",
        }
    }

    fn evaluate(&self, features: &[f64]) -> Result<f64, InferenceError> {
        match self {
            Self::OutlierProbability(model) => model.outlier_probability(features),
            Self::DecisionDistance(model) => model.decision_distance(features),
        }
    }
}

impl fmt::Debug for ScoringStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScoringStrategy").field(&self.name()).finish()
    }
}

/// Optional anomaly scoring stage
#[derive(Debug, Default)]
pub enum AnomalyScorer {
    /// No model configured
    #[default]
    Disabled,
    /// A model was loaded but exposes no usable capability
    Incapable { model_path: PathBuf },
    /// Scoring with the selected strategy
    Active {
        model_path: Option<PathBuf>,
        strategy: ScoringStrategy,
    },
}

impl AnomalyScorer {
    /// Build the scorer from an optional model path.
    ///
    /// `None` disables scoring; an unreadable or invalid file is an error.
    pub fn load(model_path: Option<&Path>) -> Result<Self, InferenceError> {
        let Some(path) = model_path else {
            info!("No scoring model configured, anomaly scoring disabled");
            return Ok(Self::Disabled);
        };

        let artifact = ModelArtifact::from_path(path)?;
        Ok(Self::from_artifact(path.to_path_buf(), artifact))
    }

    /// Select a strategy for an already-parsed artifact
    pub fn from_artifact(model_path: PathBuf, artifact: ModelArtifact) -> Self {
        match ScoringStrategy::from_artifact(artifact) {
            Some(strategy) => {
                info!(
                    "Anomaly scoring with {} from {}",
                    strategy.name(),
                    model_path.display()
                );
                Self::Active {
                    model_path: Some(model_path),
                    strategy,
                }
            }
            None => {
                warn!(
                    "Model {} exposes neither outlier_probability nor decision_function, frames will not be scored",
                    model_path.display()
                );
                Self::Incapable { model_path }
            }
        }
    }

    /// Wrap an in-memory strategy
    pub fn with_strategy(strategy: ScoringStrategy) -> Self {
        Self::Active {
            model_path: None,
            strategy,
        }
    }

    /// True if frames will actually be scored
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// Score a feature vector. Never fails: model errors, panics and
    /// non-finite outputs all yield [`AnomalyScore::unavailable`].
    pub fn score(&self, features: &FeatureVector) -> AnomalyScore {
        let Self::Active { strategy, .. } = self else {
            return AnomalyScore::unavailable();
        };

        let result = catch_unwind(AssertUnwindSafe(|| strategy.evaluate(features.as_slice())))
            .unwrap_or_else(|_| Err(InferenceError::InferenceFailed("model panicked".to_string())));

        match result {
            Ok(value) if value.is_finite() => AnomalyScore::scored(value),
            Ok(value) => Self::failed(strategy, InferenceError::NonFiniteScore(value)),
            Err(e) => Self::failed(strategy, e),
        }
    }

    fn failed(strategy: &ScoringStrategy, error: InferenceError) -> AnomalyScore {
        warn!("Scoring with {} failed: {}", strategy.name(), error);
        metrics::counter!("vibration_scoring_failures_total").increment(1);
        AnomalyScore::unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GaussianOutlierModel, LinearDecisionModel};
    use std::io::Write;

    struct FailingModel;

    impl OutlierModel for FailingModel {
        fn outlier_probability(&self, _features: &[f64]) -> Result<f64, InferenceError> {
            Err(InferenceError::InferenceFailed("backend unavailable".to_string()))
        }
    }

    struct PanickingModel;

    impl DecisionModel for PanickingModel {
        fn decision_distance(&self, _features: &[f64]) -> Result<f64, InferenceError> {
            panic!("model blew up")
        }
    }

    struct NanModel;

    impl DecisionModel for NanModel {
        fn decision_distance(&self, _features: &[f64]) -> Result<f64, InferenceError> {
            Ok(f64::NAN)
        }
    }

    fn features() -> FeatureVector {
        FeatureVector {
            values: vec![50.0, 0.25],
        }
    }

    #[test]
    fn test_disabled_scorer() {
        let scorer = AnomalyScorer::load(None).unwrap();
        assert!(matches!(scorer, AnomalyScorer::Disabled));
        assert!(!scorer.is_active());
        assert_eq!(scorer.score(&features()).value(), None);
    }

    #[test]
    fn test_prefers_outlier_probability() {
        let artifact = ModelArtifact {
            name: None,
            outlier_probability: Some(GaussianOutlierModel::new(vec![50.0, 0.25], vec![1.0, 1.0]).unwrap()),
            decision_function: Some(LinearDecisionModel::new(vec![1.0, 1.0], 0.0).unwrap()),
        };
        let scorer = AnomalyScorer::from_artifact("m.json".into(), artifact);

        match &scorer {
            AnomalyScorer::Active { strategy, .. } => {
                assert_eq!(strategy.name(), "outlier_probability")
            }
            other => panic!("unexpected scorer {other:?}"),
        }
        assert_eq!(scorer.score(&features()), AnomalyScore::scored(0.0));
    }

    #[test]
    fn test_decision_distance_fallback() {
        let artifact = ModelArtifact {
            decision_function: Some(LinearDecisionModel::new(vec![0.0, 4.0], 1.0).unwrap()),
            ..Default::default()
        };
        let scorer = AnomalyScorer::from_artifact("m.json".into(), artifact);
        assert_eq!(scorer.score(&features()).value(), Some(2.0));
    }

    #[test]
    fn test_incapable_model() {
        let scorer = AnomalyScorer::from_artifact("empty.json".into(), ModelArtifact::default());
        assert!(matches!(scorer, AnomalyScorer::Incapable { .. }));
        assert!(!scorer.score(&features()).available);
    }

    #[test]
    fn test_failures_become_unavailable() {
        let failing = AnomalyScorer::with_strategy(ScoringStrategy::OutlierProbability(Box::new(FailingModel)));
        assert_eq!(failing.score(&features()), AnomalyScore::unavailable());

        let panicking = AnomalyScorer::with_strategy(ScoringStrategy::DecisionDistance(Box::new(PanickingModel)));
        assert_eq!(panicking.score(&features()), AnomalyScore::unavailable());

        let nan = AnomalyScorer::with_strategy(ScoringStrategy::DecisionDistance(Box::new(NanModel)));
        assert_eq!(nan.score(&features()), AnomalyScore::unavailable());
    }

    #[test]
    fn test_shape_mismatch_is_unavailable() {
        let scorer = AnomalyScorer::with_strategy(ScoringStrategy::DecisionDistance(Box::new(
            LinearDecisionModel::new(vec![1.0, 1.0, 1.0], 0.0).unwrap(),
        )));
        assert!(!scorer.score(&features()).available);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"name":"baseline","outlier_probability":{{"mean":[50.0,0.25],"scale":[2.0,0.1]}}}}"#
        )
        .unwrap();

        let scorer = AnomalyScorer::load(Some(file.path())).unwrap();
        assert!(scorer.is_active());
    }

    #[test]
    fn test_load_missing_file() {
        let result = AnomalyScorer::load(Some(Path::new("/nonexistent/model.json")));
        assert!(matches!(result, Err(InferenceError::ModelLoadError(_))));
    }
}
