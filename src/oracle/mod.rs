//! Classifier and explanation-oracle contracts
//!
//! The auditor treats both as black boxes:
//! - [`ProbabilisticClassifier`] - an already fitted model producing class probabilities
//! - [`ExplanationOracle`] - ranks every feature's contribution to one prediction
//!
//! [`LimeTabularOracle`] is the bundled oracle: a local surrogate fitted on
//! perturbed neighbours of the explained row.

mod discretize;
mod lime;

pub use discretize::{Discretizer, FeatureBins};
pub use lime::{ExplainTarget, FeatureSelection, LimeSettings, LimeTabularOracle};

use crate::error::Result;
use crate::explanation::InstanceExplanation;
use ndarray::{Array2, ArrayView1};

/// Probability prediction function: `n_rows x n_features` in, `n_rows x n_classes` out
pub type PredictFn<'a> = dyn Fn(&Array2<f64>) -> Result<Array2<f64>> + Sync + 'a;

/// A fitted classifier exposing class probabilities
pub trait ProbabilisticClassifier: Send + Sync {
    /// Predict class probabilities, one row per input row
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Whether the model has been fitted
    fn is_fitted(&self) -> bool {
        true
    }
}

/// Produces a ranked per-feature attribution for one row
pub trait ExplanationOracle: Send + Sync {
    /// Explain `row`, returning `num_features` attributions ordered by importance
    /// for the predicted class, estimated from `num_samples` perturbed samples.
    fn explain(
        &self,
        row: ArrayView1<'_, f64>,
        predict_fn: &PredictFn<'_>,
        num_features: usize,
        num_samples: usize,
    ) -> Result<InstanceExplanation>;
}
