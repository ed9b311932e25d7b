//! Per-instance explanations returned by an explanation oracle
//!
//! An [`InstanceExplanation`] is the oracle's ranking of every feature for one
//! prediction: position 0 is the most important feature. A well-formed
//! explanation names each feature index in `[0, F)` exactly once.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribution weight of a single feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureAttribution {
    /// Column index in the feature table
    pub feature_index: usize,
    /// Signed attribution weight
    pub weight: f64,
}

impl FeatureAttribution {
    pub fn new(feature_index: usize, weight: f64) -> Self {
        Self { feature_index, weight }
    }

    /// Absolute attribution weight
    pub fn magnitude(&self) -> f64 {
        self.weight.abs()
    }
}

impl From<(usize, f64)> for FeatureAttribution {
    fn from((feature_index, weight): (usize, f64)) -> Self {
        Self { feature_index, weight }
    }
}

/// Reason an explanation is not a full permutation of the feature set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntegrityViolation {
    /// Explanation has the wrong number of entries
    WrongLength { expected: usize, actual: usize },
    /// Feature index outside `[0, F)`
    IndexOutOfRange { feature_index: usize, n_features: usize },
    /// Same feature ranked twice
    DuplicateIndex { feature_index: usize },
    /// NaN or infinite weight
    NonFiniteWeight { feature_index: usize },
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityViolation::WrongLength { expected, actual } => {
                write!(f, "expected {} ranked features, got {}", expected, actual)
            }
            IntegrityViolation::IndexOutOfRange { feature_index, n_features } => {
                write!(f, "feature index {} out of range for {} features", feature_index, n_features)
            }
            IntegrityViolation::DuplicateIndex { feature_index } => {
                write!(f, "feature index {} ranked more than once", feature_index)
            }
            IntegrityViolation::NonFiniteWeight { feature_index } => {
                write!(f, "non-finite weight for feature {}", feature_index)
            }
        }
    }
}

/// Ordered attribution list for one instance, most important first
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceExplanation {
    attributions: Vec<FeatureAttribution>,
}

impl InstanceExplanation {
    pub fn new(attributions: Vec<FeatureAttribution>) -> Self {
        Self { attributions }
    }

    /// Build from `(feature_index, weight)` pairs in ranked order
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        Self {
            attributions: pairs.into_iter().map(FeatureAttribution::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.attributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributions.is_empty()
    }

    pub fn attributions(&self) -> &[FeatureAttribution] {
        &self.attributions
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureAttribution> {
        self.attributions.iter()
    }

    /// Feature indices in ranked order
    pub fn feature_order(&self) -> Vec<usize> {
        self.attributions.iter().map(|a| a.feature_index).collect()
    }

    /// The `k` highest ranked attributions (fewer if the explanation is shorter)
    pub fn top_k(&self, k: usize) -> &[FeatureAttribution] {
        &self.attributions[..k.min(self.attributions.len())]
    }

    /// Position of a feature in the ranking
    pub fn rank_of(&self, feature_index: usize) -> Option<usize> {
        self.attributions
            .iter()
            .position(|a| a.feature_index == feature_index)
    }

    /// Check that the explanation ranks every one of `n_features` features exactly once.
    pub fn validate(&self, n_features: usize) -> std::result::Result<(), IntegrityViolation> {
        if self.attributions.len() != n_features {
            return Err(IntegrityViolation::WrongLength {
                expected: n_features,
                actual: self.attributions.len(),
            });
        }

        let mut seen = vec![false; n_features];
        for a in &self.attributions {
            if a.feature_index >= n_features {
                return Err(IntegrityViolation::IndexOutOfRange {
                    feature_index: a.feature_index,
                    n_features,
                });
            }
            if seen[a.feature_index] {
                return Err(IntegrityViolation::DuplicateIndex {
                    feature_index: a.feature_index,
                });
            }
            if !a.weight.is_finite() {
                return Err(IntegrityViolation::NonFiniteWeight {
                    feature_index: a.feature_index,
                });
            }
            seen[a.feature_index] = true;
        }

        Ok(())
    }
}

impl<'a> IntoIterator for &'a InstanceExplanation {
    type Item = &'a FeatureAttribution;
    type IntoIter = std::slice::Iter<'a, FeatureAttribution>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributions.iter()
    }
}
