//! Top-K sensitive-feature policy

use crate::error::{LimebagError, Result};
use crate::explanation::InstanceExplanation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A sensitive feature found among the top-K attributions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveHit {
    pub feature_index: usize,
    /// 0-indexed position in the explanation
    pub rank: usize,
}

/// Flags an instance when a sensitive feature ranks among its `k` most important features.
///
/// The policy is disabled when `k == 0` or the sensitive set is empty; an absent
/// sensitive set is the same as an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopKPolicy {
    sensitive: BTreeSet<usize>,
    k: usize,
}

impl TopKPolicy {
    /// Validate a policy against a table of `n_features` features
    pub fn new<I>(sensitive: I, k: usize, n_features: usize) -> Result<Self>
    where
        I: IntoIterator<Item = usize>,
    {
        if k > n_features {
            return Err(LimebagError::ConfigError(format!(
                "K cannot be greater than the dimension of attributes (K = {}, attributes = {})",
                k, n_features
            )));
        }

        let sensitive: BTreeSet<usize> = sensitive.into_iter().collect();
        if let Some(&bad) = sensitive.iter().find(|&&idx| idx >= n_features) {
            return Err(LimebagError::ConfigError(format!(
                "sensitive feature index {} out of range for {} attributes",
                bad, n_features
            )));
        }

        Ok(Self { sensitive, k })
    }

    /// Policy that never flags anything
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn sensitive(&self) -> &BTreeSet<usize> {
        &self.sensitive
    }

    pub fn is_enabled(&self) -> bool {
        self.k > 0 && !self.sensitive.is_empty()
    }

    /// Earliest-ranked sensitive feature within the top `k` positions.
    ///
    /// Scanning stops at the first match, so at most one hit is reported per
    /// instance even when several sensitive features rank in the top `k`.
    pub fn first_violation(&self, explanation: &InstanceExplanation) -> Option<SensitiveHit> {
        if !self.is_enabled() {
            return None;
        }
        explanation
            .top_k(self.k)
            .iter()
            .enumerate()
            .find(|(_, a)| self.sensitive.contains(&a.feature_index))
            .map(|(rank, a)| SensitiveHit {
                feature_index: a.feature_index,
                rank,
            })
    }
}
