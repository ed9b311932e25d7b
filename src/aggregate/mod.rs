//! Rank/value aggregation across instances
//!
//! Transposes per-instance explanations into one profile per feature: the
//! position the feature took in every instance's ranking, and the absolute
//! attribution weight it had there. Profiles keep instance processing order.

use crate::error::{LimebagError, Result};
use crate::explanation::{InstanceExplanation, IntegrityViolation};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Cross-instance distribution of one feature's rank and magnitude
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRankProfile {
    pub feature_index: usize,
    /// 0-indexed rank per instance
    pub ranks: Vec<usize>,
    /// |weight| per instance, parallel to `ranks`
    pub magnitudes: Vec<f64>,
}

impl FeatureRankProfile {
    fn new(feature_index: usize, capacity: usize) -> Self {
        Self {
            feature_index,
            ranks: Vec::with_capacity(capacity),
            magnitudes: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary::from_profile(self)
    }
}

/// An explanation left out of aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedExplanation {
    pub instance_index: usize,
    pub violation: IntegrityViolation,
}

/// Per-feature profiles produced by one aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankProfiles {
    feature_names: Vec<String>,
    profiles: Vec<FeatureRankProfile>,
    /// Instances that contributed, in aggregation order
    instances: Vec<usize>,
    excluded: Vec<ExcludedExplanation>,
}

impl RankProfiles {
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.profiles.len()
    }

    /// Number of instances that contributed to every profile
    pub fn n_instances(&self) -> usize {
        self.instances.len()
    }

    pub fn instance_indices(&self) -> &[usize] {
        &self.instances
    }

    pub fn excluded(&self) -> &[ExcludedExplanation] {
        &self.excluded
    }

    pub fn get(&self, feature_index: usize) -> Option<&FeatureRankProfile> {
        self.profiles.get(feature_index)
    }

    pub fn by_name(&self, name: &str) -> Option<&FeatureRankProfile> {
        self.feature_names
            .iter()
            .position(|n| n == name)
            .and_then(|idx| self.profiles.get(idx))
    }

    /// `(feature name, profile)` pairs in table column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureRankProfile)> {
        self.feature_names
            .iter()
            .map(String::as_str)
            .zip(self.profiles.iter())
    }

    pub fn summary(&self) -> Vec<ProfileSummary> {
        self.profiles.iter().map(FeatureRankProfile::summary).collect()
    }

    /// Feature indices ordered by mean magnitude, largest first
    pub fn ranking_by_mean_magnitude(&self) -> Vec<(usize, f64)> {
        let mut indexed: Vec<(usize, f64)> = self
            .summary()
            .into_iter()
            .map(|s| (s.feature_index, s.mean_magnitude))
            .collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        indexed
    }
}

/// Builds [`RankProfiles`] for a fixed feature set. Holds no state between calls.
#[derive(Debug, Clone)]
pub struct RankAggregator {
    feature_names: Vec<String>,
}

impl RankAggregator {
    pub fn new(feature_names: Vec<String>) -> Result<Self> {
        if feature_names.is_empty() {
            return Err(LimebagError::ConfigError(
                "aggregation needs at least one feature".to_string(),
            ));
        }
        Ok(Self { feature_names })
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Aggregate explanations numbered by their position in the sequence
    pub fn aggregate<'a, I>(&self, explanations: I) -> Result<RankProfiles>
    where
        I: IntoIterator<Item = &'a InstanceExplanation>,
    {
        self.aggregate_indexed(explanations.into_iter().enumerate())
    }

    /// Aggregate `(instance_index, explanation)` pairs in the given order.
    ///
    /// Explanations that are not a permutation of the feature set are excluded
    /// and reported in [`RankProfiles::excluded`].
    pub fn aggregate_indexed<'a, I>(&self, explanations: I) -> Result<RankProfiles>
    where
        I: IntoIterator<Item = (usize, &'a InstanceExplanation)>,
    {
        let n_features = self.n_features();
        let iter = explanations.into_iter();
        let capacity = iter.size_hint().0;

        let mut profiles: Vec<FeatureRankProfile> = (0..n_features)
            .map(|idx| FeatureRankProfile::new(idx, capacity))
            .collect();
        let mut instances = Vec::with_capacity(capacity);
        let mut excluded = Vec::new();

        for (instance_index, explanation) in iter {
            if let Err(violation) = explanation.validate(n_features) {
                warn!(instance = instance_index, reason = %violation, "Excluding explanation from aggregation");
                excluded.push(ExcludedExplanation { instance_index, violation });
                continue;
            }

            for (rank, attribution) in explanation.iter().enumerate() {
                let profile = &mut profiles[attribution.feature_index];
                profile.ranks.push(rank);
                profile.magnitudes.push(attribution.magnitude());
            }
            instances.push(instance_index);
        }

        let recorded: usize = profiles.iter().map(|p| p.ranks.len()).sum();
        let expected = instances.len() * n_features;
        if recorded != expected || profiles.iter().any(|p| p.ranks.len() != p.magnitudes.len()) {
            return Err(LimebagError::IntegrityError(format!(
                "aggregated {} rank entries, expected {} ({} instances x {} features)",
                recorded,
                expected,
                instances.len(),
                n_features
            )));
        }

        Ok(RankProfiles {
            feature_names: self.feature_names.clone(),
            profiles,
            instances,
            excluded,
        })
    }
}

/// Descriptive statistics of one feature profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub feature_index: usize,
    pub n_instances: usize,
    pub mean_rank: f64,
    pub best_rank: Option<usize>,
    pub mean_magnitude: f64,
    pub std_magnitude: f64,
    pub min_magnitude: f64,
    pub max_magnitude: f64,
}

impl ProfileSummary {
    pub fn from_profile(profile: &FeatureRankProfile) -> Self {
        let n = profile.len();
        if n == 0 {
            return Self {
                feature_index: profile.feature_index,
                n_instances: 0,
                mean_rank: 0.0,
                best_rank: None,
                mean_magnitude: 0.0,
                std_magnitude: 0.0,
                min_magnitude: 0.0,
                max_magnitude: 0.0,
            };
        }

        let n_f = n as f64;
        let mean_rank = profile.ranks.iter().sum::<usize>() as f64 / n_f;
        let mean_magnitude = profile.magnitudes.iter().sum::<f64>() / n_f;
        let variance = profile
            .magnitudes
            .iter()
            .map(|m| (m - mean_magnitude).powi(2))
            .sum::<f64>()
            / n_f;

        Self {
            feature_index: profile.feature_index,
            n_instances: n,
            mean_rank,
            best_rank: profile.ranks.iter().copied().min(),
            mean_magnitude,
            std_magnitude: variance.sqrt(),
            min_magnitude: profile.magnitudes.iter().copied().fold(f64::INFINITY, f64::min),
            max_magnitude: profile.magnitudes.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    fn explanations() -> Vec<InstanceExplanation> {
        vec![
            InstanceExplanation::from_pairs(vec![(2, 0.5), (1, 0.3), (0, 0.1)]),
            InstanceExplanation::from_pairs(vec![(1, 0.4), (0, 0.2), (2, 0.1)]),
        ]
    }

    #[test]
    fn test_transpose_two_instances() {
        let aggregator = RankAggregator::new(names()).unwrap();
        let profiles = aggregator.aggregate(&explanations()).unwrap();

        let b = profiles.by_name("B").unwrap();
        assert_eq!(b.ranks, vec![1, 0]);
        assert_eq!(b.magnitudes, vec![0.3, 0.4]);

        let a = profiles.get(0).unwrap();
        assert_eq!(a.ranks, vec![2, 1]);
        assert_eq!(a.magnitudes, vec![0.1, 0.2]);

        assert_eq!(profiles.n_instances(), 2);
        assert!(profiles.excluded().is_empty());
    }

    #[test]
    fn test_negative_weights_become_magnitudes() {
        let aggregator = RankAggregator::new(names()).unwrap();
        let exp = InstanceExplanation::from_pairs(vec![(0, -0.7), (2, 0.2), (1, -0.1)]);
        let profiles = aggregator.aggregate(std::iter::once(&exp)).unwrap();
        assert_eq!(profiles.get(0).unwrap().magnitudes, vec![0.7]);
        assert_eq!(profiles.get(1).unwrap().magnitudes, vec![0.1]);
    }

    #[test]
    fn test_aggregate_is_pure() {
        let aggregator = RankAggregator::new(names()).unwrap();
        let exps = explanations();
        let first = aggregator.aggregate(&exps).unwrap();
        let second = aggregator.aggregate(&exps).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_malformed_explanations_excluded() {
        let aggregator = RankAggregator::new(names()).unwrap();
        let mut exps = explanations();
        exps.insert(1, InstanceExplanation::from_pairs(vec![(1, 0.4), (1, 0.2), (2, 0.1)]));
        exps.push(InstanceExplanation::from_pairs(vec![(0, 0.4)]));

        let profiles = aggregator.aggregate(&exps).unwrap();
        assert_eq!(profiles.n_instances(), 2);
        assert_eq!(profiles.instance_indices(), &[0, 2]);
        assert_eq!(profiles.excluded().len(), 2);
        assert_eq!(profiles.excluded()[0].instance_index, 1);
        assert!(matches!(
            profiles.excluded()[1].violation,
            IntegrityViolation::WrongLength { expected: 3, actual: 1 }
        ));

        for (_, profile) in profiles.iter() {
            assert_eq!(profile.len(), 2);
            assert!(profile.ranks.iter().all(|&r| r < 3));
        }
    }

    #[test]
    fn test_empty_input() {
        let aggregator = RankAggregator::new(names()).unwrap();
        let profiles = aggregator.aggregate(&Vec::<InstanceExplanation>::new()).unwrap();
        assert_eq!(profiles.n_features(), 3);
        assert_eq!(profiles.n_instances(), 0);
        assert!(profiles.get(2).unwrap().is_empty());
    }

    #[test]
    fn test_no_features_rejected() {
        assert!(RankAggregator::new(Vec::new()).is_err());
    }

    #[test]
    fn test_summary_and_ranking() {
        let aggregator = RankAggregator::new(names()).unwrap();
        let profiles = aggregator.aggregate(&explanations()).unwrap();

        let summary = profiles.summary();
        assert_eq!(summary[1].mean_rank, 0.5);
        assert_eq!(summary[1].best_rank, Some(0));
        assert!((summary[1].mean_magnitude - 0.35).abs() < 1e-12);
        assert_eq!(summary[1].min_magnitude, 0.3);
        assert_eq!(summary[1].max_magnitude, 0.4);

        let ranking = profiles.ranking_by_mean_magnitude();
        assert_eq!(ranking[0].0, 1);
    }
}
