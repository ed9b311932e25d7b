//! Discretization of continuous training features into bins

use crate::error::{LimebagError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum depth of the per-feature entropy split tree (at most 8 bins)
const ENTROPY_MAX_DEPTH: usize = 3;

/// Strategy for binning continuous features before sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discretizer {
    /// Keep features continuous; sample from a Gaussian fitted on training data
    None,
    /// Split each feature at its 25th, 50th and 75th percentiles
    Quartile,
    /// Split each feature where it best separates the training labels
    Entropy,
}

impl Default for Discretizer {
    fn default() -> Self {
        Discretizer::Entropy
    }
}

/// Bin layout of a single feature learned from training data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureBins {
    /// Ascending split points; bin `b` holds values in `(boundaries[b-1], boundaries[b]]`
    pub boundaries: Vec<f64>,
    /// Smallest training value per bin
    pub mins: Vec<f64>,
    /// Largest training value per bin
    pub maxs: Vec<f64>,
    /// Share of training rows per bin
    pub frequencies: Vec<f64>,
}

impl FeatureBins {
    /// Learn bins for one column given its split points
    pub fn from_boundaries(values: ArrayView1<'_, f64>, mut boundaries: Vec<f64>) -> Self {
        boundaries.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        boundaries.dedup();

        let n_bins = boundaries.len() + 1;
        let mut mins = vec![f64::INFINITY; n_bins];
        let mut maxs = vec![f64::NEG_INFINITY; n_bins];
        let mut counts = vec![0usize; n_bins];

        for &v in values.iter() {
            let b = bin_index(&boundaries, v);
            mins[b] = mins[b].min(v);
            maxs[b] = maxs[b].max(v);
            counts[b] += 1;
        }

        // Empty bins fall back to their split points
        for b in 0..n_bins {
            if counts[b] == 0 {
                let lo = if b == 0 { boundaries[0] } else { boundaries[b - 1] };
                let hi = if b < boundaries.len() { boundaries[b] } else { lo };
                mins[b] = lo;
                maxs[b] = hi.max(lo);
            }
        }

        let total = values.len().max(1) as f64;
        let frequencies = counts.iter().map(|&c| c as f64 / total).collect();

        Self { boundaries, mins, maxs, frequencies }
    }

    pub fn n_bins(&self) -> usize {
        self.boundaries.len() + 1
    }

    /// Bin holding `value`
    pub fn bin_of(&self, value: f64) -> usize {
        bin_index(&self.boundaries, value)
    }
}

fn bin_index(boundaries: &[f64], value: f64) -> usize {
    boundaries.iter().take_while(|&&b| b < value).count()
}

impl Discretizer {
    /// Fit per-feature bins on training data. Returns `None` for [`Discretizer::None`].
    pub fn fit(&self, training: &Array2<f64>, labels: &Array1<f64>) -> Result<Option<Vec<FeatureBins>>> {
        if training.nrows() == 0 {
            return Err(LimebagError::ConfigError(
                "cannot discretize an empty training table".to_string(),
            ));
        }

        match self {
            Discretizer::None => Ok(None),
            Discretizer::Quartile => Ok(Some(
                training
                    .columns()
                    .into_iter()
                    .map(|col| {
                        let mut sorted: Vec<f64> = col.iter().copied().collect();
                        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                        let boundaries = [0.25, 0.5, 0.75]
                            .iter()
                            .map(|&q| percentile(&sorted, q))
                            .collect();
                        FeatureBins::from_boundaries(col, boundaries)
                    })
                    .collect(),
            )),
            Discretizer::Entropy => {
                if labels.len() != training.nrows() {
                    return Err(LimebagError::ConfigError(format!(
                        "entropy discretizer needs one label per training row ({} labels, {} rows)",
                        labels.len(),
                        training.nrows()
                    )));
                }
                Ok(Some(
                    training
                        .columns()
                        .into_iter()
                        .map(|col| {
                            let mut points: Vec<(f64, u64)> = col
                                .iter()
                                .zip(labels.iter())
                                .map(|(&x, &y)| (x, y.to_bits()))
                                .collect();
                            points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
                            let mut boundaries = Vec::new();
                            entropy_splits(&points, 0, &mut boundaries);
                            FeatureBins::from_boundaries(col, boundaries)
                        })
                        .collect(),
                ))
            }
        }
    }
}

/// Linear-interpolated percentile of sorted data
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn class_counts(points: &[(f64, u64)]) -> HashMap<u64, usize> {
    let mut counts = HashMap::new();
    for &(_, c) in points {
        *counts.entry(c).or_insert(0) += 1;
    }
    counts
}

fn class_entropy(counts: &HashMap<u64, usize>, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    counts
        .values()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

/// Recursive binary splitting on information gain, `points` sorted by value
fn entropy_splits(points: &[(f64, u64)], depth: usize, out: &mut Vec<f64>) {
    if depth >= ENTROPY_MAX_DEPTH || points.len() < 2 {
        return;
    }

    let total = class_counts(points);
    let parent = class_entropy(&total, points.len());
    if parent <= 0.0 {
        return;
    }

    let mut left: HashMap<u64, usize> = HashMap::new();
    let mut right = total;
    // (gain, split position, threshold)
    let mut best: Option<(f64, usize, f64)> = None;

    for i in 0..points.len() - 1 {
        let (x, c) = points[i];
        *left.entry(c).or_insert(0) += 1;
        if let Some(r) = right.get_mut(&c) {
            *r -= 1;
        }

        let next_x = points[i + 1].0;
        if next_x <= x {
            continue;
        }

        let n_left = i + 1;
        let n_right = points.len() - n_left;
        let child = (n_left as f64 * class_entropy(&left, n_left)
            + n_right as f64 * class_entropy(&right, n_right))
            / points.len() as f64;
        let gain = parent - child;

        if best.map_or(true, |(g, _, _)| gain > g + 1e-12) {
            best = Some((gain, n_left, (x + next_x) / 2.0));
        }
    }

    if let Some((gain, pos, threshold)) = best {
        if gain > 0.0 {
            out.push(threshold);
            entropy_splits(&points[..pos], depth + 1, out);
            entropy_splits(&points[pos..], depth + 1, out);
        }
    }
}
