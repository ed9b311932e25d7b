//! Local surrogate explanations for tabular data
//!
//! For each explained row the oracle draws `num_samples` neighbours, asks the
//! classifier for their class probabilities, weights the neighbours by their
//! proximity to the row and fits a weighted ridge regression on the target
//! class probability. Features are ranked by the absolute surrogate coefficient.

use super::discretize::{Discretizer, FeatureBins};
use super::{ExplanationOracle, PredictFn};
use crate::error::{LimebagError, Result};
use crate::explanation::{FeatureAttribution, InstanceExplanation};
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Which features enter the surrogate model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSelection {
    /// Fit on every feature
    None,
    /// Fit on every feature, keep the `num_features` largest coefficients and refit on those
    HighestWeights,
}

impl Default for FeatureSelection {
    fn default() -> Self {
        FeatureSelection::None
    }
}

/// Class whose probability the surrogate explains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainTarget {
    /// Most probable class of the explained row
    PredictedClass,
    /// Fixed class column
    Class(usize),
}

impl Default for ExplainTarget {
    fn default() -> Self {
        ExplainTarget::PredictedClass
    }
}

/// Settings for [`LimeTabularOracle`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimeSettings {
    pub discretizer: Discretizer,
    pub feature_selection: FeatureSelection,
    /// Exponential kernel width (None = 0.75 * sqrt(n_features))
    pub kernel_width: Option<f64>,
    /// L2 penalty of the surrogate
    pub ridge_alpha: f64,
    pub target: ExplainTarget,
    /// Base seed; each row derives its own stream from it
    pub seed: Option<u64>,
}

impl Default for LimeSettings {
    fn default() -> Self {
        Self {
            discretizer: Discretizer::default(),
            feature_selection: FeatureSelection::default(),
            kernel_width: None,
            ridge_alpha: 1.0,
            target: ExplainTarget::default(),
            seed: None,
        }
    }
}

impl LimeSettings {
    pub fn with_discretizer(mut self, discretizer: Discretizer) -> Self {
        self.discretizer = discretizer;
        self
    }

    pub fn with_feature_selection(mut self, selection: FeatureSelection) -> Self {
        self.feature_selection = selection;
        self
    }

    pub fn with_kernel_width(mut self, width: f64) -> Self {
        self.kernel_width = Some(width);
        self
    }

    pub fn with_target(mut self, target: ExplainTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Tabular explanation oracle built once from training data, read-only afterwards
#[derive(Debug, Clone)]
pub struct LimeTabularOracle {
    feature_names: Vec<String>,
    means: Array1<f64>,
    scales: Array1<f64>,
    bins: Option<Vec<FeatureBins>>,
    bin_samplers: Vec<WeightedIndex<f64>>,
    kernel_width: f64,
    settings: LimeSettings,
}

impl LimeTabularOracle {
    /// Build the oracle from training features, labels and column names
    pub fn new(
        training: &Array2<f64>,
        labels: &Array1<f64>,
        feature_names: Vec<String>,
        settings: LimeSettings,
    ) -> Result<Self> {
        let (n_rows, n_features) = training.dim();
        if n_rows == 0 || n_features == 0 {
            return Err(LimebagError::ConfigError(
                "explanation oracle needs a non-empty training table".to_string(),
            ));
        }
        if labels.len() != n_rows {
            return Err(LimebagError::ConfigError(format!(
                "explanation oracle got {} labels for {} training rows",
                labels.len(),
                n_rows
            )));
        }
        if feature_names.len() != n_features {
            return Err(LimebagError::ConfigError(format!(
                "explanation oracle got {} feature names for {} columns",
                feature_names.len(),
                n_features
            )));
        }
        if !(settings.ridge_alpha > 0.0) {
            return Err(LimebagError::ConfigError(format!(
                "ridge_alpha must be positive, got {}",
                settings.ridge_alpha
            )));
        }

        let kernel_width = settings
            .kernel_width
            .unwrap_or_else(|| 0.75 * (n_features as f64).sqrt());
        if !(kernel_width.is_finite() && kernel_width > 0.0) {
            return Err(LimebagError::ConfigError(format!(
                "kernel width must be positive and finite, got {}",
                kernel_width
            )));
        }

        let means = training
            .mean_axis(Axis(0))
            .ok_or_else(|| LimebagError::ConfigError("empty training table".to_string()))?;
        // Constant columns keep unit scale
        let scales = training
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });

        let bins = settings.discretizer.fit(training, labels)?;
        let bin_samplers = match &bins {
            Some(bins) => bins
                .iter()
                .map(|b| {
                    WeightedIndex::new(&b.frequencies).map_err(|e| {
                        LimebagError::ConfigError(format!("invalid bin frequencies: {}", e))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            feature_names,
            means,
            scales,
            bins,
            bin_samplers,
            kernel_width,
            settings,
        })
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn kernel_width(&self) -> f64 {
        self.kernel_width
    }

    pub fn settings(&self) -> &LimeSettings {
        &self.settings
    }

    /// Same row always gets the same stream when seeded, independent of scheduling
    fn rng_for(&self, row: ArrayView1<'_, f64>) -> StdRng {
        match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ row_seed(row)),
            None => StdRng::from_entropy(),
        }
    }

    /// Draw neighbours of `row`. Returns (classifier inputs, surrogate inputs);
    /// row 0 of both is the explained row itself.
    fn sample_neighbourhood(
        &self,
        row: ArrayView1<'_, f64>,
        num_samples: usize,
        rng: &mut StdRng,
    ) -> (Array2<f64>, Array2<f64>) {
        let n_features = self.n_features();
        let mut inputs = Array2::zeros((num_samples, n_features));
        let mut surrogate = Array2::zeros((num_samples, n_features));
        inputs.row_mut(0).assign(&row);

        match &self.bins {
            Some(bins) => {
                let row_bins: Vec<usize> = bins.iter().zip(row.iter()).map(|(b, &v)| b.bin_of(v)).collect();
                surrogate.row_mut(0).fill(1.0);

                for i in 1..num_samples {
                    for j in 0..n_features {
                        let b = self.bin_samplers[j].sample(rng);
                        let (lo, hi) = (bins[j].mins[b], bins[j].maxs[b]);
                        inputs[[i, j]] = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
                        surrogate[[i, j]] = if b == row_bins[j] { 1.0 } else { 0.0 };
                    }
                }
            }
            None => {
                for j in 0..n_features {
                    surrogate[[0, j]] = (row[j] - self.means[j]) / self.scales[j];
                }

                for i in 1..num_samples {
                    for j in 0..n_features {
                        let z = standard_normal(rng);
                        inputs[[i, j]] = z * self.scales[j] + self.means[j];
                        surrogate[[i, j]] = z;
                    }
                }
            }
        }

        (inputs, surrogate)
    }
}

impl ExplanationOracle for LimeTabularOracle {
    fn explain(
        &self,
        row: ArrayView1<'_, f64>,
        predict_fn: &PredictFn<'_>,
        num_features: usize,
        num_samples: usize,
    ) -> Result<InstanceExplanation> {
        let n_features = self.n_features();
        if row.len() != n_features {
            return Err(LimebagError::ShapeError {
                expected: format!("{} features", n_features),
                actual: format!("{} features", row.len()),
            });
        }
        if num_features == 0 || num_features > n_features {
            return Err(LimebagError::InvalidInput(format!(
                "num_features must be in 1..={}, got {}",
                n_features, num_features
            )));
        }
        if num_samples < 2 {
            return Err(LimebagError::InvalidInput(format!(
                "num_samples must be at least 2, got {}",
                num_samples
            )));
        }

        let mut rng = self.rng_for(row);
        let (inputs, surrogate) = self.sample_neighbourhood(row, num_samples, &mut rng);

        let proba = predict_fn(&inputs)?;
        if proba.nrows() != num_samples || proba.ncols() == 0 {
            return Err(LimebagError::ShapeError {
                expected: format!("{} x n_classes probabilities", num_samples),
                actual: format!("{} x {}", proba.nrows(), proba.ncols()),
            });
        }

        let class = match self.settings.target {
            ExplainTarget::PredictedClass => argmax(proba.row(0)),
            ExplainTarget::Class(c) if c < proba.ncols() => c,
            ExplainTarget::Class(c) => {
                return Err(LimebagError::InvalidInput(format!(
                    "target class {} but classifier returned {} classes",
                    c,
                    proba.ncols()
                )))
            }
        };

        let y = proba.column(class).to_owned();
        if y.iter().any(|p| !p.is_finite()) {
            return Err(LimebagError::ComputationError(
                "classifier returned non-finite probabilities".to_string(),
            ));
        }

        let origin = surrogate.row(0).to_owned();
        let width_sq = self.kernel_width * self.kernel_width;
        let weights: Array1<f64> = surrogate
            .rows()
            .into_iter()
            .map(|r| {
                let d_sq: f64 = r.iter().zip(origin.iter()).map(|(a, b)| (a - b).powi(2)).sum();
                (-d_sq / width_sq).exp().sqrt()
            })
            .collect();

        let all: Vec<usize> = (0..n_features).collect();
        let selected = match self.settings.feature_selection {
            FeatureSelection::None => all,
            FeatureSelection::HighestWeights => {
                let coef = weighted_ridge(&surrogate, &y, &weights, self.settings.ridge_alpha)?;
                rank_by_magnitude(&all, &coef)
                    .into_iter()
                    .take(num_features)
                    .map(|(idx, _)| idx)
                    .collect()
            }
        };

        let x_sel = surrogate.select(Axis(1), &selected);
        let coef = weighted_ridge(&x_sel, &y, &weights, self.settings.ridge_alpha)?;

        let ranked = rank_by_magnitude(&selected, &coef)
            .into_iter()
            .take(num_features)
            .map(|(feature_index, weight)| FeatureAttribution { feature_index, weight })
            .collect();

        Ok(InstanceExplanation::new(ranked))
    }
}

/// Stable hash of a row's bit patterns
fn row_seed(row: ArrayView1<'_, f64>) -> u64 {
    let bytes: Vec<u8> = row.iter().flat_map(|v| v.to_bits().to_le_bytes()).collect();
    xxh3_64(&bytes)
}

/// Pair feature indices with coefficients, largest |coef| first, ties by index
fn rank_by_magnitude(features: &[usize], coef: &Array1<f64>) -> Vec<(usize, f64)> {
    let mut ranked: Vec<(usize, f64)> = features.iter().copied().zip(coef.iter().copied()).collect();
    ranked.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    ranked
}

fn argmax(values: ArrayView1<'_, f64>) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Box-Muller
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Weighted ridge regression with intercept; returns the slope coefficients
fn weighted_ridge(x: &Array2<f64>, y: &Array1<f64>, w: &Array1<f64>, alpha: f64) -> Result<Array1<f64>> {
    let w_sum = w.sum();
    if !(w_sum > 0.0) {
        return Err(LimebagError::ComputationError(
            "all neighbourhood weights are zero".to_string(),
        ));
    }

    let x_mean = x.t().dot(w) / w_sum;
    let y_mean = y.dot(w) / w_sum;

    let xc = x - &x_mean.view().insert_axis(Axis(0));
    let yc = y - y_mean;
    let xw = &xc * &w.view().insert_axis(Axis(1));

    let mut a = xw.t().dot(&xc);
    for i in 0..a.nrows() {
        a[[i, i]] += alpha;
    }
    let b = xw.t().dot(&yc);

    solve_spd(&a, &b).ok_or_else(|| {
        LimebagError::ComputationError("surrogate system is not positive definite".to_string())
    })
}

/// Lower-triangular `L` with `A = L Lᵀ`, or None when `a` is not positive definite
fn cholesky_factor(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let v = a[[i, j]] - l.slice(s![i, ..j]).dot(&l.slice(s![j, ..j]));
            if i == j {
                if !(v > 0.0) {
                    return None;
                }
                l[[i, i]] = v.sqrt();
            } else {
                l[[i, j]] = v / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Solve symmetric positive-definite `Ax = b`.
///
/// A numerically singular `a` is retried with diagonal jitter growing from
/// 1e-10 to 1e-4 of its mean diagonal before giving up.
fn solve_spd(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    let scale = (a.diag().iter().map(|d| d.abs()).sum::<f64>() / n.max(1) as f64).max(f64::EPSILON);
    let l = std::iter::once(0.0)
        .chain((0..4).map(|p| scale * 1e-10 * 100f64.powi(p)))
        .find_map(|jitter| {
            let mut shifted = a.clone();
            shifted.diag_mut().mapv_inplace(|d| d + jitter);
            cholesky_factor(&shifted)
        })?;

    // L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let v = (b[i] - l.slice(s![i, ..i]).dot(&y.slice(s![..i]))) / l[[i, i]];
        y[i] = v;
    }

    // Lᵀ x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let v = (y[i] - l.slice(s![i + 1.., i]).dot(&x.slice(s![i + 1..]))) / l[[i, i]];
        x[i] = v;
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn training_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| ((i * 7 + j * 13) % 40) as f64 / 40.0);
        let y = x.column(0).mapv(|v| if v > 0.5 { 1.0 } else { 0.0 });
        (x, y)
    }

    fn names() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    // P(class 1) driven almost entirely by feature 0
    fn predict(x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(Array2::from_shape_fn((x.nrows(), 2), |(i, c)| {
            let z = 8.0 * (x[[i, 0]] - 0.5) + 0.5 * (x[[i, 2]] - 0.5);
            let p = 1.0 / (1.0 + (-z).exp());
            if c == 1 { p } else { 1.0 - p }
        }))
    }

    #[test]
    fn test_continuous_explanation_ranks_dominant_feature() {
        let (x, y) = training_data();
        let settings = LimeSettings::default()
            .with_discretizer(Discretizer::None)
            .with_seed(7);
        let oracle = LimeTabularOracle::new(&x, &y, names(), settings).unwrap();

        let row = array![0.55, 0.3, 0.6];
        let exp = oracle.explain(row.view(), &predict, 3, 500).unwrap();

        assert!(exp.validate(3).is_ok());
        assert_eq!(exp.attributions()[0].feature_index, 0);
    }

    #[test]
    fn test_discretized_explanation_is_permutation() {
        let (x, y) = training_data();
        for discretizer in [Discretizer::Quartile, Discretizer::Entropy] {
            let settings = LimeSettings::default().with_discretizer(discretizer).with_seed(3);
            let oracle = LimeTabularOracle::new(&x, &y, names(), settings).unwrap();
            let exp = oracle.explain(array![0.2, 0.9, 0.4].view(), &predict, 3, 300).unwrap();
            assert!(exp.validate(3).is_ok());
        }
    }

    #[test]
    fn test_seeded_oracle_is_deterministic() {
        let (x, y) = training_data();
        let oracle = LimeTabularOracle::new(&x, &y, names(), LimeSettings::default().with_seed(11)).unwrap();
        let row = array![0.7, 0.1, 0.3];

        let first = oracle.explain(row.view(), &predict, 3, 200).unwrap();
        let second = oracle.explain(row.view(), &predict, 3, 200).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_highest_weights_selection_truncates() {
        let (x, y) = training_data();
        let settings = LimeSettings::default()
            .with_discretizer(Discretizer::None)
            .with_feature_selection(FeatureSelection::HighestWeights)
            .with_seed(5);
        let oracle = LimeTabularOracle::new(&x, &y, names(), settings).unwrap();

        let exp = oracle.explain(array![0.5, 0.5, 0.5].view(), &predict, 2, 300).unwrap();
        assert_eq!(exp.len(), 2);
        assert_eq!(exp.attributions()[0].feature_index, 0);
    }

    #[test]
    fn test_construction_errors() {
        let (x, y) = training_data();
        let short_labels = y.slice(ndarray::s![..10]).to_owned();
        assert!(LimeTabularOracle::new(&x, &short_labels, names(), LimeSettings::default()).is_err());
        assert!(LimeTabularOracle::new(&x, &y, vec!["a".to_string()], LimeSettings::default()).is_err());

        let empty = Array2::<f64>::zeros((0, 3));
        let no_labels = Array1::<f64>::zeros(0);
        assert!(LimeTabularOracle::new(&empty, &no_labels, names(), LimeSettings::default()).is_err());
    }

    #[test]
    fn test_explain_rejects_bad_requests() {
        let (x, y) = training_data();
        let oracle = LimeTabularOracle::new(&x, &y, names(), LimeSettings::default().with_seed(1)).unwrap();

        assert!(oracle.explain(array![0.1, 0.2].view(), &predict, 2, 100).is_err());
        assert!(oracle.explain(array![0.1, 0.2, 0.3].view(), &predict, 4, 100).is_err());
        assert!(oracle.explain(array![0.1, 0.2, 0.3].view(), &predict, 3, 1).is_err());

        let bad_shape = |_: &Array2<f64>| -> Result<Array2<f64>> { Ok(Array2::zeros((1, 2))) };
        assert!(oracle.explain(array![0.1, 0.2, 0.3].view(), &bad_shape, 3, 100).is_err());
    }

    #[test]
    fn test_solve_spd() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let x = solve_spd(&a, &b).unwrap();
        assert!((x[0] - 0.5).abs() < 1e-10);
        assert!(x[1].abs() < 1e-10);
    }

    #[test]
    fn test_solve_spd_singular_uses_jitter() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        assert!(cholesky_factor(&a).is_none());

        let x = solve_spd(&a, &array![2.0, 2.0]).unwrap();
        let ax = a.dot(&x);
        assert!((ax[0] - 2.0).abs() < 1e-3);
        assert!((ax[1] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_solve_spd_rejects_indefinite_and_bad_shapes() {
        let a = array![[1.0, 0.0], [0.0, -5.0]];
        assert!(solve_spd(&a, &array![1.0, 1.0]).is_none());
        assert!(solve_spd(&array![[1.0, 0.0], [0.0, 1.0]], &array![1.0]).is_none());
    }

    #[test]
    fn test_row_seed_is_fixed_hash_of_bits() {
        let row: Array1<f64> = array![0.5, 1.0, -2.25];
        let bytes: Vec<u8> = row.iter().flat_map(|v| v.to_bits().to_le_bytes()).collect();
        assert_eq!(row_seed(row.view()), xxh3_64(&bytes));
        assert_ne!(row_seed(array![0.0].view()), row_seed(array![-0.0].view()));
        assert_ne!(row_seed(row.view()), row_seed(array![0.5, 1.0, -2.0].view()));
    }
}
