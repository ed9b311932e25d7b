//! Audit configuration
//!
//! [`AuditConfig`] bundles the fitted classifier, the training and test feature
//! tables, the training labels and the top-K policy. Everything is validated in
//! [`AuditConfigBuilder::build`]; a config is either fully valid or not built.

mod policy;
mod settings;

pub use policy::{SensitiveHit, TopKPolicy};
pub use settings::AuditSettings;

use crate::error::{LimebagError, Result};
use crate::oracle::ProbabilisticClassifier;
use crate::utils::{column_names, table_to_array2, ParallelConfig};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use std::time::Duration;

/// Perturbed samples per oracle call
pub const DEFAULT_NUM_SAMPLES: usize = 5000;

/// Top-ranked positions checked per instance
pub const DEFAULT_TOP_K: usize = 1;

/// Immutable, validated audit configuration
pub struct AuditConfig<'a> {
    classifier: &'a dyn ProbabilisticClassifier,
    train_x: &'a DataFrame,
    train_y: &'a Array1<f64>,
    test_x: &'a DataFrame,
    feature_names: Vec<String>,
    train_matrix: Array2<f64>,
    test_matrix: Array2<f64>,
    policy: TopKPolicy,
    num_samples: usize,
    parallel: ParallelConfig,
    instance_budget: Option<Duration>,
}

impl<'a> AuditConfig<'a> {
    /// Start building a configuration
    pub fn builder(
        classifier: &'a dyn ProbabilisticClassifier,
        train_x: &'a DataFrame,
        train_y: &'a Array1<f64>,
        test_x: &'a DataFrame,
    ) -> AuditConfigBuilder<'a> {
        AuditConfigBuilder {
            classifier,
            train_x,
            train_y,
            test_x,
            sensitive: Vec::new(),
            top_k: DEFAULT_TOP_K,
            num_samples: DEFAULT_NUM_SAMPLES,
            parallel: ParallelConfig::default(),
            instance_budget: None,
        }
    }

    pub fn classifier(&self) -> &'a dyn ProbabilisticClassifier {
        self.classifier
    }

    pub fn train_x(&self) -> &'a DataFrame {
        self.train_x
    }

    pub fn train_y(&self) -> &'a Array1<f64> {
        self.train_y
    }

    pub fn test_x(&self) -> &'a DataFrame {
        self.test_x
    }

    /// Column names shared by the training and test tables
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn n_test_instances(&self) -> usize {
        self.test_matrix.nrows()
    }

    pub fn train_matrix(&self) -> &Array2<f64> {
        &self.train_matrix
    }

    pub fn test_matrix(&self) -> &Array2<f64> {
        &self.test_matrix
    }

    pub fn policy(&self) -> &TopKPolicy {
        &self.policy
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn parallel(&self) -> &ParallelConfig {
        &self.parallel
    }

    pub fn instance_budget(&self) -> Option<Duration> {
        self.instance_budget
    }
}

impl std::fmt::Debug for AuditConfig<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditConfig")
            .field("feature_names", &self.feature_names)
            .field("train_rows", &self.train_matrix.nrows())
            .field("test_rows", &self.test_matrix.nrows())
            .field("policy", &self.policy)
            .field("num_samples", &self.num_samples)
            .field("parallel", &self.parallel)
            .field("instance_budget", &self.instance_budget)
            .finish()
    }
}

/// Builder for [`AuditConfig`]
pub struct AuditConfigBuilder<'a> {
    classifier: &'a dyn ProbabilisticClassifier,
    train_x: &'a DataFrame,
    train_y: &'a Array1<f64>,
    test_x: &'a DataFrame,
    sensitive: Vec<usize>,
    top_k: usize,
    num_samples: usize,
    parallel: ParallelConfig,
    instance_budget: Option<Duration>,
}

impl<'a> AuditConfigBuilder<'a> {
    /// Sensitive feature indices; empty means no fairness policy
    pub fn sensitive<I: IntoIterator<Item = usize>>(mut self, indices: I) -> Self {
        self.sensitive = indices.into_iter().collect();
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn num_samples(mut self, n: usize) -> Self {
        self.num_samples = n;
        self
    }

    pub fn parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    /// Soft time budget per oracle call; slower instances are skipped
    pub fn instance_budget(mut self, budget: Duration) -> Self {
        self.instance_budget = Some(budget);
        self
    }

    /// Apply values from a settings file
    pub fn settings(mut self, settings: &AuditSettings) -> Self {
        self.sensitive = settings.sensitive.clone();
        self.top_k = settings.top_k;
        self.num_samples = settings.num_samples;
        self.parallel = settings.parallel();
        self.instance_budget = settings.instance_budget();
        self
    }

    /// Validate every argument and build the configuration
    pub fn build(self) -> Result<AuditConfig<'a>> {
        if !self.classifier.is_fitted() {
            return Err(LimebagError::ConfigError(
                "classifier must be fitted before auditing".to_string(),
            ));
        }

        let feature_names = column_names(self.train_x);
        if feature_names.is_empty() {
            return Err(LimebagError::ConfigError(
                "X_train must have at least one feature column".to_string(),
            ));
        }
        if self.train_x.height() == 0 {
            return Err(LimebagError::ConfigError("X_train has no rows".to_string()));
        }
        if self.test_x.height() == 0 {
            return Err(LimebagError::ConfigError("X_test has no rows".to_string()));
        }

        if self.train_y.is_empty() {
            return Err(LimebagError::ConfigError("y_train must not be empty".to_string()));
        }
        if self.train_y.len() != self.train_x.height() {
            return Err(LimebagError::ConfigError(format!(
                "y_train has {} labels but X_train has {} rows",
                self.train_y.len(),
                self.train_x.height()
            )));
        }

        let test_names = column_names(self.test_x);
        if test_names != feature_names {
            return Err(LimebagError::ConfigError(format!(
                "X_test columns {:?} do not match X_train columns {:?}",
                test_names, feature_names
            )));
        }

        let train_matrix = table_to_array2(self.train_x, &feature_names)
            .map_err(|e| LimebagError::ConfigError(format!("X_train: {}", e)))?;
        let test_matrix = table_to_array2(self.test_x, &feature_names)
            .map_err(|e| LimebagError::ConfigError(format!("X_test: {}", e)))?;

        let policy = TopKPolicy::new(self.sensitive, self.top_k, feature_names.len())?;

        if self.num_samples < 2 {
            return Err(LimebagError::ConfigError(format!(
                "num_samples must be at least 2, got {}",
                self.num_samples
            )));
        }
        if self.parallel.n_threads == Some(0) {
            return Err(LimebagError::ConfigError("n_threads must be positive".to_string()));
        }

        Ok(AuditConfig {
            classifier: self.classifier,
            train_x: self.train_x,
            train_y: self.train_y,
            test_x: self.test_x,
            feature_names,
            train_matrix,
            test_matrix,
            policy,
            num_samples: self.num_samples,
            parallel: self.parallel,
            instance_budget: self.instance_budget,
        })
    }
}
