//! limebag - fairness auditing over local feature-attribution explanations
//!
//! For every row of a test table an explanation oracle ranks the features by
//! how much they drove the classifier's prediction. The auditor flags rows
//! where a sensitive feature appears among the top `k`, then transposes the
//! rankings into per-feature rank and magnitude profiles that are exported
//! as flat tables for statistical comparison.
//!
//! # Modules
//!
//! - [`config`] - Validated audit configuration and the top-K policy
//! - [`oracle`] - Classifier and oracle traits, bundled LIME-style tabular oracle
//! - [`explanation`] - Per-instance ranked attributions
//! - [`auditor`] - Per-instance verdicts and full audit runs
//! - [`observer`] - Structured verdict events
//! - [`aggregate`] - Per-feature rank/magnitude profiles
//! - [`report`] - Report tables and statistical reporters
//! - [`utils`] - Data loading and parallel helpers
//! - [`cli`] - Command-line interface

pub mod error;

pub mod aggregate;
pub mod auditor;
pub mod config;
pub mod explanation;
pub mod observer;
pub mod oracle;
pub mod report;

pub mod cli;
pub mod utils;

pub use error::{LimebagError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::aggregate::{FeatureRankProfile, ProfileSummary, RankAggregator, RankProfiles};
    pub use crate::auditor::{AuditResult, AuditRun, FairnessAuditor, ReplayAuditor, SkipReason};
    pub use crate::config::{AuditConfig, AuditSettings, SensitiveHit, TopKPolicy};
    pub use crate::error::{LimebagError, Result};
    pub use crate::explanation::{FeatureAttribution, InstanceExplanation, IntegrityViolation};
    pub use crate::observer::{AuditObserver, CollectingObserver, NullObserver, TracingObserver, VerdictEvent};
    pub use crate::oracle::{
        Discretizer, ExplanationOracle, LimeSettings, LimeTabularOracle, ProbabilisticClassifier,
    };
    pub use crate::report::{
        export, parse_table, write_report, ExportMode, ExportOptions, MedianSummaryReporter,
        StatisticalReporter,
    };
    pub use crate::utils::{DataLoader, ParallelConfig};
}
