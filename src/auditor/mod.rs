//! Fairness auditing over a test table
//!
//! The auditor asks the explanation oracle to rank the features of every test
//! row, then applies the [`TopKPolicy`]: a row is unfair when a sensitive
//! feature is among its `k` highest-ranked features. Rows are explained
//! independently (in parallel when configured) and merged back in row order,
//! so verdicts, events and profiles do not depend on scheduling.
//!
//! A row whose oracle call fails, returns a malformed ranking or overruns the
//! time budget is skipped with a warning; the rest of the run continues.

mod result;

pub use result::{AuditResult, AuditRun, RunSummary, SkipReason, SkippedInstance};

use crate::aggregate::RankAggregator;
use crate::config::{AuditConfig, TopKPolicy};
use crate::error::{LimebagError, Result};
use crate::explanation::InstanceExplanation;
use crate::observer::{AuditObserver, SkipEvent, TracingObserver, VerdictEvent};
use crate::oracle::{ExplanationOracle, LimeSettings, LimeTabularOracle};
use crate::utils::ordered_map;
use chrono::Utc;
use ndarray::{Array2, ArrayView1};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Outcome of explaining one row before the policy is applied
type Explained = std::result::Result<InstanceExplanation, SkipReason>;

/// Drives an explanation oracle over a test table and applies the top-K policy
pub struct FairnessAuditor<'a, O: ExplanationOracle> {
    config: AuditConfig<'a>,
    oracle: O,
    observer: Arc<dyn AuditObserver>,
    aggregator: RankAggregator,
}

impl<'a> FairnessAuditor<'a, LimeTabularOracle> {
    /// Build the bundled tabular oracle from the configuration's training data
    pub fn with_lime(config: AuditConfig<'a>, settings: LimeSettings) -> Result<Self> {
        let oracle = LimeTabularOracle::new(
            config.train_matrix(),
            config.train_y(),
            config.feature_names().to_vec(),
            settings,
        )
        .map_err(|e| match e {
            LimebagError::ConfigError(_) => e,
            other => LimebagError::ConfigError(format!("cannot build explanation oracle: {}", other)),
        })?;
        Self::new(config, oracle)
    }
}

impl<'a, O: ExplanationOracle> FairnessAuditor<'a, O> {
    pub fn new(config: AuditConfig<'a>, oracle: O) -> Result<Self> {
        let aggregator = RankAggregator::new(config.feature_names().to_vec())?;
        Ok(Self {
            config,
            oracle,
            observer: Arc::new(TracingObserver),
            aggregator,
        })
    }

    /// Replace the default `tracing` observer
    pub fn with_observer(mut self, observer: Arc<dyn AuditObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &AuditConfig<'a> {
        &self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Apply the top-K policy to an explanation
    pub fn judge(&self, instance_index: usize, explanation: InstanceExplanation) -> AuditResult {
        judge(self.config.policy(), instance_index, explanation)
    }

    /// Explain and judge a single row. Failures are returned as errors.
    pub fn audit(&self, instance_index: usize, row: ArrayView1<'_, f64>) -> Result<AuditResult> {
        match self.explain_row(row) {
            Ok(explanation) => {
                let result = self.judge(instance_index, explanation);
                self.observer
                    .on_verdict(&verdict_event(&result, self.config.n_test_instances(), self.config.feature_names()));
                Ok(result)
            }
            Err(SkipReason::Integrity { violation }) => Err(LimebagError::IntegrityError(format!(
                "instance {}: {}",
                instance_index, violation
            ))),
            Err(reason) => Err(LimebagError::OracleError {
                instance: instance_index,
                reason: reason.to_string(),
            }),
        }
    }

    /// Audit every row of the configured test table
    pub fn audit_all(&self) -> Result<AuditRun> {
        self.audit_table(self.config.test_matrix())
    }

    /// Audit every row of `test`, in row order
    pub fn audit_table(&self, test: &Array2<f64>) -> Result<AuditRun> {
        if test.ncols() != self.config.n_features() {
            return Err(LimebagError::ShapeError {
                expected: format!("{} feature columns", self.config.n_features()),
                actual: format!("{} columns", test.ncols()),
            });
        }

        let started_at = Utc::now();
        let clock = Instant::now();
        let outcomes = ordered_map(test.nrows(), self.config.parallel(), |i| self.explain_row(test.row(i)))?;
        debug!(
            instances = test.nrows(),
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "Oracle pass finished"
        );

        let mut run = assemble_run(
            outcomes,
            self.config.policy(),
            &self.aggregator,
            self.config.feature_names(),
            self.observer.as_ref(),
        )?;
        run.started_at = started_at;
        run.elapsed_ms = clock.elapsed().as_millis() as u64;
        Ok(run)
    }

    fn explain_row(&self, row: ArrayView1<'_, f64>) -> Explained {
        let classifier = self.config.classifier();
        let predict = |x: &Array2<f64>| classifier.predict_proba(x);
        let n_features = self.config.n_features();

        let clock = Instant::now();
        let explanation = self
            .oracle
            .explain(row, &predict, n_features, self.config.num_samples())
            .map_err(|e| SkipReason::OracleFailure { message: e.to_string() })?;
        let elapsed = clock.elapsed();

        if let Some(budget) = self.config.instance_budget() {
            if elapsed > budget {
                return Err(SkipReason::OverBudget {
                    elapsed_ms: elapsed.as_millis() as u64,
                    budget_ms: budget.as_millis() as u64,
                });
            }
        }

        explanation
            .validate(n_features)
            .map_err(|violation| SkipReason::Integrity { violation })?;
        Ok(explanation)
    }
}

/// Applies the top-K policy to explanations recorded from an earlier oracle run
pub struct ReplayAuditor {
    policy: TopKPolicy,
    feature_names: Vec<String>,
    aggregator: RankAggregator,
    observer: Arc<dyn AuditObserver>,
}

impl ReplayAuditor {
    /// `sensitive` and `k` are validated against `feature_names` like [`AuditConfig`]
    pub fn new<I>(feature_names: Vec<String>, sensitive: I, k: usize) -> Result<Self>
    where
        I: IntoIterator<Item = usize>,
    {
        let policy = TopKPolicy::new(sensitive, k, feature_names.len())?;
        let aggregator = RankAggregator::new(feature_names.clone())?;
        Ok(Self {
            policy,
            feature_names,
            aggregator,
            observer: Arc::new(TracingObserver),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn AuditObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn policy(&self) -> &TopKPolicy {
        &self.policy
    }

    /// Judge and aggregate recorded explanations, one per test row
    pub fn run(&self, explanations: Vec<InstanceExplanation>) -> Result<AuditRun> {
        let clock = Instant::now();
        let n_features = self.feature_names.len();
        let outcomes = explanations
            .into_iter()
            .map(|e| match e.validate(n_features) {
                Ok(()) => Ok(e),
                Err(violation) => Err(SkipReason::Integrity { violation }),
            })
            .collect();

        let mut run = assemble_run(
            outcomes,
            &self.policy,
            &self.aggregator,
            &self.feature_names,
            self.observer.as_ref(),
        )?;
        run.elapsed_ms = clock.elapsed().as_millis() as u64;
        Ok(run)
    }
}

fn judge(policy: &TopKPolicy, instance_index: usize, explanation: InstanceExplanation) -> AuditResult {
    let offense = policy.first_violation(&explanation);
    AuditResult {
        instance_index,
        is_fair: offense.is_none(),
        offense,
        explanation,
    }
}

fn verdict_event(result: &AuditResult, total_instances: usize, feature_names: &[String]) -> VerdictEvent {
    VerdictEvent {
        instance_index: result.instance_index,
        total_instances,
        is_fair: result.is_fair,
        offense: result.offense,
        offending_name: result
            .offense
            .and_then(|hit| feature_names.get(hit.feature_index).cloned()),
        ranking: result.explanation.feature_order(),
    }
}

/// Ordered reduce: judge, notify and aggregate outcomes in row order
fn assemble_run(
    outcomes: Vec<Explained>,
    policy: &TopKPolicy,
    aggregator: &RankAggregator,
    feature_names: &[String],
    observer: &dyn AuditObserver,
) -> Result<AuditRun> {
    let total_instances = outcomes.len();
    let mut results = Vec::with_capacity(total_instances);
    let mut skipped = Vec::new();

    for (instance_index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(explanation) => {
                let result = judge(policy, instance_index, explanation);
                observer.on_verdict(&verdict_event(&result, total_instances, feature_names));
                results.push(result);
            }
            Err(reason) => {
                observer.on_skip(&SkipEvent {
                    instance_index,
                    total_instances,
                    reason: reason.to_string(),
                });
                skipped.push(SkippedInstance { instance_index, reason });
            }
        }
    }

    let violation_count = results.iter().filter(|r| !r.is_fair).count();
    observer.on_complete(violation_count, total_instances);

    let profiles = aggregator
        .aggregate_indexed(results.iter().map(|r| (r.instance_index, &r.explanation)))?;

    Ok(AuditRun {
        run_id: Uuid::new_v4(),
        started_at: Utc::now(),
        elapsed_ms: 0,
        total_instances,
        violation_count,
        results,
        skipped,
        profiles,
    })
}
