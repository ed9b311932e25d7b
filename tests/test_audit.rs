//! Integration test: configuration → oracle → verdicts → profiles → report

use limebag::prelude::*;
use limebag::oracle::PredictFn;
use limebag::{LimebagError, Result};
use ndarray::{array, Array1, Array2, ArrayView1};
use polars::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Probability of class 1 rises steeply with feature 0 and ignores the rest
struct Threshold;

impl ProbabilisticClassifier for Threshold {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((x.nrows(), 2));
        for (i, row) in x.outer_iter().enumerate() {
            let p = 1.0 / (1.0 + (-12.0 * (row[0] - 0.5)).exp());
            out[[i, 0]] = 1.0 - p;
            out[[i, 1]] = p;
        }
        Ok(out)
    }
}

/// Returns a fixed explanation per row, keyed by the row's first value
struct Scripted {
    script: HashMap<usize, Vec<(usize, f64)>>,
    delay: Option<(usize, Duration)>,
}

impl Scripted {
    fn new(script: Vec<Vec<(usize, f64)>>) -> Self {
        Self {
            script: script.into_iter().enumerate().collect(),
            delay: None,
        }
    }
}

impl ExplanationOracle for Scripted {
    fn explain(
        &self,
        row: ArrayView1<'_, f64>,
        predict_fn: &PredictFn<'_>,
        _num_features: usize,
        _num_samples: usize,
    ) -> Result<InstanceExplanation> {
        predict_fn(&row.to_owned().insert_axis(ndarray::Axis(0)))?;
        let key = row[0] as usize;
        if let Some((slow, pause)) = self.delay {
            if key == slow {
                std::thread::sleep(pause);
            }
        }
        self.script
            .get(&key)
            .map(|pairs| InstanceExplanation::from_pairs(pairs.clone()))
            .ok_or_else(|| LimebagError::ComputationError(format!("no script for row {}", key)))
    }
}

fn train_table() -> (DataFrame, Array1<f64>) {
    let n = 40;
    let a: Vec<f64> = (0..n).map(|i| i as f64 / n as f64).collect();
    let b: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64 / 11.0).collect();
    let c: Vec<f64> = (0..n).map(|i| ((i * 3) % 5) as f64 / 5.0).collect();
    let y: Array1<f64> = a.iter().map(|&v| if v > 0.5 { 1.0 } else { 0.0 }).collect();
    let df = df!("A" => &a, "B" => &b, "C" => &c).unwrap();
    (df, y)
}

/// Column A carries the row number so the scripted oracle can find its entry
fn indexed_test_table(n: usize) -> DataFrame {
    let a: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let b: Vec<f64> = (0..n).map(|i| i as f64 * 0.1).collect();
    let c: Vec<f64> = (0..n).map(|i| 1.0 - i as f64 * 0.1).collect();
    df!("A" => &a, "B" => &b, "C" => &c).unwrap()
}

fn script() -> Vec<Vec<(usize, f64)>> {
    vec![
        vec![(2, 0.5), (1, 0.3), (0, 0.1)],
        vec![(1, 0.4), (0, 0.2), (2, 0.1)],
        vec![(0, -0.6), (1, 0.25), (2, 0.05)],
        vec![(2, 0.3), (0, -0.2), (1, 0.1)],
    ]
}

#[test]
fn test_example_a_and_b_verdicts() {
    let clf = Threshold;
    let (train, y) = train_table();
    let test = indexed_test_table(2);
    let config = AuditConfig::builder(&clf, &train, &y, &test)
        .sensitive(vec![1])
        .top_k(1)
        .build()
        .unwrap();
    let auditor = FairnessAuditor::new(config, Scripted::new(script())).unwrap();

    let a = auditor.judge(0, InstanceExplanation::from_pairs(vec![(2, 0.5), (1, 0.3), (0, 0.1)]));
    assert!(a.is_fair);
    assert_eq!(a.offending_feature(), None);

    let b = auditor.judge(1, InstanceExplanation::from_pairs(vec![(1, 0.4), (0, 0.2), (2, 0.1)]));
    assert!(!b.is_fair);
    assert_eq!(b.offending_feature(), Some(1));
}

#[test]
fn test_example_c_and_d_profiles_and_export() {
    let names = vec!["A".to_string(), "B".to_string(), "C".to_string()];
    let exps = vec![
        InstanceExplanation::from_pairs(vec![(2, 0.5), (1, 0.3), (0, 0.1)]),
        InstanceExplanation::from_pairs(vec![(1, 0.4), (0, 0.2), (2, 0.1)]),
    ];
    let profiles = RankAggregator::new(names).unwrap().aggregate(&exps).unwrap();

    let b = profiles.by_name("B").unwrap();
    assert_eq!(b.ranks, vec![1, 0]);
    assert_eq!(b.magnitudes, vec![0.3, 0.4]);

    let single = RankAggregator::new(vec!["A".to_string()])
        .unwrap()
        .aggregate(&vec![
            InstanceExplanation::from_pairs(vec![(0, 0.5)]),
            InstanceExplanation::from_pairs(vec![(0, -0.2)]),
        ])
        .unwrap();
    let text = export(&single, ExportMode::Values, &ExportOptions::default()).unwrap();
    assert_eq!(text, "A\n0.5000 0.2000");
}

#[test]
fn test_policy_boundaries() {
    let clf = Threshold;
    let (train, y) = train_table();
    let test = indexed_test_table(4);

    // K = 0: nothing is ever in the top-K
    let config = AuditConfig::builder(&clf, &train, &y, &test)
        .sensitive(vec![0, 1, 2])
        .top_k(0)
        .build()
        .unwrap();
    let run = FairnessAuditor::new(config, Scripted::new(script()))
        .unwrap()
        .with_observer(Arc::new(NullObserver))
        .audit_all()
        .unwrap();
    assert_eq!(run.violation_count, 0);
    assert!(run.results.iter().all(|r| r.is_fair));

    // No sensitive set: policy disabled for any K
    let config = AuditConfig::builder(&clf, &train, &y, &test).top_k(3).build().unwrap();
    let run = FairnessAuditor::new(config, Scripted::new(script()))
        .unwrap()
        .with_observer(Arc::new(NullObserver))
        .audit_all()
        .unwrap();
    assert_eq!(run.violation_count, 0);

    // K = F with a sensitive feature: every instance is unfair
    let config = AuditConfig::builder(&clf, &train, &y, &test)
        .sensitive(vec![2])
        .top_k(3)
        .build()
        .unwrap();
    let run = FairnessAuditor::new(config, Scripted::new(script()))
        .unwrap()
        .with_observer(Arc::new(NullObserver))
        .audit_all()
        .unwrap();
    assert_eq!(run.violation_count, 4);
}

#[test]
fn test_first_match_in_rank_order() {
    let clf = Threshold;
    let (train, y) = train_table();
    let test = indexed_test_table(4);
    let config = AuditConfig::builder(&clf, &train, &y, &test)
        .sensitive(vec![0, 1])
        .top_k(2)
        .build()
        .unwrap();
    let run = FairnessAuditor::new(config, Scripted::new(script()))
        .unwrap()
        .with_observer(Arc::new(NullObserver))
        .audit_all()
        .unwrap();

    let hits: Vec<Option<(usize, usize)>> = run
        .results
        .iter()
        .map(|r| r.offense.map(|h| (h.feature_index, h.rank)))
        .collect();
    assert_eq!(hits, vec![Some((1, 1)), Some((1, 0)), Some((0, 0)), Some((0, 1))]);
}

#[test]
fn test_failed_instances_are_isolated() {
    let clf = Threshold;
    let (train, y) = train_table();
    let test = indexed_test_table(6);
    let mut rows = script();
    // row 4 is malformed, row 5 has no script and fails in the oracle
    rows.push(vec![(1, 0.4), (1, 0.2), (2, 0.1)]);

    let config = AuditConfig::builder(&clf, &train, &y, &test)
        .sensitive(vec![1])
        .build()
        .unwrap();
    let observer = Arc::new(CollectingObserver::new());
    let run = FairnessAuditor::new(config, Scripted::new(rows))
        .unwrap()
        .with_observer(observer.clone())
        .audit_all()
        .unwrap();

    assert_eq!(run.total_instances, 6);
    assert_eq!(run.skipped.len(), 2);
    assert!(matches!(run.skipped[0].reason, SkipReason::Integrity { .. }));
    assert!(matches!(run.skipped[1].reason, SkipReason::OracleFailure { .. }));

    for (_, profile) in run.profiles.iter() {
        assert_eq!(profile.len(), run.total_instances - run.skipped.len());
        assert!(profile.ranks.iter().all(|&r| r < 3));
    }
    assert!(run.violation_count <= run.total_instances);
    assert_eq!(observer.verdicts().len(), 4);
    assert_eq!(observer.skips().len(), 2);
}

#[test]
fn test_all_instances_skipped() {
    let clf = Threshold;
    let (train, y) = train_table();
    let test = indexed_test_table(3);
    let mut rows = script();
    rows.truncate(1);
    rows[0] = vec![(0, 0.3), (0, 0.2), (2, 0.1)];

    let config = AuditConfig::builder(&clf, &train, &y, &test)
        .sensitive(vec![1])
        .build()
        .unwrap();
    let run = FairnessAuditor::new(config, Scripted::new(rows))
        .unwrap()
        .with_observer(Arc::new(NullObserver))
        .audit_all()
        .unwrap();

    assert_eq!(run.processed(), 0);
    assert_eq!(run.skipped.len(), 3);
    assert_eq!(run.violation_count, 0);
    assert_eq!(run.profiles.n_instances(), 0);

    let dir = tempfile::tempdir().unwrap();
    let err = write_report(&run.profiles, ExportMode::Ranks, dir.path(), &ExportOptions::default())
        .unwrap_err();
    assert!(matches!(err, LimebagError::DataError(ref msg) if msg.contains("no instance was aggregated")));
    assert!(!dir.path().join("lime_rank.txt").exists());
}

#[test]
fn test_parallel_matches_sequential() {
    let clf = Threshold;
    let (train, y) = train_table();
    let test = indexed_test_table(4);

    let audit = |parallel: ParallelConfig| {
        let config = AuditConfig::builder(&clf, &train, &y, &test)
            .sensitive(vec![1])
            .top_k(2)
            .parallel(parallel)
            .build()
            .unwrap();
        FairnessAuditor::new(config, Scripted::new(script()))
            .unwrap()
            .with_observer(Arc::new(NullObserver))
            .audit_all()
            .unwrap()
    };

    let sequential = audit(ParallelConfig::sequential());
    let parallel = audit(ParallelConfig::new().with_threads(4));

    assert_eq!(sequential.results, parallel.results);
    assert_eq!(sequential.profiles, parallel.profiles);
    assert_eq!(sequential.violation_count, parallel.violation_count);
}

#[test]
fn test_slow_instance_over_budget_is_skipped() {
    let clf = Threshold;
    let (train, y) = train_table();
    let test = indexed_test_table(4);
    let mut oracle = Scripted::new(script());
    oracle.delay = Some((2, Duration::from_millis(300)));

    let config = AuditConfig::builder(&clf, &train, &y, &test)
        .instance_budget(Duration::from_millis(100))
        .build()
        .unwrap();
    let run = FairnessAuditor::new(config, oracle)
        .unwrap()
        .with_observer(Arc::new(NullObserver))
        .audit_all()
        .unwrap();

    assert_eq!(run.skipped.len(), 1);
    assert_eq!(run.skipped[0].instance_index, 2);
    assert!(matches!(run.skipped[0].reason, SkipReason::OverBudget { budget_ms: 100, .. }));
    assert_eq!(run.profiles.instance_indices(), &[0, 1, 3]);
}

#[test]
fn test_report_files_written() {
    let clf = Threshold;
    let (train, y) = train_table();
    let test = indexed_test_table(2);
    let config = AuditConfig::builder(&clf, &train, &y, &test).build().unwrap();
    let run = FairnessAuditor::new(config, Scripted::new(script()))
        .unwrap()
        .with_observer(Arc::new(NullObserver))
        .audit_all()
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let options = ExportOptions::default();
    let ranks = write_report(&run.profiles, ExportMode::Ranks, dir.path(), &options).unwrap();
    let values = write_report(&run.profiles, ExportMode::Values, dir.path(), &options).unwrap();

    assert_eq!(std::fs::read_to_string(ranks).unwrap(), "A\n2 1\nB\n1 0\nC\n0 2");
    let text = std::fs::read_to_string(values).unwrap();
    assert_eq!(text, "A\n0.1000 0.2000\nB\n0.3000 0.4000\nC\n0.5000 0.1000");

    let summary = MedianSummaryReporter.compare(&text, true, false).unwrap();
    assert!(summary.lines().nth(1).unwrap().contains(" B "));
}

#[test]
fn test_lime_oracle_end_to_end() {
    let clf = Threshold;
    let (train, y) = train_table();
    let test = df!(
        "A" => &[0.2, 0.45, 0.55, 0.8],
        "B" => &[0.5, 0.1, 0.9, 0.3],
        "C" => &[0.4, 0.6, 0.2, 0.8],
    )
    .unwrap();

    let audit = |threads: usize| {
        let config = AuditConfig::builder(&clf, &train, &y, &test)
            .sensitive(vec![0])
            .top_k(1)
            .num_samples(800)
            .parallel(ParallelConfig::new().with_threads(threads))
            .build()
            .unwrap();
        let settings = LimeSettings::default()
            .with_discretizer(Discretizer::None)
            .with_seed(7);
        let auditor = FairnessAuditor::with_lime(config, settings).unwrap();
        assert_eq!(auditor.oracle().n_features(), 3);
        assert_eq!(auditor.oracle().feature_names(), ["A", "B", "C"]);
        auditor
            .with_observer(Arc::new(NullObserver))
            .audit_all()
            .unwrap()
    };

    let run = audit(1);
    assert!(run.skipped.is_empty());
    assert_eq!(run.violation_count, 4);
    for result in &run.results {
        assert_eq!(result.explanation.len(), 3);
        assert_eq!(result.explanation.feature_order()[0], 0);
    }

    let again = audit(3);
    assert_eq!(run.profiles, again.profiles);
}

#[test]
fn test_config_rejects_bad_k() {
    let clf = Threshold;
    let (train, y) = train_table();
    let test = indexed_test_table(2);
    let err = AuditConfig::builder(&clf, &train, &y, &test)
        .sensitive(vec![1])
        .top_k(5)
        .build()
        .unwrap_err();
    assert!(matches!(err, LimebagError::ConfigError(_)));

    let err = AuditConfig::builder(&clf, &train, &y, &test)
        .sensitive(vec![3])
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("out of range"));
}

#[test]
fn test_single_row_audit() {
    let clf = Threshold;
    let (train, y) = train_table();
    let test = indexed_test_table(2);
    let config = AuditConfig::builder(&clf, &train, &y, &test)
        .sensitive(vec![2])
        .build()
        .unwrap();
    let auditor = FairnessAuditor::new(config, Scripted::new(script())).unwrap();

    let result = auditor.audit(0, array![0.0, 0.0, 1.0].view()).unwrap();
    assert!(!result.is_fair);
    assert_eq!(result.offense, Some(SensitiveHit { feature_index: 2, rank: 0 }));
}
