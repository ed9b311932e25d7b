use crate::aggregate::RankProfiles;
use crate::config::SensitiveHit;
use crate::explanation::{InstanceExplanation, IntegrityViolation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Verdict for one audited instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub instance_index: usize,
    pub is_fair: bool,
    /// First sensitive feature found in the top-K, if any
    pub offense: Option<SensitiveHit>,
    pub explanation: InstanceExplanation,
}

impl AuditResult {
    pub fn offending_feature(&self) -> Option<usize> {
        self.offense.map(|hit| hit.feature_index)
    }
}

/// Why an instance produced no verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    OracleFailure { message: String },
    Integrity { violation: IntegrityViolation },
    OverBudget { elapsed_ms: u64, budget_ms: u64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::OracleFailure { message } => write!(f, "oracle failed: {}", message),
            SkipReason::Integrity { violation } => write!(f, "malformed explanation: {}", violation),
            SkipReason::OverBudget { elapsed_ms, budget_ms } => {
                write!(f, "took {} ms, budget is {} ms", elapsed_ms, budget_ms)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedInstance {
    pub instance_index: usize,
    pub reason: SkipReason,
}

/// Everything one audit pass produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub total_instances: usize,
    /// Verdicts with `is_fair == false`
    pub violation_count: usize,
    /// Verdicts in instance order, skipped instances omitted
    pub results: Vec<AuditResult>,
    pub skipped: Vec<SkippedInstance>,
    pub profiles: RankProfiles,
}

impl AuditRun {
    pub fn unfair(&self) -> impl Iterator<Item = &AuditResult> {
        self.results.iter().filter(|r| !r.is_fair)
    }

    pub fn processed(&self) -> usize {
        self.results.len()
    }

    pub fn violation_rate(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.violation_count as f64 / self.results.len() as f64
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            elapsed_ms: self.elapsed_ms,
            total_instances: self.total_instances,
            processed: self.processed(),
            skipped: self.skipped.len(),
            violation_count: self.violation_count,
            violation_rate: self.violation_rate(),
            unfair_instances: self.unfair().map(|r| r.instance_index).collect(),
        }
    }
}

/// Compact, serializable overview of an [`AuditRun`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub total_instances: usize,
    pub processed: usize,
    pub skipped: usize,
    pub violation_count: usize,
    pub violation_rate: f64,
    pub unfair_instances: Vec<usize>,
}
