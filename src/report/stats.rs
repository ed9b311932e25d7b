//! Group comparison over report tables

use super::parse_table;
use crate::error::{LimebagError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Write as _;

/// Consumer of a serialized report table.
///
/// Implementations rank the feature groups of `table` and render the result;
/// `higher_is_better` tells them which direction is more important and
/// `emit_markup` asks for a markup table instead of plain text.
pub trait StatisticalReporter {
    fn compare(&self, table: &str, higher_is_better: bool, emit_markup: bool) -> Result<String>;
}

/// Descriptive statistics of one feature group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub name: String,
    pub n: usize,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub mean: f64,
}

impl GroupSummary {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    fn from_values(name: String, values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mean = if sorted.is_empty() {
            f64::NAN
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };
        Self {
            name,
            n: sorted.len(),
            median: quantile(&sorted, 0.5),
            q1: quantile(&sorted, 0.25),
            q3: quantile(&sorted, 0.75),
            mean,
        }
    }
}

/// Linear-interpolation quantile of sorted data; NaN when empty
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Ranks feature groups by median, without significance testing
#[derive(Debug, Clone, Copy, Default)]
pub struct MedianSummaryReporter;

impl MedianSummaryReporter {
    pub fn new() -> Self {
        Self
    }

    /// Per-group statistics ordered from most to least important.
    /// Empty groups go last; equal medians keep table order.
    pub fn summarize(&self, table: &str, higher_is_better: bool) -> Result<Vec<GroupSummary>> {
        let groups = parse_table(table)?;
        if groups.is_empty() {
            return Err(LimebagError::InvalidInput("report table is empty".to_string()));
        }

        let mut summaries: Vec<GroupSummary> = groups
            .into_iter()
            .map(|(name, values)| GroupSummary::from_values(name, &values))
            .collect();

        summaries.sort_by(|a, b| match (a.median.is_nan(), b.median.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = a.median.partial_cmp(&b.median).unwrap_or(Ordering::Equal);
                if higher_is_better {
                    ord.reverse()
                } else {
                    ord
                }
            }
        });
        Ok(summaries)
    }
}

fn fmt_stat(v: f64) -> String {
    if v.is_nan() {
        "-".to_string()
    } else {
        format!("{:.4}", v)
    }
}

impl StatisticalReporter for MedianSummaryReporter {
    fn compare(&self, table: &str, higher_is_better: bool, emit_markup: bool) -> Result<String> {
        let summaries = self.summarize(table, higher_is_better)?;
        let mut out = String::new();

        if emit_markup {
            out.push_str("| Rank | Feature | N | Median | IQR | Mean |\n");
            out.push_str("|---:|---|---:|---:|---:|---:|\n");
            for (i, s) in summaries.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "| {} | {} | {} | {} | {} | {} |",
                    i + 1,
                    s.name.replace('|', "\\|"),
                    s.n,
                    fmt_stat(s.median),
                    fmt_stat(s.iqr()),
                    fmt_stat(s.mean)
                );
            }
        } else {
            let width = summaries.iter().map(|s| s.name.len()).max().unwrap_or(0).max(7);
            let _ = writeln!(
                out,
                "{:>4}  {:<width$}  {:>5}  {:>10}  {:>10}  {:>10}",
                "rank", "feature", "n", "median", "iqr", "mean"
            );
            for (i, s) in summaries.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{:>4}  {:<width$}  {:>5}  {:>10}  {:>10}  {:>10}",
                    i + 1,
                    s.name,
                    s.n,
                    fmt_stat(s.median),
                    fmt_stat(s.iqr()),
                    fmt_stat(s.mean)
                );
            }
        }
        Ok(out)
    }
}
