//! Report serialization
//!
//! A report table holds one block per feature, in table column order: the
//! feature name on one line and its per-instance sequence on the next,
//! numbers separated by single spaces. Ranks are written as integers, values
//! as magnitudes rounded to four decimals:
//!
//! ```text
//! A
//! 0.5000 0.2000
//! B
//! 0.3000 0.4000
//! ```
//!
//! Blocks are joined by a single line break. Whether the table ends with one
//! is set by [`ExportOptions::trailing_newline`] (off by default).

mod stats;

pub use stats::{GroupSummary, MedianSummaryReporter, StatisticalReporter};

use crate::aggregate::RankProfiles;
use crate::error::{LimebagError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Which per-instance sequence to serialize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    Ranks,
    Values,
}

impl ExportMode {
    pub const ALL: [ExportMode; 2] = [ExportMode::Ranks, ExportMode::Values];

    /// File name used by [`write_report`]
    pub fn file_name(&self) -> &'static str {
        match self {
            ExportMode::Ranks => "lime_rank.txt",
            ExportMode::Values => "lime_val.txt",
        }
    }

    /// Whether larger numbers mean a more important feature
    pub fn higher_is_better(&self) -> bool {
        matches!(self, ExportMode::Values)
    }
}

impl FromStr for ExportMode {
    type Err = LimebagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ranks" | "rank" => Ok(ExportMode::Ranks),
            "values" | "value" => Ok(ExportMode::Values),
            _ => Err(LimebagError::InvalidInput(
                "Expected type to be either values or ranks".to_string(),
            )),
        }
    }
}

impl std::fmt::Display for ExportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportMode::Ranks => write!(f, "ranks"),
            ExportMode::Values => write!(f, "values"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOptions {
    pub trailing_newline: bool,
}

impl ExportOptions {
    pub fn with_trailing_newline(mut self, trailing_newline: bool) -> Self {
        self.trailing_newline = trailing_newline;
        self
    }
}

/// Round to four decimals and format with exactly four
fn format_value(value: f64) -> String {
    format!("{:.4}", (value * 1e4).round() / 1e4)
}

/// Refuse profiles that cannot describe a finished aggregation, or that hold no instance
fn ensure_exportable(profiles: &RankProfiles) -> Result<()> {
    if profiles.feature_names().len() != profiles.n_features() {
        return Err(LimebagError::StateError(format!(
            "profile has {} features but {} names",
            profiles.n_features(),
            profiles.feature_names().len()
        )));
    }
    for (name, profile) in profiles.iter() {
        if profile.len() != profiles.n_instances() || profile.magnitudes.len() != profile.len() {
            return Err(LimebagError::StateError(format!(
                "profile for '{}' has {} entries, expected {}",
                name,
                profile.len(),
                profiles.n_instances()
            )));
        }
        if name.contains('\n') || name.contains('\r') {
            return Err(LimebagError::InvalidInput(format!(
                "feature name {:?} contains a line break",
                name
            )));
        }
    }
    if profiles.n_instances() == 0 {
        return Err(LimebagError::DataError(format!(
            "nothing to export: no instance was aggregated ({} malformed explanations excluded)",
            profiles.excluded().len()
        )));
    }
    Ok(())
}

/// Serialize aggregated profiles as a report table
pub fn export(profiles: &RankProfiles, mode: ExportMode, options: &ExportOptions) -> Result<String> {
    ensure_exportable(profiles)?;

    let mut blocks = Vec::with_capacity(profiles.n_features());
    for (name, profile) in profiles.iter() {
        let numbers: Vec<String> = match mode {
            ExportMode::Ranks => profile.ranks.iter().map(|r| r.to_string()).collect(),
            ExportMode::Values => profile.magnitudes.iter().map(|&m| format_value(m)).collect(),
        };
        blocks.push(format!("{}\n{}", name, numbers.join(" ")));
    }

    let mut text = blocks.join("\n");
    if options.trailing_newline {
        text.push('\n');
    }
    Ok(text)
}

/// Write the table for `mode` into `dir`, returning the file path
pub fn write_report(
    profiles: &RankProfiles,
    mode: ExportMode,
    dir: impl AsRef<Path>,
    options: &ExportOptions,
) -> Result<PathBuf> {
    let text = export(profiles, mode, options)?;
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let path = dir.join(mode.file_name());
    std::fs::write(&path, text)?;
    info!(path = %path.display(), mode = %mode, features = profiles.n_features(), "Report written");
    Ok(path)
}

/// Read a report table back into `(feature name, numbers)` groups
pub fn parse_table(text: &str) -> Result<Vec<(String, Vec<f64>)>> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() % 2 != 0 {
        return Err(LimebagError::InvalidInput(format!(
            "report table has {} lines; expected name/values pairs",
            lines.len()
        )));
    }

    lines
        .chunks(2)
        .enumerate()
        .map(|(block, pair)| {
            let name = pair[0].trim();
            if name.is_empty() {
                return Err(LimebagError::InvalidInput(format!(
                    "empty feature name on line {}",
                    block * 2 + 1
                )));
            }
            let numbers = pair[1]
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<f64>().map_err(|_| {
                        LimebagError::InvalidInput(format!(
                            "invalid number '{}' on line {}",
                            tok,
                            block * 2 + 2
                        ))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            Ok((name.to_string(), numbers))
        })
        .collect()
}
