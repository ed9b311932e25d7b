//! Data loading utilities

use crate::error::{LimebagError, Result};
use crate::explanation::InstanceExplanation;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Data loader for feature tables
pub struct DataLoader {
    /// Rows used for schema inference
    infer_schema_rows: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self { infer_schema_rows: 100 }
    }

    /// Set the number of rows used for schema inference
    pub fn with_infer_schema_rows(mut self, n: usize) -> Self {
        self.infer_schema_rows = n;
        self
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let file = File::open(path.as_ref())
            .map_err(|e| LimebagError::DataError(format!("{}: {}", path.as_ref().display(), e)))?;

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_rows))
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| LimebagError::DataError(e.to_string()))
    }

    /// Load recorded oracle output, one explanation per test row
    pub fn load_explanations(&self, path: impl AsRef<Path>) -> Result<Vec<InstanceExplanation>> {
        let json = std::fs::read_to_string(path.as_ref())?;
        RecordedExplanations::from_json(&json)
    }
}

/// One recorded explanation, either as `[[index, weight], ...]`
/// or as `[{"feature_index": .., "weight": ..}, ...]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RecordedExplanation {
    Pairs(Vec<(usize, f64)>),
    Objects(InstanceExplanation),
}

/// Recorded oracle output for a whole test table
pub struct RecordedExplanations;

impl RecordedExplanations {
    /// Parse a JSON array of recorded explanations
    pub fn from_json(json: &str) -> Result<Vec<InstanceExplanation>> {
        let records: Vec<RecordedExplanation> = serde_json::from_str(json)?;
        Ok(records
            .into_iter()
            .map(|r| match r {
                RecordedExplanation::Pairs(pairs) => InstanceExplanation::from_pairs(pairs),
                RecordedExplanation::Objects(exp) => exp,
            })
            .collect())
    }

    /// Serialize explanations in the pair layout
    pub fn to_json(explanations: &[InstanceExplanation]) -> Result<String> {
        let records: Vec<Vec<(usize, f64)>> = explanations
            .iter()
            .map(|e| e.iter().map(|a| (a.feature_index, a.weight)).collect())
            .collect();
        Ok(serde_json::to_string_pretty(&records)?)
    }
}
