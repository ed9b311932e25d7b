//! File-based audit settings

use super::{DEFAULT_NUM_SAMPLES, DEFAULT_TOP_K};
use crate::error::Result;
use crate::oracle::{Discretizer, LimeSettings};
use crate::utils::ParallelConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Audit settings as stored in a JSON file. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// Number of top-ranked features checked for sensitive features
    pub top_k: usize,
    /// Indices of sensitive features
    pub sensitive: Vec<usize>,
    /// Perturbed samples per oracle call
    pub num_samples: usize,
    /// Worker threads (None = all cores)
    pub n_threads: Option<usize>,
    /// Soft per-instance time budget in milliseconds
    pub instance_budget_ms: Option<u64>,
    /// End the exported table with a line break
    pub trailing_newline: bool,
    /// Oracle seed
    pub seed: Option<u64>,
    pub discretizer: Discretizer,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            sensitive: Vec::new(),
            num_samples: DEFAULT_NUM_SAMPLES,
            n_threads: None,
            instance_budget_ms: None,
            trailing_newline: false,
            seed: None,
            discretizer: Discretizer::default(),
        }
    }
}

impl AuditSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn parallel(&self) -> ParallelConfig {
        ParallelConfig { n_threads: self.n_threads }
    }

    pub fn instance_budget(&self) -> Option<Duration> {
        self.instance_budget_ms.map(Duration::from_millis)
    }

    /// Oracle settings derived from this file
    pub fn lime_settings(&self) -> LimeSettings {
        let mut settings = LimeSettings::default().with_discretizer(self.discretizer);
        settings.seed = self.seed;
        settings
    }
}
