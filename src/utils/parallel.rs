//! Parallel processing utilities

use crate::error::{LimebagError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Number of threads (None = use all available)
    pub n_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Run on the calling thread only
    pub fn sequential() -> Self {
        Self { n_threads: Some(1) }
    }

    /// Set number of threads
    pub fn with_threads(mut self, n: usize) -> Self {
        self.n_threads = Some(n);
        self
    }

    /// Get the number of threads to use
    pub fn num_threads(&self) -> usize {
        self.n_threads.unwrap_or_else(rayon::current_num_threads)
    }

    /// Build a dedicated pool sized by this configuration
    pub fn build_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads())
            .build()
            .map_err(|e| LimebagError::ConfigError(format!("cannot build thread pool: {}", e)))
    }
}

/// Map `f` over `0..n` in parallel; results come back in index order
/// regardless of completion order.
pub fn ordered_map<U, F>(n: usize, config: &ParallelConfig, f: F) -> Result<Vec<U>>
where
    U: Send,
    F: Fn(usize) -> U + Send + Sync,
{
    if config.num_threads() <= 1 {
        return Ok((0..n).map(f).collect());
    }
    let pool = config.build_pool()?;
    Ok(pool.install(|| (0..n).into_par_iter().map(f).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_map_preserves_order() {
        let config = ParallelConfig::new().with_threads(4);
        let results = ordered_map(1000, &config, |i| i * 2).unwrap();

        assert_eq!(results.len(), 1000);
        assert_eq!(results[0], 0);
        assert_eq!(results[500], 1000);
        assert!(results.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let seq = ordered_map(64, &ParallelConfig::sequential(), |i| i * i).unwrap();
        let par = ordered_map(64, &ParallelConfig::new().with_threads(3), |i| i * i).unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn test_parallel_config() {
        let config = ParallelConfig::new().with_threads(4);
        assert_eq!(config.n_threads, Some(4));
        assert_eq!(config.num_threads(), 4);
        assert!(ParallelConfig::new().num_threads() >= 1);
    }
}
