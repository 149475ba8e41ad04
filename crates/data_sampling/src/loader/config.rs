//! Configuration for [`InterleavedLoader`](super::InterleavedLoader).
//!
//! ```ignore
//! let config = LoaderConfig::builder()
//!     .num_workers(4)
//!     .prefetch_factor(2)
//!     .seed(42)
//!     .build();
//! ```
//!
//! Memory: at most `num_workers * prefetch_factor` batches are in flight.

use crate::error::ensure_config;
use anyhow::Result;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Number of worker threads (0 = load on the calling thread)
    pub num_workers: usize,
    /// Batches in flight per worker (must be > 0 when using workers)
    pub prefetch_factor: usize,
    /// Base seed of the worker RNGs. A random seed is drawn when absent.
    pub seed: Option<u64>,
    /// Maximum time to wait for a batch from the workers. Default: 30s
    pub timeout: Duration,
    /// How often idle workers check for the shutdown signal. Default: 100ms
    pub worker_timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            num_workers: 0,
            prefetch_factor: 2,
            seed: None,
            timeout: Duration::from_secs(30),
            worker_timeout: Duration::from_millis(100),
        }
    }
}

impl LoaderConfig {
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder::default()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.num_workers > 0 {
            ensure_config!(
                self.prefetch_factor > 0,
                "prefetch_factor must be > 0 when using {} workers",
                self.num_workers
            );
        }
        ensure_config!(!self.timeout.is_zero(), "timeout must be > 0");
        Ok(())
    }

    /// Upper bound on batches sent to workers but not yet yielded.
    pub fn max_in_flight(&self) -> usize {
        self.num_workers * self.prefetch_factor
    }
}

#[derive(Default)]
pub struct LoaderConfigBuilder {
    config: LoaderConfig,
}

impl LoaderConfigBuilder {
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    pub fn prefetch_factor(mut self, factor: usize) -> Self {
        self.config.prefetch_factor = factor;
        self
    }

    /// Seeds worker `i` with `seed + (epoch << 32) + i`, where `epoch` is the
    /// sampler's start epoch. With `num_workers == 0` the calling thread's
    /// worker RNG is seeded for the lifetime of the iterator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// - Too low: may cancel batches during legitimate heavy processing.
    /// - Too high: delays detection of stuck workers.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn worker_timeout(mut self, worker_timeout: Duration) -> Self {
        self.config.worker_timeout = worker_timeout;
        self
    }

    pub fn build(self) -> LoaderConfig {
        self.config
    }
}
