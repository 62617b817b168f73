//! src/builders/batch_builder.rs
//! Batch decryption settings: fixed-size pool, single deadline

use crate::consts::{DEFAULT_BATCH_TIMEOUT, DEFAULT_WORKERS};
use std::time::Duration;

/// Settings for [`decrypt_batch`](crate::batch_ops::decrypt_batch).
///
/// # Thread Safety
///
/// Plain data, `Copy`; every worker reads the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    workers: usize,
    timeout: Duration,
}

impl BatchConfig {
    #[must_use]
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::new()
    }

    /// Size of the worker pool (at least 1).
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Deadline for the whole batch, measured from submission.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::new().build()
    }
}

/// Fluent builder for [`BatchConfig`].
///
/// Defaults: [`DEFAULT_WORKERS`] workers and a [`DEFAULT_BATCH_TIMEOUT`] deadline.
#[derive(Debug, Clone)]
pub struct BatchConfigBuilder {
    workers: usize,
    timeout: Duration,
}

impl BatchConfigBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            timeout: DEFAULT_BATCH_TIMEOUT,
        }
    }

    /// Set the worker count (minimum 1)
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn build(self) -> BatchConfig {
        BatchConfig {
            workers: self.workers,
            timeout: self.timeout,
        }
    }
}

impl Default for BatchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.workers(), 6);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn workers_clamped_to_one() {
        let config = BatchConfig::builder()
            .with_workers(0)
            .with_timeout(Duration::from_millis(250))
            .build();
        assert_eq!(config.workers(), 1);
        assert_eq!(config.timeout(), Duration::from_millis(250));
    }
}
