//! Engine configuration

use crate::error::{StmError, StmResult};
use std::time::Duration;

/// Default retry budget for the `atomically` combinator
pub const DEFAULT_MAX_RETRIES: u32 = 1000;

/// Configuration for an STM engine
///
/// # Example
///
/// ```
/// use stm_core::StmConfig;
///
/// let config = StmConfig {
///     reclaim_every_commits: Some(64),
///     ..StmConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StmConfig {
    /// Worker threads for a dedicated parallel fan-out pool.
    ///
    /// `None` runs parallel tasks on rayon's global pool.
    pub parallelism: Option<usize>,

    /// Run an inline reclamation pass after every N successful commits.
    ///
    /// `None` leaves reclamation to explicit calls or a background worker.
    pub reclaim_every_commits: Option<u64>,

    /// Attempts made by `atomically` before giving up on a conflicting body
    pub max_retries: u32,

    /// Sleep between `atomically` attempts
    pub retry_backoff: Duration,
}

impl Default for StmConfig {
    fn default() -> Self {
        Self {
            parallelism: None,
            reclaim_every_commits: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::ZERO,
        }
    }
}

impl StmConfig {
    /// Reject configurations that can never work
    pub fn validate(&self) -> StmResult<()> {
        if self.parallelism == Some(0) {
            return Err(StmError::Config(
                "parallelism must be at least 1 thread".to_string(),
            ));
        }
        if self.reclaim_every_commits == Some(0) {
            return Err(StmError::Config(
                "reclaim_every_commits must be at least 1".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(StmError::Config("max_retries must be at least 1".to_string()));
        }
        Ok(())
    }
}
