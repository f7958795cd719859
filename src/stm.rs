//! Main entry point for the STM engine.
//!
//! This module provides the `Stm` struct, a cheaply clonable handle on one
//! engine instance, and `StmBuilder` for configuring it.

use crate::error::{Error, Result};
use crate::reclaimer::ReclaimWorker;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;
use stm_concurrency::{
    CommitObserver, MetricsSnapshot, NestedTxnFactory, ObjectRegistry, StmHooks, SuspendToken,
    Transaction, TransactionManager,
};
use stm_core::{CellValue, StmConfig, StmResult, TxnMode, Version};
use stm_primitives::AccumulatorCell;
use stm_storage::{ReclaimStats, VersionedCell};

static GLOBAL: Lazy<Stm> = Lazy::new(Stm::new);

/// An STM engine.
///
/// # Example
///
/// ```
/// use strata_stm::prelude::*;
///
/// let stm = Stm::new();
/// let balance = stm.new_cell(100i64);
///
/// stm.atomically(|txn| {
///     let current = txn.read(&balance)?;
///     txn.write(&balance, current - 30)
/// })?;
///
/// assert_eq!(balance.load(), 70);
/// # Ok::<(), strata_stm::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Stm {
    manager: TransactionManager,
}

impl Stm {
    /// Create an engine with default settings.
    pub fn new() -> Self {
        Self {
            manager: TransactionManager::default(),
        }
    }

    /// Create an engine from a configuration.
    pub fn with_config(config: StmConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Create a builder for engine configuration.
    pub fn builder() -> StmBuilder {
        StmBuilder::new()
    }

    /// The process-wide engine, created with default settings on first use.
    pub fn global() -> &'static Stm {
        &GLOBAL
    }

    /// The underlying transaction manager.
    pub fn manager(&self) -> &TransactionManager {
        &self.manager
    }

    // === Transactions ===

    /// Begin a top-level transaction.
    ///
    /// `read_only = true` starts speculatively; the first write upgrades it.
    pub fn begin(&self, read_only: bool) -> Transaction<'static> {
        self.manager.begin(read_only)
    }

    /// Begin a top-level transaction in an explicit mode.
    pub fn begin_with(&self, mode: TxnMode) -> Transaction<'static> {
        self.manager.begin_with(mode)
    }

    /// Run `body` atomically, retrying on conflict.
    ///
    /// The body may run several times; it should have no side effects
    /// outside the transaction.
    pub fn atomically<R>(
        &self,
        body: impl FnMut(&mut Transaction<'_>) -> StmResult<R>,
    ) -> Result<R> {
        self.manager.atomically(false, body).map_err(Error::from)
    }

    /// Like [`atomically`](Self::atomically), starting speculatively read-only.
    pub fn atomically_read_only<R>(
        &self,
        body: impl FnMut(&mut Transaction<'_>) -> StmResult<R>,
    ) -> Result<R> {
        self.manager.atomically(true, body).map_err(Error::from)
    }

    /// Park a transaction so that any thread can resume it.
    pub fn suspend(&self, txn: Transaction<'static>) -> Result<SuspendToken> {
        self.manager.suspend(txn).map_err(Error::from)
    }

    /// Take back a parked transaction.
    pub fn resume(&self, token: SuspendToken) -> Result<Transaction<'static>> {
        self.manager.resume(token).map_err(Error::from)
    }

    /// Abort a parked transaction.
    pub fn abort_suspended(&self, token: SuspendToken) -> Result<()> {
        self.manager.abort_suspended(token).map_err(Error::from)
    }

    // === Cells ===

    /// Create a versioned cell.
    pub fn new_cell<T: CellValue>(&self, initial: T) -> VersionedCell<T> {
        self.manager.new_cell(initial)
    }

    /// Create an accumulator cell merging updates with `combine`.
    pub fn new_accumulator<T: CellValue>(
        &self,
        initial: T,
        combine: impl Fn(&T, &T) -> T + Send + Sync + 'static,
    ) -> AccumulatorCell<T> {
        AccumulatorCell::with_base(self.manager.new_cell(initial), combine)
    }

    // === Reclamation ===

    /// Run one reclamation pass now.
    pub fn reclaim(&self) -> ReclaimStats {
        self.manager.reclaim()
    }

    /// Start a background thread reclaiming every `interval`.
    pub fn spawn_reclaimer(&self, interval: Duration) -> Result<ReclaimWorker> {
        ReclaimWorker::spawn(self.manager.clone(), interval)
    }

    /// Oldest version any live or parked transaction may still read.
    pub fn oldest_required_version(&self) -> Version {
        self.manager.oldest_required_version()
    }

    /// Version of the newest commit.
    pub fn current_version(&self) -> Version {
        self.manager.current_version()
    }

    /// Get engine metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.manager.metrics()
    }
}

impl Default for Stm {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for engine configuration.
///
/// # Example
///
/// ```
/// use strata_stm::Stm;
/// use std::time::Duration;
///
/// let stm = Stm::builder()
///     .parallelism(4)
///     .reclaim_every(256)
///     .max_retries(50)
///     .retry_backoff(Duration::from_micros(10))
///     .build()?;
/// # Ok::<(), strata_stm::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct StmBuilder {
    config: StmConfig,
    hooks: StmHooks,
}

impl StmBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: StmConfig) -> Self {
        self.config = config;
        self
    }

    /// Run parallel tasks on a dedicated pool of `threads` workers.
    pub fn parallelism(mut self, threads: usize) -> Self {
        self.config.parallelism = Some(threads);
        self
    }

    /// Reclaim inline after every `commits` read-write commits.
    pub fn reclaim_every(mut self, commits: u64) -> Self {
        self.config.reclaim_every_commits = Some(commits);
        self
    }

    /// Attempts made by `atomically` before giving up.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Sleep between `atomically` attempts.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    /// Notify `registry` of every cell created through the engine.
    pub fn object_registry(mut self, registry: Arc<dyn ObjectRegistry>) -> Self {
        self.hooks = self.hooks.with_registry(registry);
        self
    }

    /// Let `factory` choose the mode of nested and parallel children.
    pub fn nested_factory(mut self, factory: Arc<dyn NestedTxnFactory>) -> Self {
        self.hooks = self.hooks.with_nested_factory(factory);
        self
    }

    /// Show every read-write commit's write-set to `observer` first.
    pub fn commit_observer(mut self, observer: Arc<dyn CommitObserver>) -> Self {
        self.hooks = self.hooks.with_commit_observer(observer);
        self
    }

    /// Build the engine.
    pub fn build(self) -> Result<Stm> {
        let manager = TransactionManager::with_hooks(self.config, self.hooks)?;
        Ok(Stm { manager })
    }
}
