//! Transaction manager and commit protocol
//!
//! The manager owns the engine state every transaction shares: the commit
//! lock, the commit sequence, the reclaimer, hooks and metrics.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Nothing buffered?  finish as a read-only commit, no lock taken
//! 2. before_commit()    commit observer may veto (outside the lock)
//! 3. lock commit_lock
//! 4. validate           every read-set entry must still be the newest version
//! 5. IF stale:          abort and return Conflict, nothing published
//! 6. version = head + 1 (every target cell must still be behind it)
//! 7. publish            install every write, then fold every delta, at `version`
//! 8. append record      the new record becomes the head of the sequence
//! 9. unlock, release the snapshot anchor, maybe run inline reclamation
//! ```
//!
//! The commit section runs no caller code: observers run before it and
//! deltas only call their `combine` function on values already in memory.
//! A failure inside it is an internal error; the transaction is aborted and
//! the sequence still advances past any cell already installed.

use crate::hooks::StmHooks;
use crate::metrics::{MetricsSnapshot, TxnMetrics};
use crate::transaction::{CommitInfo, Transaction};
use dashmap::DashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stm_core::{
    CellId, CellValue, ConflictKind, StmConfig, StmError, StmResult, TransactionStatus, TxnId,
    TxnMode, Version,
};
use stm_storage::{CommitSequence, ReclaimStats, Reclaimer, VersionedCell};

/// State shared by the manager and every transaction it begins
pub(crate) struct EngineShared {
    pub(crate) config: StmConfig,
    /// Serializes validation and publication
    commit_lock: Mutex<()>,
    pub(crate) sequence: CommitSequence,
    reclaimer: Reclaimer,
    next_txn_id: AtomicU64,
    pub(crate) metrics: TxnMetrics,
    pub(crate) hooks: StmHooks,
    /// Dedicated fan-out pool; `None` uses rayon's global pool
    pool: Option<rayon::ThreadPool>,
}

impl EngineShared {
    pub(crate) fn next_txn_id(&self) -> TxnId {
        TxnId::new(self.next_txn_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub(crate) fn new_cell<T: CellValue>(&self, initial: T) -> VersionedCell<T> {
        let cell = VersionedCell::new(initial);
        self.hooks.register(cell.id());
        cell
    }

    /// Run `op` inside the fan-out pool
    pub(crate) fn fan_out<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    pub(crate) fn reclaim(&self) -> ReclaimStats {
        let stats = self.reclaimer.run(&self.sequence);
        self.metrics.record_reclaim(stats.versions_discarded);
        stats
    }

    /// Commit a top-level transaction
    pub(crate) fn commit(&self, txn: &mut Transaction<'_>) -> StmResult<CommitInfo> {
        let txn_id = txn.id;
        if txn.writes.is_empty() && txn.deltas.is_empty() {
            txn.finish(TransactionStatus::Committed);
            self.metrics.record_commit(true);
            tracing::trace!(txn_id = %txn_id, "read-only commit");
            return Ok(CommitInfo {
                txn_id,
                version: txn.snapshot,
                writes: 0,
                read_only: true,
            });
        }

        let writes = std::mem::take(&mut txn.writes);
        let deltas = std::mem::take(&mut txn.deltas);
        let written: SmallVec<[CellId; 8]> = writes.keys().chain(deltas.keys()).copied().collect();

        if let Err(reason) = self.hooks.before_commit(txn_id, &written) {
            return Err(self.conflict(txn, ConflictKind::Vetoed { reason }));
        }

        let version = {
            let _guard = self.commit_lock.lock();

            if let Some(kind) = stale_read(txn) {
                return Err(self.conflict(txn, kind));
            }

            let version = self.sequence.head_version() + 1;
            if let Some(ahead) = writes
                .values()
                .chain(deltas.values())
                .find(|w| w.committed_version() >= version)
            {
                let err = StmError::internal(format!(
                    "{} already holds version {} but the sequence head is {}",
                    ahead.cell_id(),
                    ahead.committed_version(),
                    version - 1
                ));
                return Err(self.fail_commit(txn, err));
            }

            let mut published = Vec::with_capacity(written.len());
            let mut failure = None;
            for (_, write) in writes.into_iter().chain(deltas) {
                match write.publish(version) {
                    Ok(cell) => published.push(cell),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            // cells already installed carry `version`, so the sequence must advance
            self.sequence.publish(version, published);
            if let Some(err) = failure {
                return Err(self.fail_commit(txn, err));
            }
            version
        };

        tracing::trace!(txn_id = %txn_id, version, writes = written.len(), "commit published");
        txn.finish(TransactionStatus::Committed);

        let rw_commits = self.metrics.record_commit(false);
        if let Some(every) = self.config.reclaim_every_commits {
            if rw_commits % every == 0 {
                self.reclaim();
            }
        }

        Ok(CommitInfo {
            txn_id,
            version,
            writes: written.len(),
            read_only: false,
        })
    }

    /// Abort after an internal failure inside the commit section
    fn fail_commit(&self, txn: &mut Transaction<'_>, err: StmError) -> StmError {
        tracing::error!(txn_id = %txn.id, error = %err, "commit failed");
        txn.finish(TransactionStatus::Aborted {
            reason: err.to_string(),
        });
        err
    }

    fn conflict(&self, txn: &mut Transaction<'_>, kind: ConflictKind) -> StmError {
        tracing::debug!(txn_id = %txn.id, %kind, "commit conflict");
        self.metrics.record_conflict();
        txn.finish(TransactionStatus::Aborted {
            reason: kind.to_string(),
        });
        StmError::Conflict {
            txn_id: txn.id,
            kind,
        }
    }
}

/// First read-set entry superseded by a newer committed version
fn stale_read(txn: &Transaction<'_>) -> Option<ConflictKind> {
    txn.read_set.iter().find_map(|(id, entry)| {
        let committed = entry.cell.latest_version();
        (committed > entry.version).then(|| ConflictKind::StaleRead {
            cell: *id,
            read_version: entry.version,
            committed_version: committed,
        })
    })
}

/// Opaque handle to a suspended transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SuspendToken {
    txn_id: TxnId,
}

impl SuspendToken {
    /// Transaction this token resumes
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }
}

/// Begins transactions and coordinates their commits
///
/// Cheap to clone; clones share one engine.
///
/// # Thread Safety
///
/// Every method takes `&self`. The only blocking point is the commit
/// section, held for validation and publication of one write-set.
#[derive(Clone)]
pub struct TransactionManager {
    shared: Arc<EngineShared>,
    /// Transactions parked between threads
    suspended: Arc<DashMap<TxnId, Transaction<'static>>>,
}

impl TransactionManager {
    /// Create a manager with no hooks
    pub fn new(config: StmConfig) -> StmResult<Self> {
        Self::with_hooks(config, StmHooks::default())
    }

    /// Create a manager with consistency hooks installed
    pub fn with_hooks(config: StmConfig, hooks: StmHooks) -> StmResult<Self> {
        config.validate()?;
        let pool = match config.parallelism {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("stm-parallel-{}", i))
                    .build()
                    .map_err(|e| StmError::Config(format!("parallel pool: {}", e)))?,
            ),
            None => None,
        };

        Ok(Self::assemble(config, hooks, pool))
    }

    fn assemble(config: StmConfig, hooks: StmHooks, pool: Option<rayon::ThreadPool>) -> Self {
        TransactionManager {
            shared: Arc::new(EngineShared {
                config,
                commit_lock: Mutex::new(()),
                sequence: CommitSequence::new(),
                reclaimer: Reclaimer::new(),
                next_txn_id: AtomicU64::new(0),
                metrics: TxnMetrics::default(),
                hooks,
                pool,
            }),
            suspended: Arc::new(DashMap::new()),
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &StmConfig {
        &self.shared.config
    }

    // === Transactions ===

    /// Begin a top-level transaction
    ///
    /// `read_only = true` starts a speculative transaction that upgrades to
    /// read-write on its first write.
    pub fn begin(&self, read_only: bool) -> Transaction<'static> {
        self.begin_with(TxnMode::from_read_only(read_only))
    }

    /// Begin a top-level transaction in an explicit mode
    pub fn begin_with(&self, mode: TxnMode) -> Transaction<'static> {
        Transaction::begin(Arc::clone(&self.shared), mode)
    }

    /// Run `body` in a fresh transaction, retrying on conflict
    ///
    /// Non-conflict errors abort and return immediately. After
    /// `max_retries` conflicting attempts the last conflict is returned.
    pub fn atomically<R>(
        &self,
        read_only: bool,
        mut body: impl FnMut(&mut Transaction<'_>) -> StmResult<R>,
    ) -> StmResult<R> {
        let max_retries = self.shared.config.max_retries;
        let backoff = self.shared.config.retry_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let mut txn = self.begin(read_only);
            let result = match body(&mut txn) {
                Ok(value) => txn.commit().map(|_| value),
                Err(err) => {
                    txn.abort();
                    Err(err)
                }
            };

            match result {
                Err(err) if err.is_retryable() && attempt < max_retries => {
                    tracing::debug!(attempt, error = %err, "retrying transaction");
                    if !backoff.is_zero() {
                        std::thread::sleep(backoff);
                    }
                }
                Err(err) if err.is_retryable() => {
                    tracing::warn!(attempts = attempt, error = %err, "retry budget exhausted");
                    return Err(err);
                }
                other => return other,
            }
        }
    }

    // === Suspend / Resume ===

    /// Park a top-level transaction so another thread can resume it
    ///
    /// The transaction keeps its snapshot anchored while parked.
    pub fn suspend(&self, txn: Transaction<'static>) -> StmResult<SuspendToken> {
        txn.ensure_active()?;
        if txn.is_nested() {
            return Err(StmError::illegal("nested transactions cannot be suspended"));
        }
        let txn_id = txn.id();
        tracing::debug!(txn_id = %txn_id, "suspend");
        self.suspended.insert(txn_id, txn);
        Ok(SuspendToken { txn_id })
    }

    /// Take back a parked transaction
    ///
    /// # Errors
    /// `IllegalOperation` if the token was already resumed or aborted.
    pub fn resume(&self, token: SuspendToken) -> StmResult<Transaction<'static>> {
        match self.suspended.remove(&token.txn_id) {
            Some((_, txn)) => {
                tracing::debug!(txn_id = %token.txn_id, "resume");
                Ok(txn)
            }
            None => Err(StmError::illegal(format!(
                "no suspended transaction for {}",
                token.txn_id
            ))),
        }
    }

    /// Abort a parked transaction without resuming it
    pub fn abort_suspended(&self, token: SuspendToken) -> StmResult<()> {
        self.resume(token)?.abort();
        Ok(())
    }

    /// Number of parked transactions
    pub fn suspended_count(&self) -> usize {
        self.suspended.len()
    }

    // === Cells ===

    /// Create a cell and announce it to the object registry
    pub fn new_cell<T: CellValue>(&self, initial: T) -> VersionedCell<T> {
        self.shared.new_cell(initial)
    }

    // === Versions & Reclamation ===

    /// Version of the newest commit
    pub fn current_version(&self) -> Version {
        self.shared.sequence.head_version()
    }

    /// Oldest version any live or parked transaction may still read
    pub fn oldest_required_version(&self) -> Version {
        self.shared.sequence.oldest_required_version()
    }

    /// Run one reclamation pass
    pub fn reclaim(&self) -> ReclaimStats {
        self.shared.reclaim()
    }

    /// Point-in-time copy of the engine counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Commit records currently retained
    pub fn retained_records(&self) -> usize {
        self.shared.sequence.retained_records()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::assemble(StmConfig::default(), StmHooks::default(), None)
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("current_version", &self.current_version())
            .field("suspended", &self.suspended.len())
            .field("hooks", &self.shared.hooks)
            .finish()
    }
}
