//! Transaction counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by the engine
#[derive(Debug, Default)]
pub struct TxnMetrics {
    started: AtomicU64,
    committed: AtomicU64,
    read_only_commits: AtomicU64,
    rw_commits: AtomicU64,
    aborted: AtomicU64,
    conflicts: AtomicU64,
    parallel_retries: AtomicU64,
    reclaim_passes: AtomicU64,
    versions_reclaimed: AtomicU64,
}

impl TxnMetrics {
    pub(crate) fn record_start(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of read-write commits so far, including this one
    pub(crate) fn record_commit(&self, read_only: bool) -> u64 {
        self.committed.fetch_add(1, Ordering::Relaxed);
        if read_only {
            self.read_only_commits.fetch_add(1, Ordering::Relaxed);
            self.rw_commits.load(Ordering::Relaxed)
        } else {
            self.rw_commits.fetch_add(1, Ordering::Relaxed) + 1
        }
    }

    pub(crate) fn record_abort(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parallel_retry(&self) {
        self.parallel_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reclaim(&self, versions: usize) {
        self.reclaim_passes.fetch_add(1, Ordering::Relaxed);
        self.versions_reclaimed
            .fetch_add(versions as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            read_only_commits: self.read_only_commits.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            parallel_retries: self.parallel_retries.load(Ordering::Relaxed),
            reclaim_passes: self.reclaim_passes.load(Ordering::Relaxed),
            versions_reclaimed: self.versions_reclaimed.load(Ordering::Relaxed),
        }
    }
}

/// Copy of the engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Top-level transactions begun
    pub started: u64,
    /// Top-level commits, read-only ones included
    pub committed: u64,
    /// Commits that skipped the commit section
    pub read_only_commits: u64,
    /// Top-level transactions aborted (conflicts included)
    pub aborted: u64,
    /// Commits refused by validation or a commit observer
    pub conflicts: u64,
    /// Validated parallel siblings re-executed after an overlap
    pub parallel_retries: u64,
    /// Reclamation passes run
    pub reclaim_passes: u64,
    /// Version records discarded by reclamation
    pub versions_reclaimed: u64,
}

impl MetricsSnapshot {
    /// Commits divided by finished transactions (1.0 when nothing finished)
    pub fn commit_rate(&self) -> f64 {
        let finished = self.committed + self.aborted;
        if finished == 0 {
            1.0
        } else {
            self.committed as f64 / finished as f64
        }
    }

    /// Transactions begun but not yet finished
    pub fn active(&self) -> u64 {
        self.started
            .saturating_sub(self.committed)
            .saturating_sub(self.aborted)
    }
}
