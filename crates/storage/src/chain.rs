//! Version chains
//!
//! A chain holds every retained version of one cell. Records are kept in an
//! arena ordered oldest-to-newest, so "prepending" a new head is a push and
//! truncating history is a drain from the front. Walking newest-first is a
//! reverse iteration.
//!
//! # Invariants
//!
//! - The chain is never empty
//! - Versions strictly increase from tail (index 0) to head (last index)
//! - Records are never mutated after they are pushed

use stm_core::{StmError, StmResult, Version};

/// One immutable historical value of a cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord<T> {
    /// Commit version that produced this value
    pub version: Version,
    /// The value
    pub value: T,
}

/// Oldest-to-newest arena of version records
#[derive(Debug, Clone)]
pub struct VersionChain<T> {
    records: Vec<VersionRecord<T>>,
}

impl<T> VersionChain<T> {
    /// Create a chain holding a single base record
    pub fn new(value: T, version: Version) -> Self {
        Self {
            records: vec![VersionRecord { version, value }],
        }
    }

    /// Newest record (the head)
    #[inline]
    pub fn head(&self) -> &VersionRecord<T> {
        // non-empty by construction; compact() always keeps one record
        &self.records[self.records.len() - 1]
    }

    /// Oldest retained record (the tail)
    #[inline]
    pub fn tail(&self) -> &VersionRecord<T> {
        &self.records[0]
    }

    /// Number of retained versions
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false; present for API symmetry with collections
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Newest record whose version is `<= snapshot`
    ///
    /// Returns `None` when every retained record is newer than the snapshot,
    /// which only happens if reclamation discarded history a reader needed.
    pub fn visible_at(&self, snapshot: Version) -> Option<&VersionRecord<T>> {
        self.records.iter().rev().find(|r| r.version <= snapshot)
    }

    /// Whether any record newer than `version` exists
    #[inline]
    pub fn has_newer_than(&self, version: Version) -> bool {
        self.head().version > version
    }

    /// Add a new head record
    ///
    /// # Errors
    ///
    /// Returns `StmError::Internal` if `version` is not strictly greater than
    /// the current head; publishing out of order is an engine bug.
    pub fn push(&mut self, value: T, version: Version) -> StmResult<()> {
        let head = self.head().version;
        if version <= head {
            debug_assert!(false, "version {} published after {}", version, head);
            return Err(StmError::internal(format!(
                "version {} published after head version {}",
                version, head
            )));
        }
        self.records.push(VersionRecord { version, value });
        Ok(())
    }

    /// Publish `f(newest value)` at `version`
    ///
    /// If the head already carries `version` (an earlier write of the same
    /// commit), it is folded in place; no snapshot can see that version yet.
    pub fn fold_head(&mut self, version: Version, f: impl FnOnce(&T) -> T) -> StmResult<()> {
        if self.head().version == version {
            if let Some(head) = self.records.last_mut() {
                head.value = f(&head.value);
            }
            return Ok(());
        }
        let next = f(&self.head().value);
        self.push(next, version)
    }

    /// Drop every record older than the newest record with version `<= floor`
    ///
    /// The newest record at or below the floor survives as the new tail, so a
    /// reader with any snapshot `>= floor` still finds its value. Returns the
    /// number of discarded records.
    pub fn compact(&mut self, floor: Version) -> usize {
        let keep_from = match self.records.iter().rposition(|r| r.version <= floor) {
            Some(idx) => idx,
            None => return 0,
        };
        if keep_from == 0 {
            return 0;
        }
        self.records.drain(..keep_from);
        keep_from
    }

    /// Iterate head-to-tail (newest first)
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &VersionRecord<T>> {
        self.records.iter().rev()
    }
}
