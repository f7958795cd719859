//! Commit sequence
//!
//! The commit sequence is the engine's serialization backbone: one immutable
//! [`CommitRecord`] per successful read-write commit, in version order.
//!
//! ## Snapshot Anchors
//!
//! A top-level transaction anchors itself on the head record when it begins
//! and releases the anchor when it terminates. The anchor count is what the
//! reclaimer consults to decide which records (and therefore which versions)
//! are still needed.
//!
//! ```text
//! window (oldest → newest):  [v3 r=0] [v4 r=2] [v5 r=0] [v6 r=1]  ← head
//!                             ^^^^^^^  retireable
//!                                      ^^^^^^^ floor = 4
//! ```
//!
//! ## Anchor / Retire Handshake
//!
//! Anchoring increments `running` and then checks `retired`; retiring sets
//! `retired` and then checks `running`. Both sides use `SeqCst`, so at least
//! one of them observes the other: either the anchoring transaction sees the
//! record retired and re-anchors on the current head, or the reclaimer sees a
//! running transaction and stops. The head record is never retired.

use crate::cell::ErasedCell;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use stm_core::{Version, GENESIS_VERSION};

/// One committed top-level transaction
pub struct CommitRecord {
    version: Version,
    prev: Option<Weak<CommitRecord>>,
    running: AtomicUsize,
    retired: AtomicBool,
    written: Mutex<Vec<Weak<dyn ErasedCell>>>,
}

impl CommitRecord {
    fn new(
        version: Version,
        prev: Option<Weak<CommitRecord>>,
        written: Vec<Weak<dyn ErasedCell>>,
    ) -> Self {
        Self {
            version,
            prev,
            running: AtomicUsize::new(0),
            retired: AtomicBool::new(false),
            written: Mutex::new(written),
        }
    }

    /// Version this commit published
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Predecessor, while the reclaimer still retains it
    pub fn predecessor(&self) -> Option<Arc<CommitRecord>> {
        self.prev.as_ref().and_then(Weak::upgrade)
    }

    /// Number of live transactions anchored on this record
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Drop one anchor taken by [`CommitSequence::anchor`]
    pub fn release(&self) {
        let prev = self.running.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "anchor released twice on v{}", self.version);
    }

    fn try_retire(&self) -> bool {
        self.retired.store(true, Ordering::SeqCst);
        if self.running.load(Ordering::SeqCst) > 0 {
            self.retired.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    fn take_written(&self) -> Vec<Weak<dyn ErasedCell>> {
        std::mem::take(&mut *self.written.lock())
    }
}

impl std::fmt::Debug for CommitRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitRecord")
            .field("version", &self.version)
            .field("running", &self.running())
            .field("retired", &self.retired.load(Ordering::Relaxed))
            .finish()
    }
}

/// Global ordered record of committed transactions
///
/// # Thread Safety
///
/// - `anchor()` is lock-free apart from a brief read of the head pointer
/// - `publish()` must be called from inside the engine's commit section
/// - `retire_prefix()` may run concurrently with both
pub struct CommitSequence {
    head: RwLock<Arc<CommitRecord>>,
    window: Mutex<VecDeque<Arc<CommitRecord>>>,
}

impl CommitSequence {
    /// Create a sequence whose head is the genesis record
    pub fn new() -> Self {
        Self::starting_at(GENESIS_VERSION)
    }

    /// Create a sequence starting at an arbitrary version
    pub fn starting_at(version: Version) -> Self {
        let genesis = Arc::new(CommitRecord::new(version, None, Vec::new()));
        let mut window = VecDeque::new();
        window.push_back(Arc::clone(&genesis));
        Self {
            head: RwLock::new(genesis),
            window: Mutex::new(window),
        }
    }

    /// Current head record
    pub fn head(&self) -> Arc<CommitRecord> {
        Arc::clone(&self.head.read())
    }

    /// Version of the current head
    pub fn head_version(&self) -> Version {
        self.head.read().version
    }

    /// Anchor a new snapshot on the head record
    ///
    /// The caller owns one anchor on the returned record and must call
    /// [`CommitRecord::release`] exactly once when it terminates.
    pub fn anchor(&self) -> Arc<CommitRecord> {
        loop {
            let record = self.head();
            record.running.fetch_add(1, Ordering::SeqCst);
            if !record.retired.load(Ordering::SeqCst) {
                return record;
            }
            // lost a race with the reclaimer on a record that is no longer head
            record.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Append the record for a new commit and make it the head
    ///
    /// Every cell in `written` must already hold its new version.
    pub fn publish(
        &self,
        version: Version,
        written: Vec<Weak<dyn ErasedCell>>,
    ) -> Arc<CommitRecord> {
        let mut head = self.head.write();
        debug_assert!(version > head.version, "commit sequence must grow");
        let record = Arc::new(CommitRecord::new(
            version,
            Some(Arc::downgrade(&head)),
            written,
        ));
        self.window.lock().push_back(Arc::clone(&record));
        *head = Arc::clone(&record);
        record
    }

    /// Retire the oldest records no live transaction is anchored on
    ///
    /// Returns the cells written by the retired records together with the
    /// new floor: the version of the oldest record still retained. Every
    /// live and future snapshot is `>= floor`.
    pub fn retire_prefix(&self) -> (Vec<Weak<dyn ErasedCell>>, Version, usize) {
        let mut window = self.window.lock();
        let mut written = Vec::new();
        let mut retired = 0;

        while window.len() > 1 {
            let oldest = &window[0];
            if !oldest.try_retire() {
                break;
            }
            written.extend(oldest.take_written());
            window.pop_front();
            retired += 1;
        }

        let floor = window.front().map(|r| r.version).unwrap_or(GENESIS_VERSION);
        (written, floor, retired)
    }

    /// Oldest version any live transaction may still read
    ///
    /// Conservative: the oldest record with an anchor, or the head if nothing
    /// is anchored.
    pub fn oldest_required_version(&self) -> Version {
        let window = self.window.lock();
        window
            .iter()
            .find(|r| r.running() > 0)
            .or_else(|| window.back())
            .map(|r| r.version)
            .unwrap_or(GENESIS_VERSION)
    }

    /// Number of records currently retained
    pub fn retained_records(&self) -> usize {
        self.window.lock().len()
    }

    /// Total anchors across retained records
    pub fn active_anchors(&self) -> usize {
        self.window.lock().iter().map(|r| r.running()).sum()
    }
}

impl Default for CommitSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommitSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitSequence")
            .field("head_version", &self.head_version())
            .field("retained_records", &self.retained_records())
            .finish()
    }
}
