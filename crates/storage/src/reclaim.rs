//! Version reclamation
//!
//! The reclaimer retires commit records no live transaction is anchored on
//! and compacts the cells those records wrote down to the new floor.
//!
//! Compacting a cell keeps the newest version `<= floor` plus everything
//! newer. Every live snapshot is `>= floor`, so no reader can lose the
//! version it needs; suspended transactions keep their anchors and count.

use crate::sequence::CommitSequence;
use rustc_hash::FxHashSet;
use stm_core::Version;

/// Outcome of one reclamation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Floor used for compaction
    pub floor: Version,
    /// Commit records retired this pass
    pub records_retired: usize,
    /// Distinct live cells compacted
    pub cells_compacted: usize,
    /// Version records discarded
    pub versions_discarded: usize,
}

impl ReclaimStats {
    /// Whether the pass freed anything
    pub fn is_noop(&self) -> bool {
        self.records_retired == 0 && self.versions_discarded == 0
    }
}

/// Walks the commit sequence and compacts superseded versions
#[derive(Debug, Default)]
pub struct Reclaimer;

impl Reclaimer {
    /// Create a reclaimer
    pub fn new() -> Self {
        Reclaimer
    }

    /// Run one pass against `sequence`
    pub fn run(&self, sequence: &CommitSequence) -> ReclaimStats {
        let (written, floor, records_retired) = sequence.retire_prefix();

        let mut seen = FxHashSet::default();
        let mut cells_compacted = 0;
        let mut versions_discarded = 0;

        for weak in written {
            // cells dropped by the application need no compaction
            let Some(cell) = weak.upgrade() else {
                continue;
            };
            if !seen.insert(cell.id()) {
                continue;
            }
            cells_compacted += 1;
            versions_discarded += cell.compact(floor);
        }

        let stats = ReclaimStats {
            floor,
            records_retired,
            cells_compacted,
            versions_discarded,
        };
        if !stats.is_noop() {
            tracing::debug!(
                floor,
                records_retired,
                cells_compacted,
                versions_discarded,
                "reclamation pass"
            );
        }
        stats
    }
}
