//! Versioned cells
//!
//! A [`VersionedCell`] is a cheap, clonable handle to one logical shared
//! variable. All clones share the same version chain; identity is the
//! [`CellId`] allocated at construction.
//!
//! # Thread Safety
//!
//! - Readers take the chain's read lock only long enough to clone one value
//! - New versions are installed only from inside the engine's commit section
//! - `latest` mirrors the head version so validation never touches the chain
//!
//! Transactional `get`/`put` live in the concurrency layer; this module only
//! exposes snapshot reads, publication and compaction.

use crate::chain::VersionChain;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use stm_core::{CellId, CellValue, StmError, StmResult, Version, GENESIS_VERSION};

/// Type-erased view of a cell, used by read-sets, commit records and the reclaimer
pub trait ErasedCell: Send + Sync {
    /// Cell identity
    fn id(&self) -> CellId;

    /// Version of the newest committed record
    fn latest_version(&self) -> Version;

    /// Discard history no reader at or above `floor` can observe.
    ///
    /// Returns the number of discarded records.
    fn compact(&self, floor: Version) -> usize;

    /// Number of retained versions
    fn version_count(&self) -> usize;
}

struct CellInner<T> {
    id: CellId,
    latest: AtomicU64,
    chain: RwLock<VersionChain<T>>,
}

impl<T: CellValue> ErasedCell for CellInner<T> {
    fn id(&self) -> CellId {
        self.id
    }

    fn latest_version(&self) -> Version {
        self.latest.load(Ordering::Acquire)
    }

    fn compact(&self, floor: Version) -> usize {
        self.chain.write().compact(floor)
    }

    fn version_count(&self) -> usize {
        self.chain.read().len()
    }
}

/// Shared handle to a multi-version memory cell
///
/// # Example
///
/// ```
/// use stm_storage::VersionedCell;
///
/// let cell = VersionedCell::new(10u64);
/// assert_eq!(cell.load(), 10);
///
/// // Committing is the engine's job; here we publish by hand.
/// cell.install(11, 1).unwrap();
/// assert_eq!(cell.read_at(0).unwrap(), (0, 10));
/// assert_eq!(cell.read_at(1).unwrap(), (1, 11));
/// ```
pub struct VersionedCell<T> {
    inner: Arc<CellInner<T>>,
}

impl<T> Clone for VersionedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: CellValue> VersionedCell<T> {
    /// Create a cell whose initial value is visible at the genesis version
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(CellInner {
                id: CellId::next(),
                latest: AtomicU64::new(GENESIS_VERSION),
                chain: RwLock::new(VersionChain::new(initial, GENESIS_VERSION)),
            }),
        }
    }

    /// Cell identity
    #[inline]
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// Version of the newest committed record
    #[inline]
    pub fn latest_version(&self) -> Version {
        self.inner.latest.load(Ordering::Acquire)
    }

    /// Read the value visible to a snapshot
    ///
    /// Returns the newest record with version `<= snapshot` as
    /// `(version, value)`.
    ///
    /// # Errors
    ///
    /// Returns `StmError::Internal` if reclamation discarded the version the
    /// snapshot needs. That is a floor-computation bug, never a runtime
    /// condition callers should handle.
    pub fn read_at(&self, snapshot: Version) -> StmResult<(Version, T)> {
        let chain = self.inner.chain.read();
        match chain.visible_at(snapshot) {
            Some(record) => Ok((record.version, record.value.clone())),
            None => {
                let tail = chain.tail().version;
                tracing::error!(
                    cell = %self.inner.id,
                    snapshot,
                    tail,
                    "reclamation underrun: snapshot precedes retained history"
                );
                debug_assert!(false, "reclamation underrun on {}", self.inner.id);
                Err(StmError::internal(format!(
                    "reclamation underrun on {}: snapshot {} precedes tail {}",
                    self.inner.id, snapshot, tail
                )))
            }
        }
    }

    /// Newest committed value, outside any transaction
    ///
    /// Reads this cell alone with no snapshot. Loading several cells while a
    /// commit is publishing can mix values from before and after it; read
    /// inside a transaction for a consistent view.
    pub fn load(&self) -> T {
        self.inner.chain.read().head().value.clone()
    }

    /// Newest committed value with its version
    pub fn load_versioned(&self) -> (Version, T) {
        let chain = self.inner.chain.read();
        let head = chain.head();
        (head.version, head.value.clone())
    }

    /// Publish a new head version
    ///
    /// Must only be called from inside the engine's commit section, with a
    /// version larger than every version previously installed.
    pub fn install(&self, value: T, version: Version) -> StmResult<()> {
        let mut chain = self.inner.chain.write();
        chain.push(value, version)?;
        self.inner.latest.store(version, Ordering::Release);
        Ok(())
    }

    /// Publish `f(newest value)` at `version`
    ///
    /// Same contract as [`install`](Self::install), except that a second
    /// publication at the current head version folds into it. Used for
    /// commutative updates, which must combine with the newest value rather
    /// than the one their transaction read.
    pub fn fold(&self, version: Version, f: impl FnOnce(&T) -> T) -> StmResult<()> {
        let mut chain = self.inner.chain.write();
        chain.fold_head(version, f)?;
        self.inner.latest.store(version, Ordering::Release);
        Ok(())
    }

    /// Discard history below `floor`; see [`ErasedCell::compact`]
    pub fn compact(&self, floor: Version) -> usize {
        self.inner.compact(floor)
    }

    /// Number of retained versions
    pub fn version_count(&self) -> usize {
        self.inner.version_count()
    }

    /// Versions retained, newest first
    pub fn retained_versions(&self) -> Vec<Version> {
        self.inner
            .chain
            .read()
            .iter_newest_first()
            .map(|r| r.version)
            .collect()
    }

    /// Owning type-erased handle
    pub fn erased(&self) -> Arc<dyn ErasedCell> {
        self.inner.clone()
    }

    /// Non-owning type-erased handle, used by commit records
    pub fn downgrade(&self) -> Weak<dyn ErasedCell> {
        let weak: Weak<CellInner<T>> = Arc::downgrade(&self.inner);
        weak
    }

    /// Whether two handles refer to the same cell
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: CellValue + fmt::Debug> fmt::Debug for VersionedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (version, value) = self.load_versioned();
        f.debug_struct("VersionedCell")
            .field("id", &self.inner.id)
            .field("version", &version)
            .field("value", &value)
            .finish()
    }
}
