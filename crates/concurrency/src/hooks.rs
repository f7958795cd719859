//! Extension points for consistency-checking layers
//!
//! The engine does not check application invariants itself. A layer that
//! does needs three things from the core:
//! - to hear about every cell constructed through the engine ([`ObjectRegistry`])
//! - to choose how child contexts are built ([`NestedTxnFactory`])
//! - to see the write-set of a committing transaction and refuse it ([`CommitObserver`])

use std::sync::Arc;
use stm_core::{CellId, NestedKind, TxnId, TxnMode};

/// Notified once per cell constructed through the engine
pub trait ObjectRegistry: Send + Sync {
    /// A new cell exists
    fn register(&self, cell: CellId);
}

/// Consulted whenever a nested or parallel child context is constructed
pub trait NestedTxnFactory: Send + Sync {
    /// Mode for a child of `kind` whose parent runs in `parent`
    fn child_mode(&self, kind: NestedKind, parent: TxnMode) -> TxnMode {
        let _ = kind;
        parent
    }
}

/// Sees the write-set of every read-write top-level commit before validation
///
/// Runs outside the commit section, so it may do real work.
pub trait CommitObserver: Send + Sync {
    /// Return `Err(reason)` to refuse the commit
    fn before_commit(&self, txn: TxnId, written: &[CellId]) -> Result<(), String>;
}

/// Installed extension points
#[derive(Clone, Default)]
pub struct StmHooks {
    registry: Option<Arc<dyn ObjectRegistry>>,
    nested_factory: Option<Arc<dyn NestedTxnFactory>>,
    commit_observer: Option<Arc<dyn CommitObserver>>,
}

impl StmHooks {
    /// No hooks installed
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an object registry
    pub fn with_registry(mut self, registry: Arc<dyn ObjectRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Install a nested transaction factory
    pub fn with_nested_factory(mut self, factory: Arc<dyn NestedTxnFactory>) -> Self {
        self.nested_factory = Some(factory);
        self
    }

    /// Install a commit observer
    pub fn with_commit_observer(mut self, observer: Arc<dyn CommitObserver>) -> Self {
        self.commit_observer = Some(observer);
        self
    }

    pub(crate) fn register(&self, cell: CellId) {
        if let Some(registry) = &self.registry {
            registry.register(cell);
        }
    }

    pub(crate) fn child_mode(&self, kind: NestedKind, parent: TxnMode) -> TxnMode {
        match &self.nested_factory {
            Some(factory) => factory.child_mode(kind, parent),
            None => parent,
        }
    }

    pub(crate) fn before_commit(&self, txn: TxnId, written: &[CellId]) -> Result<(), String> {
        match &self.commit_observer {
            Some(observer) => observer.before_commit(txn, written),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for StmHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StmHooks")
            .field("registry", &self.registry.is_some())
            .field("nested_factory", &self.nested_factory.is_some())
            .field("commit_observer", &self.commit_observer.is_some())
            .finish()
    }
}
