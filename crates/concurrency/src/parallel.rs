//! Parallel nested transactions
//!
//! [`Transaction::run_parallel`] fans a batch of tasks out over rayon, one
//! child context per task, then merges the children back in submission order.
//!
//! | Mode | Isolation | Merge |
//! |------|-----------|-------|
//! | [`TaskMode::Validated`] | private child | checked against earlier siblings, retried once on overlap |
//! | [`TaskMode::Disjoint`] | private child | unchecked; caller guarantees disjoint footprints |
//! | [`TaskMode::Unsafe`] | writes go to a scratch shared by all unsafe siblings | unchecked |
//!
//! ## Validated Merge
//!
//! ```text
//! for task in submission order:
//!     overlap = task reads or writes a cell an earlier sibling wrote
//!     IF overlap: re-run the task on the calling thread, reading
//!                 through everything merged so far
//!     merge the task's effects
//! ```
//!
//! A retried task runs after its predecessors are merged and before its
//! successors start merging, so it cannot overlap again. The outcome equals
//! running the tasks one by one in submission order.

use crate::transaction::Transaction;
use crate::view::{BatchOverlay, ChildEffects, TxnView};
use crate::write_set::WriteSet;
use parking_lot::Mutex;
use rayon::prelude::*;
use stm_core::{NestedKind, StmResult};

/// Isolation contract of one parallel task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskMode {
    /// Checked against earlier siblings, retried locally on overlap
    Validated,
    /// Asserted disjoint from every sibling; never checked
    Disjoint,
    /// Shares unisolated scratch writes with other unsafe siblings
    Unsafe,
}

impl TaskMode {
    fn nested_kind(self) -> NestedKind {
        match self {
            TaskMode::Validated => NestedKind::Validated,
            TaskMode::Disjoint => NestedKind::Disjoint,
            TaskMode::Unsafe => NestedKind::Unsafe,
        }
    }
}

type TaskBody<'f, R> = Box<dyn Fn(&mut Transaction<'_>) -> StmResult<R> + Send + Sync + 'f>;

/// One task of a parallel batch
///
/// Bodies are `Fn` because a validated task may run twice.
pub struct ParallelTask<'f, R> {
    mode: TaskMode,
    body: TaskBody<'f, R>,
}

impl<'f, R> ParallelTask<'f, R> {
    /// Task validated against its siblings
    pub fn validated<F>(body: F) -> Self
    where
        F: Fn(&mut Transaction<'_>) -> StmResult<R> + Send + Sync + 'f,
    {
        Self::with_mode(TaskMode::Validated, body)
    }

    /// Task whose footprint the caller guarantees is disjoint from its siblings
    ///
    /// Overlapping disjoint tasks produce unspecified results.
    pub fn disjoint<F>(body: F) -> Self
    where
        F: Fn(&mut Transaction<'_>) -> StmResult<R> + Send + Sync + 'f,
    {
        Self::with_mode(TaskMode::Disjoint, body)
    }

    /// Task whose writes are immediately visible to other unsafe siblings
    ///
    /// No isolation and no validation.
    pub fn unsafe_shared<F>(body: F) -> Self
    where
        F: Fn(&mut Transaction<'_>) -> StmResult<R> + Send + Sync + 'f,
    {
        Self::with_mode(TaskMode::Unsafe, body)
    }

    /// Task with an explicit mode
    pub fn with_mode<F>(mode: TaskMode, body: F) -> Self
    where
        F: Fn(&mut Transaction<'_>) -> StmResult<R> + Send + Sync + 'f,
    {
        ParallelTask {
            mode,
            body: Box::new(body),
        }
    }

    /// Isolation contract
    pub fn mode(&self) -> TaskMode {
        self.mode
    }
}

impl<R> std::fmt::Debug for ParallelTask<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelTask")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl<'p> Transaction<'p> {
    /// Run `tasks` concurrently in child contexts and merge them back
    ///
    /// Results come back in submission order. If any task fails, the first
    /// failure in submission order is returned and nothing is merged.
    pub fn run_parallel<R: Send>(&mut self, tasks: Vec<ParallelTask<'_, R>>) -> StmResult<Vec<R>> {
        self.ensure_active()?;
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let scratch = Mutex::new(WriteSet::default());
        let (results, effects) = {
            let this: &Transaction<'p> = self;
            let outcomes: Vec<StmResult<(R, ChildEffects)>> = this.shared.fan_out(|| {
                tasks
                    .par_iter()
                    .map(|task| this.run_task(task, this, &scratch))
                    .collect()
            });
            this.merge_batch(&tasks, outcomes, &scratch)?
        };

        self.absorb_effects(effects)?;
        Ok(results)
    }

    fn merge_batch<R>(
        &self,
        tasks: &[ParallelTask<'_, R>],
        outcomes: Vec<StmResult<(R, ChildEffects)>>,
        scratch: &Mutex<WriteSet>,
    ) -> StmResult<(Vec<R>, ChildEffects)> {
        let mut batch = BatchOverlay::new(self);
        let mut results = Vec::with_capacity(tasks.len());
        let mut scratch_merged = false;

        for (index, (task, outcome)) in tasks.iter().zip(outcomes).enumerate() {
            let (mut value, mut effects) = outcome?;
            match task.mode {
                TaskMode::Disjoint => {}
                TaskMode::Unsafe => {
                    if !scratch_merged {
                        batch.merge_writes(std::mem::take(&mut *scratch.lock()))?;
                        scratch_merged = true;
                    }
                }
                TaskMode::Validated => {
                    if let Some(cell) = batch.overlap(&effects) {
                        tracing::debug!(txn_id = %self.id, task = index, %cell, "retrying parallel sibling");
                        self.shared.metrics.record_parallel_retry();
                        (value, effects) = self.run_task(task, &batch, scratch)?;
                    }
                }
            }
            batch.merge(effects)?;
            results.push(value);
        }

        Ok((results, batch.into_effects()))
    }

    fn run_task<R>(
        &self,
        task: &ParallelTask<'_, R>,
        view: &dyn TxnView,
        scratch: &Mutex<WriteSet>,
    ) -> StmResult<(R, ChildEffects)> {
        let scratch = (task.mode == TaskMode::Unsafe).then_some(scratch);
        let mut child = self.child(view, task.mode.nested_kind(), scratch);
        let value = (task.body)(&mut child)?;
        Ok((value, child.into_effects()?))
    }
}
