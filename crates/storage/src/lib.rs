//! Storage layer for the STM engine
//!
//! This crate implements the multi-version memory the engine runs on:
//! - VersionChain: oldest-to-newest arena of immutable version records
//! - VersionedCell: shared handle to one logical mutable value
//! - CommitSequence: the serialization backbone and snapshot anchors
//! - Reclaimer: discards versions no live transaction can observe

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod chain;
pub mod reclaim;
pub mod sequence;

pub use cell::{ErasedCell, VersionedCell};
pub use chain::{VersionChain, VersionRecord};
pub use reclaim::{ReclaimStats, Reclaimer};
pub use sequence::{CommitRecord, CommitSequence};
