//! Transactional primitives for the strata STM engine
//!
//! - [`AccumulatorCell`]: commutative updates that merge at commit instead
//!   of conflicting

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accumulator;

pub use accumulator::{AccumulatorCell, Combine};
