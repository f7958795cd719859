//! Engine Integration Tests
//!
//! End-to-end tests for strata-stm through the public facade: snapshot
//! isolation, conflicts, accumulators, parallel children, reclamation,
//! suspend/resume, the ambient binding and hook points.

mod accumulator;
mod ambient_binding;
mod conflicts;
mod hooks;
mod parallel;
mod properties;
