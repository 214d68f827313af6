//! Application layer containing the cycle and payout engine.
//!
//! `EqubEngine` is the single entry point for group creation, membership,
//! contributions and cycle rollover. Each concern lives in its own module as
//! an `impl EqubEngine` block.

pub mod cycles;
pub mod engine;
pub mod groups;
pub mod payments;
pub mod report;
