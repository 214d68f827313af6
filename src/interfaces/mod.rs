//! Outer front-ends driving the engine.

pub mod csv;
