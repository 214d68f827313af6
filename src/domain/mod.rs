//! Records, invariants and the ports the engine talks through.

pub mod changeset;
pub mod cycle;
pub mod events;
pub mod group;
pub mod identity;
pub mod ids;
pub mod membership;
pub mod money;
pub mod ports;
pub mod transaction;
