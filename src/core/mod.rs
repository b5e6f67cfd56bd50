//! Core primitives.
//!
//! Seeded randomness shared by the bite calculator and the fish model.

pub mod rng;

pub use rng::DeterministicRng;
