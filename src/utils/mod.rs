//! Shared utilities for the networks
//!
//! This module provides the seeded RNG, activation functions, the learning-rate
//! scheduler and matrix/serde helpers used across every model.

pub mod activations;
pub mod lr_scheduler;
pub mod matrix;
pub mod rng;

pub use rng::SeededRng;
