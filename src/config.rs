//! Configuration structures for the behavior engine
//!
//! This module provides the configuration used to build a [`crate::behavior::BehaviorEngine`]:
//! the complexity tier, the seed for the engine's random number generator, the
//! length of the environment sensory vector, and the reinforcement-learning
//! hyperparameters. Every field has a default, so a config file only needs the
//! values it changes.
//!
//! # Example
//!
//! ```json
//! {
//!   "complexity": "recurrent",
//!   "seed": 7,
//!   "sensory_size": 28,
//!   "record_history": true,
//!   "rl": { "epsilon_decay": 0.99, "batch_size": 16 }
//! }
//! ```

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Decision tier, chosen once when the engine is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// One small feedforward network scoring each activity.
    Simple,
    /// One LSTM network over the recent state history.
    Recurrent,
    /// Specialized networks plus the reinforcement-learning goal planner.
    #[default]
    Full,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub complexity: Complexity,
    /// Seed of the engine's random number generator.
    pub seed: u64,
    /// Length of the environment sensory vector appended to the state.
    pub sensory_size: usize,
    pub learning_rate: f64,
    /// Keep the last 100 interactions in the engine document.
    pub record_history: bool,
    pub rl: RlConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            complexity: Complexity::Full,
            seed: 42,
            sensory_size: 28,
            learning_rate: 0.001,
            record_history: false,
            rl: RlConfig::default(),
        }
    }
}

/// Q-learning hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RlConfig {
    /// Discount factor for future rewards.
    pub gamma: f64,
    /// Initial exploration rate.
    pub epsilon: f64,
    /// Multiplier applied to epsilon after every learning step, in `(0, 1)`.
    pub epsilon_decay: f64,
    /// Floor for epsilon.
    pub epsilon_min: f64,
    pub batch_size: usize,
    pub replay_capacity: usize,
    /// Stored experiences between two target-network syncs.
    pub target_sync_interval: u64,
    /// Weight of the `1 / (count + 1)` bonus added to Q-values while exploiting.
    pub curiosity_weight: f64,
    pub learning_rate: f64,
}

impl Default for RlConfig {
    fn default() -> Self {
        Self {
            gamma: 0.95,
            epsilon: 1.0,
            epsilon_decay: 0.995,
            epsilon_min: 0.1,
            batch_size: 32,
            replay_capacity: 10_000,
            target_sync_interval: 100,
            curiosity_weight: 0.1,
            learning_rate: 0.001,
        }
    }
}

impl EngineConfig {
    /// Check every value; each failure is an [`EngineError::InvalidHyperparameter`].
    pub fn validate(&self) -> Result<()> {
        check_positive("learning_rate", self.learning_rate)?;
        self.rl.validate()
    }
}

impl RlConfig {
    pub fn validate(&self) -> Result<()> {
        check_unit("gamma", self.gamma)?;
        check_unit("epsilon", self.epsilon)?;
        check_unit("epsilon_min", self.epsilon_min)?;
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay < 1.0) {
            return Err(invalid(format!(
                "epsilon_decay must be in (0, 1), got {}",
                self.epsilon_decay
            )));
        }
        if self.epsilon_min > self.epsilon {
            return Err(invalid(format!(
                "epsilon_min ({}) must not exceed epsilon ({})",
                self.epsilon_min, self.epsilon
            )));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be greater than zero".to_string()));
        }
        if self.replay_capacity == 0 {
            return Err(invalid("replay_capacity must be greater than zero".to_string()));
        }
        // a smaller buffer could never fill a batch
        if self.batch_size > self.replay_capacity {
            return Err(invalid("batch_size must not exceed replay_capacity".to_string()));
        }
        if self.target_sync_interval == 0 {
            return Err(invalid("target_sync_interval must be greater than zero".to_string()));
        }
        if !(self.curiosity_weight.is_finite() && self.curiosity_weight >= 0.0) {
            return Err(invalid(format!(
                "curiosity_weight must be non-negative, got {}",
                self.curiosity_weight
            )));
        }
        check_positive("rl.learning_rate", self.learning_rate)
    }
}

/// Loads an engine configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it into an [`EngineConfig`] (missing
/// fields take their defaults) and validates it.
///
/// # Examples
///
/// ```no_run
/// use neuropet::config::{load_config, Complexity};
///
/// let cfg = load_config("config/recurrent.json").unwrap();
/// assert_eq!(cfg.complexity, Complexity::Recurrent);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
    let contents = fs::read_to_string(path)?;
    let config: EngineConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

fn invalid(message: String) -> EngineError {
    EngineError::InvalidHyperparameter(message)
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(format!("{} must be in [0, 1], got {}", name, value)));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(format!("{} must be positive, got {}", name, value)));
    }
    Ok(())
}
