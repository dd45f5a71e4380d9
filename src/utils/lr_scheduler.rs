//! Learning rate scheduler trait and implementation
//!
//! This module defines the LRScheduler trait for adjusting learning rates during training.
//! The scheduler is a pure function of its step counter: it never owns the optimizer.
//! The caller reads [`LRScheduler::get_lr`], assigns it to the optimizer before an
//! update, then calls [`LRScheduler::step`].

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Core trait for learning rate schedulers.
///
/// # Example
///
/// ```ignore
/// let mut scheduler = LearningRateScheduler::new(0.1, ScheduleType::Step, 0.5, 3)?;
///
/// for _ in 0..num_updates {
///     optimizer.set_learning_rate(scheduler.get_lr());
///     // ... apply one update ...
///     scheduler.step();
/// }
/// ```
pub trait LRScheduler {
    /// Get the learning rate for the current step.
    fn get_lr(&self) -> f64;

    /// Advance the scheduler by one step.
    fn step(&mut self);

    /// Reset the scheduler to step 0.
    fn reset(&mut self);
}

/// Decay curve applied by [`LearningRateScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    /// `lr0 * decay^(step / decay_steps)` with integer division.
    Step,
    /// `lr0 * exp(-decay * step)`.
    Exponential,
    /// `lr0 * 0.5 * (1 + cos(pi * step / decay_steps))`.
    Cosine,
}

/// Learning rate scheduler driven by a step counter.
///
/// The serialized form carries every field, so a restored scheduler resumes at
/// exactly the step it was saved at.
///
/// # Example
///
/// ```
/// use neuropet::utils::lr_scheduler::{LRScheduler, LearningRateScheduler, ScheduleType};
///
/// let mut scheduler = LearningRateScheduler::new(0.1, ScheduleType::Step, 0.5, 3).unwrap();
/// for _ in 0..3 {
///     scheduler.step();
/// }
/// assert!((scheduler.get_lr() - 0.05).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRateScheduler {
    initial_lr: f64,
    schedule_type: ScheduleType,
    decay_rate: f64,
    decay_steps: u64,
    current_step: u64,
}

impl LearningRateScheduler {
    /// Creates a new scheduler at step 0.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidHyperparameter`] if `initial_lr` is not positive,
    /// `decay_rate` is negative, or `decay_steps` is zero.
    pub fn new(
        initial_lr: f64,
        schedule_type: ScheduleType,
        decay_rate: f64,
        decay_steps: u64,
    ) -> Result<Self> {
        let scheduler = Self {
            initial_lr,
            schedule_type,
            decay_rate,
            decay_steps,
            current_step: 0,
        };
        scheduler.validate()?;
        Ok(scheduler)
    }

    /// The schedule used by the advanced network: exponential decay of `1e-4` per step.
    pub fn exponential_default(initial_lr: f64) -> Result<Self> {
        Self::new(initial_lr, ScheduleType::Exponential, 0.0001, 1000)
    }

    /// Check the hyperparameters; also used after deserialization.
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_lr.is_finite() && self.initial_lr > 0.0) {
            return Err(EngineError::InvalidHyperparameter(format!(
                "scheduler initial_lr must be positive, got {}",
                self.initial_lr
            )));
        }
        if !(self.decay_rate.is_finite() && self.decay_rate >= 0.0) {
            return Err(EngineError::InvalidHyperparameter(format!(
                "scheduler decay_rate must be non-negative, got {}",
                self.decay_rate
            )));
        }
        if self.decay_steps == 0 {
            return Err(EngineError::InvalidHyperparameter(
                "scheduler decay_steps must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn initial_lr(&self) -> f64 {
        self.initial_lr
    }

    pub fn schedule_type(&self) -> ScheduleType {
        self.schedule_type
    }

    pub fn current_step(&self) -> u64 {
        self.current_step
    }
}

impl LRScheduler for LearningRateScheduler {
    fn get_lr(&self) -> f64 {
        let step = self.current_step as f64;
        match self.schedule_type {
            ScheduleType::Step => {
                let decays = self.current_step / self.decay_steps;
                self.initial_lr * self.decay_rate.powf(decays as f64)
            }
            ScheduleType::Exponential => self.initial_lr * (-self.decay_rate * step).exp(),
            ScheduleType::Cosine => {
                self.initial_lr * 0.5 * (1.0 + (PI * step / self.decay_steps as f64).cos())
            }
        }
    }

    fn step(&mut self) {
        self.current_step += 1;
    }

    fn reset(&mut self) {
        self.current_step = 0;
    }
}
