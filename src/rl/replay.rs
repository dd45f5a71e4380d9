//! Experience replay buffer.
//!
//! A bounded FIFO of `(state, action, reward, next_state, done)` transitions.
//! Once full, every push evicts the oldest experience. Sampling draws distinct
//! experiences uniformly at random from an explicit [`SeededRng`].

use std::collections::VecDeque;

use crate::error::{EngineError, Result};
use crate::utils::SeededRng;
use serde::{Deserialize, Serialize};

/// One stored transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state: Vec<f64>,
    pub action: usize,
    pub reward: f64,
    pub next_state: Vec<f64>,
    pub done: bool,
}

/// Bounded experience buffer.
///
/// # Example
///
/// ```
/// use neuropet::rl::{Experience, ReplayBuffer};
///
/// let mut buffer = ReplayBuffer::new(2).unwrap();
/// for action in 0..3 {
///     buffer.push(Experience {
///         state: vec![0.0],
///         action,
///         reward: 1.0,
///         next_state: vec![0.0],
///         done: false,
///     });
/// }
/// let actions: Vec<usize> = buffer.iter().map(|e| e.action).collect();
/// assert_eq!(actions, vec![1, 2]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayBuffer {
    capacity: usize,
    buffer: VecDeque<Experience>,
}

impl ReplayBuffer {
    /// # Errors
    ///
    /// [`EngineError::InvalidHyperparameter`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(EngineError::InvalidHyperparameter(
                "replay buffer capacity must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            buffer: VecDeque::with_capacity(capacity.min(1024)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append an experience, evicting the oldest one when full.
    pub fn push(&mut self, experience: Experience) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(experience);
    }

    /// `batch_size` distinct experiences chosen uniformly at random.
    ///
    /// # Errors
    ///
    /// [`EngineError::BufferUnderflow`] if fewer than `batch_size` experiences are stored.
    pub fn sample(&self, batch_size: usize, rng: &mut SeededRng) -> Result<Vec<&Experience>> {
        if batch_size > self.buffer.len() {
            return Err(EngineError::BufferUnderflow {
                requested: batch_size,
                available: self.buffer.len(),
            });
        }
        Ok(self.draw(batch_size, rng))
    }

    /// Like [`Self::sample`], but returns the whole buffer (in insertion order)
    /// when it holds fewer than `batch_size` experiences.
    pub fn sample_up_to(&self, batch_size: usize, rng: &mut SeededRng) -> Vec<&Experience> {
        if batch_size >= self.buffer.len() {
            return self.buffer.iter().collect();
        }
        self.draw(batch_size, rng)
    }

    fn draw(&self, amount: usize, rng: &mut SeededRng) -> Vec<&Experience> {
        rng.sample_indices(self.buffer.len(), amount)
            .into_iter()
            .filter_map(|i| self.buffer.get(i))
            .collect()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.buffer.iter()
    }

    /// The newest `count` experiences, oldest first.
    pub fn most_recent(&self, count: usize) -> impl Iterator<Item = &Experience> {
        let skip = self.buffer.len().saturating_sub(count);
        self.buffer.iter().skip(skip)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
