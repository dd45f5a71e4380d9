//! SGD (Stochastic Gradient Descent) optimizer implementation
//!
//! This module provides the vanilla SGD optimizer, the simplest optimization
//! algorithm for neural network training.

use crate::error::Result;
use crate::optimizers::{check_update_shapes, validate_learning_rate, Optimizer};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Vanilla Stochastic Gradient Descent optimizer.
///
/// Implements the basic gradient descent update rule:
///
/// ```text
/// parameter = parameter - learning_rate * gradient
/// ```
///
/// SGD keeps no moment buffers; its only state is the step counter, which is
/// tracked so every optimizer reports progress the same way.
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use neuropet::optimizers::{Optimizer, Sgd};
///
/// let mut optimizer = Sgd::new(0.1).unwrap();
/// let mut w = array![[1.0, 2.0]];
/// let mut b = array![[0.0]];
/// optimizer
///     .update(&mut [&mut w], &mut [&mut b], &[array![[1.0, -1.0]]], &[array![[0.5]]])
///     .unwrap();
/// assert_eq!(w, array![[0.9, 2.1]]);
/// assert_eq!(b, array![[-0.05]]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sgd {
    learning_rate: f64,
    #[serde(default)]
    t: u64,
}

impl Sgd {
    /// Creates a new SGD optimizer.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::InvalidHyperparameter`] if `learning_rate` is not positive.
    pub fn new(learning_rate: f64) -> Result<Self> {
        validate_learning_rate(learning_rate)?;
        Ok(Self { learning_rate, t: 0 })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_learning_rate(self.learning_rate)
    }
}

impl Optimizer for Sgd {
    fn update(
        &mut self,
        weights: &mut [&mut Array2<f64>],
        biases: &mut [&mut Array2<f64>],
        weight_grads: &[Array2<f64>],
        bias_grads: &[Array2<f64>],
    ) -> Result<()> {
        check_update_shapes(weights, biases, weight_grads, bias_grads)?;

        let lr = self.learning_rate;
        for (param, grad) in weights.iter_mut().zip(weight_grads) {
            param.scaled_add(-lr, grad);
        }
        for (param, grad) in biases.iter_mut().zip(bias_grads) {
            param.scaled_add(-lr, grad);
        }
        self.t += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.t = 0;
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn step_count(&self) -> u64 {
        self.t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineError;
    use ndarray::array;

    #[test]
    fn test_sgd_rejects_non_positive_rate() {
        assert!(matches!(
            Sgd::new(0.0),
            Err(EngineError::InvalidHyperparameter(_))
        ));
        assert!(Sgd::new(-0.1).is_err());
    }

    #[test]
    fn test_sgd_mismatched_shapes() {
        let mut optimizer = Sgd::new(0.1).unwrap();
        let mut w = array![[1.0, 2.0]];
        let mut b = array![[0.0]];
        let result = optimizer.update(
            &mut [&mut w],
            &mut [&mut b],
            &[array![[1.0], [2.0]]],
            &[array![[0.0]]],
        );
        assert!(matches!(result, Err(EngineError::ShapeMismatch(_))));
        assert_eq!(w, array![[1.0, 2.0]]);
        assert_eq!(optimizer.step_count(), 0);
    }

    #[test]
    fn test_sgd_counts_steps() {
        let mut optimizer = Sgd::new(0.01).unwrap();
        let mut w = array![[1.0]];
        let mut b = array![[1.0]];
        for _ in 0..3 {
            optimizer
                .update(&mut [&mut w], &mut [&mut b], &[array![[1.0]]], &[array![[1.0]]])
                .unwrap();
        }
        assert_eq!(optimizer.step_count(), 3);
        optimizer.reset();
        assert_eq!(optimizer.step_count(), 0);
    }
}
