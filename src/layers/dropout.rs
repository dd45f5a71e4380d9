//! Dropout layer implementation for regularization
//!
//! This module provides a DropoutLayer that randomly drops (sets to zero) a fraction
//! of input units during training to prevent overfitting. During inference, all units
//! are kept and outputs are passed through unchanged.

use crate::error::{EngineError, Result};
use crate::utils::SeededRng;
use ndarray::Array2;

/// Inverted dropout.
///
/// During training, each unit is zeroed with probability `drop_rate` and the
/// survivors are scaled by `1 / (1 - drop_rate)`, so the expected activation is
/// unchanged and inference needs no rescaling.
///
/// The layer holds no mask between calls: [`DropoutLayer::forward_train`] returns
/// the mask it drew and the caller hands it back to [`DropoutLayer::backward`].
///
/// # Example
///
/// ```
/// use ndarray::Array2;
/// use neuropet::layers::DropoutLayer;
/// use neuropet::utils::SeededRng;
///
/// let layer = DropoutLayer::new(0.5).unwrap();
/// let mut rng = SeededRng::new(42);
/// let (output, mask) = layer.forward_train(&Array2::ones((4, 8)), &mut rng);
/// assert!(output.iter().all(|&v| v == 0.0 || v == 2.0));
/// assert!(mask.is_some());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropoutLayer {
    drop_rate: f64,
}

impl DropoutLayer {
    /// Creates a dropout layer.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidHyperparameter`] unless `drop_rate` is in `[0, 1)`.
    pub fn new(drop_rate: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&drop_rate) {
            return Err(EngineError::InvalidHyperparameter(format!(
                "dropout rate must be in [0, 1), got {}",
                drop_rate
            )));
        }
        Ok(Self { drop_rate })
    }

    pub fn drop_rate(&self) -> f64 {
        self.drop_rate
    }

    /// Apply a freshly drawn mask. Returns `None` for the mask when the rate is zero.
    pub fn forward_train(&self, input: &Array2<f64>, rng: &mut SeededRng) -> (Array2<f64>, Option<Array2<f64>>) {
        if self.drop_rate == 0.0 {
            return (input.clone(), None);
        }
        let (rows, cols) = input.dim();
        let mask = rng.bernoulli_mask(rows, cols, 1.0 - self.drop_rate);
        (input * &mask, Some(mask))
    }

    /// Route the upstream gradient through the mask used in the forward pass.
    pub fn backward(&self, grad_output: Array2<f64>, mask: Option<&Array2<f64>>) -> Array2<f64> {
        match mask {
            Some(mask) => grad_output * mask,
            None => grad_output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropout_rejects_rate_of_one() {
        assert!(DropoutLayer::new(1.0).is_err());
        assert!(DropoutLayer::new(-0.1).is_err());
    }

    #[test]
    fn test_zero_rate_is_identity() {
        let layer = DropoutLayer::new(0.0).unwrap();
        let mut rng = SeededRng::new(1);
        let input = Array2::from_elem((2, 3), 0.7);
        let (output, mask) = layer.forward_train(&input, &mut rng);
        assert_eq!(output, input);
        assert!(mask.is_none());
    }

    #[test]
    fn test_expected_magnitude_preserved() {
        let layer = DropoutLayer::new(0.2).unwrap();
        let mut rng = SeededRng::new(99);
        let (output, _) = layer.forward_train(&Array2::ones((100, 100)), &mut rng);
        let mean = output.sum() / 10_000.0;
        assert!((mean - 1.0).abs() < 0.05, "mean {}", mean);
    }

    #[test]
    fn test_backward_uses_forward_mask() {
        let layer = DropoutLayer::new(0.5).unwrap();
        let mut rng = SeededRng::new(5);
        let (_, mask) = layer.forward_train(&Array2::ones((3, 3)), &mut rng);
        let grad = layer.backward(Array2::ones((3, 3)), mask.as_ref());
        assert_eq!(Some(grad), mask);
    }
}
