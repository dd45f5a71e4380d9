//! Layer trait definition for neural network layers
//!
//! This module defines the core Layer trait shared by the feedforward building
//! blocks. Training-time passes differ per layer (batch normalization needs its
//! batch statistics, dropout needs a random source), so the trait covers only
//! what every layer has in common: inference and its dimensions.

use crate::error::Result;
use ndarray::Array2;

/// Core trait for neural network layers.
///
/// # Example
///
/// ```
/// use ndarray::Array2;
/// use neuropet::layers::{DenseLayer, Layer};
/// use neuropet::utils::SeededRng;
///
/// let mut rng = SeededRng::new(7);
/// let layer = DenseLayer::new(4, 2, &mut rng);
/// let output = layer.infer(&Array2::zeros((3, 4))).unwrap();
/// assert_eq!(output.dim(), (3, 2));
/// ```
pub trait Layer {
    /// Inference-mode forward pass over a `batch × input_size` matrix.
    ///
    /// Deterministic: repeated calls with the same input return identical output.
    fn infer(&self, input: &Array2<f64>) -> Result<Array2<f64>>;

    /// Get the input size of the layer.
    fn input_size(&self) -> usize;

    /// Get the output size of the layer.
    fn output_size(&self) -> usize;

    /// Get the number of trainable parameters in the layer.
    fn parameter_count(&self) -> usize;
}
