//! Dense (fully connected) layer implementation
//!
//! This module provides a DenseLayer (also known as Linear or Fully Connected layer)
//! that performs the transformation: output = input × weights + biases

use crate::error::{shape_mismatch, Result};
use crate::layers::Layer;
use crate::utils::SeededRng;
use ndarray::{Array2, Axis};

/// Dense (fully connected) layer with weights and biases.
///
/// Performs the linear transformation: y = xW + b
/// where x is the input (batch_size × input_size),
/// W is the weight matrix (input_size × output_size),
/// and b is the bias row (1 × output_size), broadcast over the batch.
///
/// # Example
///
/// ```
/// use neuropet::layers::{DenseLayer, Layer};
/// use neuropet::utils::SeededRng;
///
/// let mut rng = SeededRng::new(42);
/// let layer = DenseLayer::new(18, 32, &mut rng);
/// assert_eq!(layer.input_size(), 18);
/// assert_eq!(layer.output_size(), 32);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    pub(crate) weights: Array2<f64>,
    pub(crate) biases: Array2<f64>,
}

/// Parameter and input gradients of one dense layer.
#[derive(Debug, Clone)]
pub struct DenseGradients {
    pub weights: Array2<f64>,
    pub biases: Array2<f64>,
    pub input: Array2<f64>,
}

impl DenseLayer {
    /// Create a new DenseLayer with He initialization.
    ///
    /// Weights are drawn from `N(0, 1) * sqrt(2 / input_size)`, which keeps the
    /// variance of ReLU activations stable from layer to layer. Biases start at zero.
    ///
    /// # Arguments
    ///
    /// * `input_size` - Number of input features
    /// * `output_size` - Number of output features
    /// * `rng` - Random number generator for weight initialization
    pub fn new(input_size: usize, output_size: usize, rng: &mut SeededRng) -> Self {
        let scale = (2.0 / input_size.max(1) as f64).sqrt();
        Self {
            weights: rng.standard_normal(input_size, output_size) * scale,
            biases: Array2::zeros((1, output_size)),
        }
    }

    /// Small-scale initialization `N(0, 1) * scale`, used for recurrent output heads.
    pub fn with_scale(input_size: usize, output_size: usize, scale: f64, rng: &mut SeededRng) -> Self {
        Self {
            weights: rng.standard_normal(input_size, output_size) * scale,
            biases: Array2::zeros((1, output_size)),
        }
    }

    /// Rebuild a layer from stored parameters.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::ShapeMismatch`] unless `biases` is `1 × weights.ncols()`.
    pub fn from_parts(weights: Array2<f64>, biases: Array2<f64>) -> Result<Self> {
        let expected = (1, weights.ncols());
        if biases.dim() != expected {
            return Err(shape_mismatch("dense bias", expected, biases.dim()));
        }
        Ok(Self { weights, biases })
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn biases(&self) -> &Array2<f64> {
        &self.biases
    }

    pub fn weights_mut(&mut self) -> &mut Array2<f64> {
        &mut self.weights
    }

    pub fn biases_mut(&mut self) -> &mut Array2<f64> {
        &mut self.biases
    }

    /// Mutable borrows of both parameters at once, for optimizer updates.
    pub(crate) fn params_mut(&mut self) -> (&mut Array2<f64>, &mut Array2<f64>) {
        (&mut self.weights, &mut self.biases)
    }

    /// Linear transform `input · W + b`.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::ShapeMismatch`] if `input` does not have `input_size` columns.
    pub fn forward(&self, input: &Array2<f64>) -> Result<Array2<f64>> {
        if input.ncols() != self.weights.nrows() {
            return Err(shape_mismatch(
                "dense input",
                (input.nrows(), self.weights.nrows()),
                input.dim(),
            ));
        }
        Ok(input.dot(&self.weights) + &self.biases)
    }

    /// Backward pass for the linear transform.
    ///
    /// `delta` is the gradient of the loss with respect to this layer's
    /// pre-activation output. Gradients are summed over the batch; callers that
    /// want a mean fold the `1 / m` factor into `delta`.
    pub fn backward(&self, input: &Array2<f64>, delta: &Array2<f64>) -> DenseGradients {
        DenseGradients {
            weights: input.t().dot(delta),
            biases: delta.sum_axis(Axis(0)).insert_axis(Axis(0)),
            input: delta.dot(&self.weights.t()),
        }
    }

    /// Copy parameters from a structurally identical layer.
    pub(crate) fn copy_from(&mut self, other: &DenseLayer) -> Result<()> {
        if self.weights.dim() != other.weights.dim() {
            return Err(shape_mismatch("copied weights", self.weights.dim(), other.weights.dim()));
        }
        self.weights.assign(&other.weights);
        self.biases.assign(&other.biases);
        Ok(())
    }
}

impl Layer for DenseLayer {
    fn infer(&self, input: &Array2<f64>) -> Result<Array2<f64>> {
        self.forward(input)
    }

    fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_dense_layer_creation() {
        let mut rng = SeededRng::new(42);
        let layer = DenseLayer::new(10, 5, &mut rng);

        assert_eq!(layer.input_size(), 10);
        assert_eq!(layer.output_size(), 5);
        assert_eq!(layer.weights.dim(), (10, 5));
        assert_eq!(layer.biases.dim(), (1, 5));
        assert!(layer.biases.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_dense_layer_parameter_count() {
        let mut rng = SeededRng::new(42);
        let layer = DenseLayer::new(18, 32, &mut rng);

        // 18 × 32 weights + 32 biases
        assert_eq!(layer.parameter_count(), 18 * 32 + 32);
    }

    #[test]
    fn test_deterministic_initialization() {
        let mut rng1 = SeededRng::new(42);
        let layer1 = DenseLayer::new(10, 5, &mut rng1);

        let mut rng2 = SeededRng::new(42);
        let layer2 = DenseLayer::new(10, 5, &mut rng2);

        // Same seed should produce identical weights
        assert_eq!(layer1, layer2);
    }

    #[test]
    fn test_forward_broadcasts_bias() {
        let layer = DenseLayer::from_parts(array![[1.0, 0.0], [0.0, 2.0]], array![[0.5, -0.5]]).unwrap();
        let out = layer.forward(&array![[1.0, 1.0], [2.0, 0.0]]).unwrap();
        assert_eq!(out, array![[1.5, 1.5], [2.5, -0.5]]);
    }

    #[test]
    fn test_forward_rejects_wrong_width() {
        let mut rng = SeededRng::new(1);
        let layer = DenseLayer::new(3, 2, &mut rng);
        assert!(layer.forward(&Array2::zeros((1, 4))).is_err());
    }

    #[test]
    fn test_backward_shapes() {
        let mut rng = SeededRng::new(3);
        let layer = DenseLayer::new(4, 3, &mut rng);
        let input = Array2::ones((2, 4));
        let delta = Array2::ones((2, 3));
        let grads = layer.backward(&input, &delta);
        assert_eq!(grads.weights.dim(), (4, 3));
        assert_eq!(grads.biases, array![[2.0, 2.0, 2.0]]);
        assert_eq!(grads.input.dim(), (2, 4));
    }

    #[test]
    fn test_from_parts_checks_bias() {
        assert!(DenseLayer::from_parts(Array2::zeros((2, 3)), Array2::zeros((1, 2))).is_err());
    }
}
