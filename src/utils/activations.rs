//! Activation functions for neural networks
//!
//! This module provides the activation functions used by every network in the engine:
//! - Sigmoid (output heads and LSTM gates)
//! - ReLU (hidden layers of the feedforward networks)
//! - Tanh (LSTM candidate and cell output)
//!
//! Every exponential clips its input to `[-EXP_CLIP, EXP_CLIP]` first. Without this
//! guard a single large pre-activation overflows `exp` and the resulting `inf`/`NaN`
//! spreads through the whole parameter set on the next update.

use ndarray::Array2;

/// Bound applied to pre-activations before any exponential.
pub const EXP_CLIP: f64 = 500.0;

/// Sigmoid activation: `1 / (1 + exp(-clip(x)))`.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x.clamp(-EXP_CLIP, EXP_CLIP)).exp())
}

/// Sigmoid derivative taken on the activation output `a = sigmoid(z)`.
///
/// Returns `a * (1 - a)`.
pub fn sigmoid_derivative(a: f64) -> f64 {
    a * (1.0 - a)
}

/// ReLU activation: `max(0, x)`.
pub fn relu(x: f64) -> f64 {
    if x > 0.0 {
        x
    } else {
        0.0
    }
}

/// ReLU derivative: `1` where the value is strictly positive, else `0`.
///
/// Works on either the pre-activation or the ReLU output, since both are
/// positive at exactly the same positions.
pub fn relu_derivative(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Hyperbolic tangent with the same input clipping as [`sigmoid`].
pub fn tanh(x: f64) -> f64 {
    x.clamp(-EXP_CLIP, EXP_CLIP).tanh()
}

/// Tanh derivative taken on the activation output `t = tanh(z)`.
pub fn tanh_derivative(t: f64) -> f64 {
    1.0 - t * t
}

/// Elementwise [`sigmoid`].
pub fn sigmoid_array(z: &Array2<f64>) -> Array2<f64> {
    z.mapv(sigmoid)
}

/// Elementwise [`sigmoid_derivative`] on activation outputs.
pub fn sigmoid_derivative_array(a: &Array2<f64>) -> Array2<f64> {
    a.mapv(sigmoid_derivative)
}

/// Elementwise [`relu`].
pub fn relu_array(z: &Array2<f64>) -> Array2<f64> {
    z.mapv(relu)
}

/// Elementwise [`relu_derivative`].
pub fn relu_derivative_array(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(relu_derivative)
}

/// Elementwise [`tanh`].
pub fn tanh_array(z: &Array2<f64>) -> Array2<f64> {
    z.mapv(tanh)
}

/// Elementwise [`tanh_derivative`] on activation outputs.
pub fn tanh_derivative_array(t: &Array2<f64>) -> Array2<f64> {
    t.mapv(tanh_derivative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_sigmoid_zero() {
        assert!((sigmoid(0.0) - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_sigmoid_extremes_are_finite() {
        assert!(sigmoid(1e6).is_finite());
        assert!(sigmoid(-1e6).is_finite());
        assert!(sigmoid(-1e6) >= 0.0);
        assert!((sigmoid(1e6) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_sigmoid_derivative_at_half() {
        assert!((sigmoid_derivative(0.5) - 0.25).abs() < EPSILON);
    }

    #[test]
    fn test_relu_mixed() {
        let data = array![[-2.0, -1.0, 0.0, 1.0, 2.0]];
        assert_eq!(relu_array(&data), array![[0.0, 0.0, 0.0, 1.0, 2.0]]);
        assert_eq!(
            relu_derivative_array(&data),
            array![[0.0, 0.0, 0.0, 1.0, 1.0]]
        );
    }

    #[test]
    fn test_tanh_clipped() {
        assert!((tanh(1e9) - 1.0).abs() < EPSILON);
        assert!((tanh_derivative(tanh(0.0)) - 1.0).abs() < EPSILON);
    }
}
