//! Optimizer abstractions for neural network parameter updates
//!
//! This module provides the Optimizer trait and implementations for the
//! optimization algorithms used to update network parameters during training,
//! plus global-norm gradient clipping.
//!
//! # Overview
//!
//! Optimizers define how to use gradients to update model parameters. The basic
//! gradient descent update is `weight = weight - learning_rate * gradient`; Adam and
//! RMSprop keep per-parameter moment buffers that adapt the step size.
//!
//! # Available Optimizers
//!
//! - SGD: Vanilla stochastic gradient descent
//! - Adam: Adaptive moment estimation with bias correction
//! - RMSprop: Moving average of squared gradients
//!
//! # Ownership
//!
//! A network owns its parameters and its optimizer. During [`Optimizer::update`] the
//! optimizer receives mutable borrows of the parameters for the duration of the call
//! only; it never keeps references between calls. Its own state (moment buffers and
//! step counter) lives as long as the optimizer and is serialized with it.
//!
//! # Example
//!
//! ```
//! use ndarray::array;
//! use neuropet::optimizers::{Adam, Optimizer};
//!
//! let mut optimizer = Adam::new(0.001, 0.9, 0.999, 1e-8).unwrap();
//! let mut w = array![[1.0, 2.0]];
//! let mut b = array![[0.5]];
//! let gw = array![[0.1, -0.1]];
//! let gb = array![[0.2]];
//!
//! optimizer
//!     .update(&mut [&mut w], &mut [&mut b], &[gw], &[gb])
//!     .unwrap();
//! assert!(w[[0, 0]] < 1.0);
//! ```

pub mod adam;
pub mod rmsprop;
pub mod sgd;

pub use adam::Adam;
pub use rmsprop::RmsProp;
pub use sgd::Sgd;

use crate::error::{shape_mismatch, EngineError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Stabilizer added to the norm when computing the clipping coefficient.
const CLIP_EPSILON: f64 = 1e-6;

/// Core trait for neural network optimizers.
///
/// All optimizer types implement this trait to provide a uniform interface for
/// parameter updates during training.
pub trait Optimizer {
    /// Update weights and biases in place from their gradients.
    ///
    /// `weights[i]` is updated with `weight_grads[i]` and `biases[i]` with
    /// `bias_grads[i]`. Lists must have matching lengths and every gradient must
    /// have the shape of its parameter.
    ///
    /// # Errors
    ///
    /// [`EngineError::ShapeMismatch`] if list lengths or tensor shapes disagree, or
    /// if stored moment buffers do not match the parameters. No parameter is
    /// touched when an error is returned.
    fn update(
        &mut self,
        weights: &mut [&mut Array2<f64>],
        biases: &mut [&mut Array2<f64>],
        weight_grads: &[Array2<f64>],
        bias_grads: &[Array2<f64>],
    ) -> Result<()>;

    /// Clear moment buffers and the step counter.
    fn reset(&mut self);

    /// Current base learning rate.
    fn learning_rate(&self) -> f64;

    /// Replace the base learning rate (used by schedulers).
    fn set_learning_rate(&mut self, lr: f64);

    /// Number of updates applied so far.
    fn step_count(&self) -> u64;
}

/// Tagged choice of optimizer, owned by a network and serialized with a `"type"` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OptimizerKind {
    Sgd(Sgd),
    Adam(Adam),
    RmsProp(RmsProp),
}

/// Optimizer family, used when building a network before any state exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerType {
    Sgd,
    #[default]
    Adam,
    RmsProp,
}

impl OptimizerKind {
    /// Fresh optimizer of the given family with default hyperparameters.
    pub fn build(kind: OptimizerType, learning_rate: f64) -> Result<Self> {
        Ok(match kind {
            OptimizerType::Sgd => OptimizerKind::Sgd(Sgd::new(learning_rate)?),
            OptimizerType::Adam => OptimizerKind::Adam(Adam::with_learning_rate(learning_rate)?),
            OptimizerType::RmsProp => OptimizerKind::RmsProp(RmsProp::with_learning_rate(learning_rate)?),
        })
    }

    /// Re-check hyperparameters, e.g. after loading a document.
    pub fn validate(&self) -> Result<()> {
        match self {
            OptimizerKind::Sgd(opt) => opt.validate(),
            OptimizerKind::Adam(opt) => opt.validate(),
            OptimizerKind::RmsProp(opt) => opt.validate(),
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerKind::Sgd(_) => "sgd",
            OptimizerKind::Adam(_) => "adam",
            OptimizerKind::RmsProp(_) => "rmsprop",
        }
    }
}

impl Optimizer for OptimizerKind {
    fn update(
        &mut self,
        weights: &mut [&mut Array2<f64>],
        biases: &mut [&mut Array2<f64>],
        weight_grads: &[Array2<f64>],
        bias_grads: &[Array2<f64>],
    ) -> Result<()> {
        match self {
            OptimizerKind::Sgd(opt) => opt.update(weights, biases, weight_grads, bias_grads),
            OptimizerKind::Adam(opt) => opt.update(weights, biases, weight_grads, bias_grads),
            OptimizerKind::RmsProp(opt) => opt.update(weights, biases, weight_grads, bias_grads),
        }
    }

    fn reset(&mut self) {
        match self {
            OptimizerKind::Sgd(opt) => opt.reset(),
            OptimizerKind::Adam(opt) => opt.reset(),
            OptimizerKind::RmsProp(opt) => opt.reset(),
        }
    }

    fn learning_rate(&self) -> f64 {
        match self {
            OptimizerKind::Sgd(opt) => opt.learning_rate(),
            OptimizerKind::Adam(opt) => opt.learning_rate(),
            OptimizerKind::RmsProp(opt) => opt.learning_rate(),
        }
    }

    fn set_learning_rate(&mut self, lr: f64) {
        match self {
            OptimizerKind::Sgd(opt) => opt.set_learning_rate(lr),
            OptimizerKind::Adam(opt) => opt.set_learning_rate(lr),
            OptimizerKind::RmsProp(opt) => opt.set_learning_rate(lr),
        }
    }

    fn step_count(&self) -> u64 {
        match self {
            OptimizerKind::Sgd(opt) => opt.step_count(),
            OptimizerKind::Adam(opt) => opt.step_count(),
            OptimizerKind::RmsProp(opt) => opt.step_count(),
        }
    }
}

/// Global L2 norm across every tensor in `grads`.
pub fn global_norm(grads: &[Array2<f64>]) -> f64 {
    grads
        .iter()
        .map(|g| g.iter().map(|x| x * x).sum::<f64>())
        .sum::<f64>()
        .sqrt()
}

/// Clip gradients by global norm.
///
/// If the global L2 norm over all tensors exceeds `max_norm`, every tensor is
/// scaled by `max_norm / (norm + 1e-6)`. A non-positive `max_norm` disables
/// clipping. Returns the norm measured before clipping.
pub fn clip_gradients(grads: &mut [Array2<f64>], max_norm: f64) -> f64 {
    let norm = global_norm(grads);
    if max_norm > 0.0 && norm > max_norm {
        let coef = max_norm / (norm + CLIP_EPSILON);
        for grad in grads.iter_mut() {
            grad.mapv_inplace(|g| g * coef);
        }
    }
    norm
}

pub(crate) fn validate_learning_rate(lr: f64) -> Result<()> {
    if !(lr.is_finite() && lr > 0.0) {
        return Err(EngineError::InvalidHyperparameter(format!(
            "learning rate must be positive, got {}",
            lr
        )));
    }
    Ok(())
}

pub(crate) fn validate_unit_rate(name: &str, value: f64) -> Result<()> {
    if !(0.0..1.0).contains(&value) {
        return Err(EngineError::InvalidHyperparameter(format!(
            "{} must be in [0, 1), got {}",
            name, value
        )));
    }
    Ok(())
}

pub(crate) fn validate_epsilon(epsilon: f64) -> Result<()> {
    if !(epsilon.is_finite() && epsilon > 0.0) {
        return Err(EngineError::InvalidHyperparameter(format!(
            "epsilon must be positive, got {}",
            epsilon
        )));
    }
    Ok(())
}

/// Check that parameter and gradient lists line up tensor by tensor.
pub(crate) fn check_update_shapes(
    weights: &[&mut Array2<f64>],
    biases: &[&mut Array2<f64>],
    weight_grads: &[Array2<f64>],
    bias_grads: &[Array2<f64>],
) -> Result<()> {
    if weights.len() != weight_grads.len() || biases.len() != bias_grads.len() {
        return Err(EngineError::ShapeMismatch(format!(
            "optimizer received {} weights / {} weight gradients and {} biases / {} bias gradients",
            weights.len(),
            weight_grads.len(),
            biases.len(),
            bias_grads.len()
        )));
    }
    for (i, (param, grad)) in weights.iter().zip(weight_grads).enumerate() {
        if param.dim() != grad.dim() {
            return Err(shape_mismatch(&format!("weight gradient {}", i), param.dim(), grad.dim()));
        }
    }
    for (i, (param, grad)) in biases.iter().zip(bias_grads).enumerate() {
        if param.dim() != grad.dim() {
            return Err(shape_mismatch(&format!("bias gradient {}", i), param.dim(), grad.dim()));
        }
    }
    Ok(())
}

/// Zero buffers shaped like `params`.
pub(crate) fn zeros_like(params: &[&mut Array2<f64>]) -> Vec<Array2<f64>> {
    params.iter().map(|p| Array2::zeros(p.raw_dim())).collect()
}

/// Check that stored moment buffers still match the parameters they track.
pub(crate) fn check_buffers(context: &str, buffers: &[Array2<f64>], params: &[&mut Array2<f64>]) -> Result<()> {
    if buffers.len() != params.len() {
        return Err(EngineError::ShapeMismatch(format!(
            "{}: {} buffers for {} parameters",
            context,
            buffers.len(),
            params.len()
        )));
    }
    for (buffer, param) in buffers.iter().zip(params) {
        if buffer.dim() != param.dim() {
            return Err(shape_mismatch(context, param.dim(), buffer.dim()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_clip_gradients_below_threshold_untouched() {
        let mut grads = vec![array![[0.3, 0.4]]];
        let norm = clip_gradients(&mut grads, 5.0);
        assert!((norm - 0.5).abs() < 1e-12);
        assert_eq!(grads[0], array![[0.3, 0.4]]);
    }

    #[test]
    fn test_clip_gradients_disabled_with_zero_norm() {
        let mut grads = vec![array![[30.0, 40.0]]];
        clip_gradients(&mut grads, 0.0);
        assert_eq!(grads[0], array![[30.0, 40.0]]);
    }

    #[test]
    fn test_kind_serializes_type_tag() {
        let kind = OptimizerKind::Sgd(Sgd::new(0.1).unwrap());
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], "sgd");
        let back: OptimizerKind = serde_json::from_value(value).unwrap();
        assert_eq!(back, kind);
    }
}
