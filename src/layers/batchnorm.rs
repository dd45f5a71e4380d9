//! Batch normalization layer implementation
//!
//! This module provides a BatchNormLayer that normalizes activations across the batch
//! dimension, improving training stability for the deeper feedforward networks.
//!
//! # Batch Normalization Theory
//!
//! Batch normalization normalizes the inputs to have zero mean and unit variance within each
//! mini-batch, then applies learnable scale (gamma) and shift (beta) parameters:
//!
//! 1. Compute batch statistics: mean μ and variance σ² across the batch
//! 2. Normalize: x_norm = (x - μ) / sqrt(σ² + ε)
//! 3. Scale and shift: y = γ * x_norm + β
//!
//! During training the layer normalizes with batch statistics and the caller commits
//! them into the running statistics with [`BatchNormLayer::commit_statistics`] once the
//! training step has succeeded. During inference the running statistics are used
//! instead, so predictions are deterministic.
//!
//! A batch of a single row has zero variance, which would collapse every feature to
//! `β`. Such batches are normalized with the running statistics even in training mode
//! and leave those statistics untouched.
//!
//! # References
//!
//! Ioffe, S., & Szegedy, C. (2015). Batch Normalization: Accelerating Deep Network Training
//! by Reducing Internal Covariate Shift. ICML.

use crate::error::{shape_mismatch, EngineError, Result};
use crate::layers::Layer;
use crate::utils::matrix::nested;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

fn default_epsilon() -> f64 {
    BatchNormLayer::DEFAULT_EPSILON
}

fn default_momentum() -> f64 {
    BatchNormLayer::DEFAULT_MOMENTUM
}

/// Batch normalization layer with learnable scale and shift parameters.
///
/// Parameters and running statistics are `1 × size` rows. The serialized form
/// carries `gamma`, `beta`, `running_mean` and `running_var` as nested lists.
///
/// # Example
///
/// ```
/// use neuropet::layers::{BatchNormLayer, Layer};
///
/// let layer = BatchNormLayer::new(32).unwrap();
/// assert_eq!(layer.input_size(), 32);
/// assert_eq!(layer.parameter_count(), 64); // 32 gamma + 32 beta
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNormLayer {
    #[serde(with = "nested")]
    pub(crate) gamma: Array2<f64>,
    #[serde(with = "nested")]
    pub(crate) beta: Array2<f64>,
    #[serde(with = "nested")]
    running_mean: Array2<f64>,
    #[serde(with = "nested")]
    running_var: Array2<f64>,
    #[serde(default = "default_epsilon")]
    epsilon: f64,
    #[serde(default = "default_momentum")]
    momentum: f64,
}

/// Values from a training forward pass needed by the backward pass.
#[derive(Debug, Clone)]
pub struct BatchNormCache {
    normalized: Array2<f64>,
    inv_std: Array2<f64>,
    /// Batch statistics to commit, `None` when running statistics were used.
    batch_stats: Option<(Array2<f64>, Array2<f64>)>,
}

/// Gradients produced by [`BatchNormLayer::backward`].
#[derive(Debug, Clone)]
pub struct BatchNormGradients {
    pub input: Array2<f64>,
    pub gamma: Array2<f64>,
    pub beta: Array2<f64>,
}

impl BatchNormLayer {
    pub const DEFAULT_EPSILON: f64 = 1e-5;
    pub const DEFAULT_MOMENTUM: f64 = 0.9;

    /// Creates a layer with `γ = 1`, `β = 0`, running mean `0` and running variance `1`.
    pub fn new(size: usize) -> Result<Self> {
        Self::with_hyperparameters(size, Self::DEFAULT_EPSILON, Self::DEFAULT_MOMENTUM)
    }

    /// Creates a layer with explicit `epsilon` and running-statistics `momentum`.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidHyperparameter`] if `epsilon` is not positive or
    /// `momentum` lies outside `[0, 1]`.
    pub fn with_hyperparameters(size: usize, epsilon: f64, momentum: f64) -> Result<Self> {
        let layer = Self {
            gamma: Array2::ones((1, size)),
            beta: Array2::zeros((1, size)),
            running_mean: Array2::zeros((1, size)),
            running_var: Array2::ones((1, size)),
            epsilon,
            momentum,
        };
        layer.validate()?;
        Ok(layer)
    }

    /// Check hyperparameters and that all four rows share one width.
    pub fn validate(&self) -> Result<()> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(EngineError::InvalidHyperparameter(format!(
                "batch norm epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if !(0.0..=1.0).contains(&self.momentum) {
            return Err(EngineError::InvalidHyperparameter(format!(
                "batch norm momentum must be in [0, 1], got {}",
                self.momentum
            )));
        }
        let expected = (1, self.gamma.ncols());
        for (name, row) in [
            ("batch norm gamma", &self.gamma),
            ("batch norm beta", &self.beta),
            ("batch norm running_mean", &self.running_mean),
            ("batch norm running_var", &self.running_var),
        ] {
            if row.dim() != expected {
                return Err(shape_mismatch(name, expected, row.dim()));
            }
        }
        Ok(())
    }

    pub fn gamma(&self) -> &Array2<f64> {
        &self.gamma
    }

    pub fn beta(&self) -> &Array2<f64> {
        &self.beta
    }

    pub fn gamma_mut(&mut self) -> &mut Array2<f64> {
        &mut self.gamma
    }

    pub fn beta_mut(&mut self) -> &mut Array2<f64> {
        &mut self.beta
    }

    pub fn running_mean(&self) -> &Array2<f64> {
        &self.running_mean
    }

    pub fn running_var(&self) -> &Array2<f64> {
        &self.running_var
    }

    fn check_input(&self, input: &Array2<f64>) -> Result<()> {
        if input.ncols() != self.gamma.ncols() {
            return Err(shape_mismatch(
                "batch norm input",
                (input.nrows(), self.gamma.ncols()),
                input.dim(),
            ));
        }
        Ok(())
    }

    fn scale_shift(&self, normalized: &Array2<f64>) -> Array2<f64> {
        normalized * &self.gamma + &self.beta
    }

    /// Training-mode forward pass.
    ///
    /// Does not touch the running statistics; pass the returned cache to
    /// [`Self::commit_statistics`] after the step succeeds.
    pub fn forward_train(&self, input: &Array2<f64>) -> Result<(Array2<f64>, BatchNormCache)> {
        self.check_input(input)?;

        if input.nrows() < 2 {
            return self.forward_running(input);
        }

        let mean = input
            .mean_axis(Axis(0))
            .map(|m| m.insert_axis(Axis(0)))
            .ok_or_else(|| EngineError::ShapeMismatch("empty batch".to_string()))?;
        let var = (input - &mean)
            .mapv(|c| c * c)
            .mean_axis(Axis(0))
            .map(|v| v.insert_axis(Axis(0)))
            .ok_or_else(|| EngineError::ShapeMismatch("empty batch".to_string()))?;
        let (output, mut cache) = self.normalize(input, &mean, &var);
        cache.batch_stats = Some((mean, var));
        Ok((output, cache))
    }

    /// Forward pass normalized with the running statistics, keeping a cache so
    /// gradients can still flow through `γ` and `β`.
    pub fn forward_running(&self, input: &Array2<f64>) -> Result<(Array2<f64>, BatchNormCache)> {
        self.check_input(input)?;
        Ok(self.normalize(input, &self.running_mean, &self.running_var))
    }

    /// Inference-mode forward pass using the running statistics.
    pub fn forward_inference(&self, input: &Array2<f64>) -> Result<Array2<f64>> {
        self.forward_running(input).map(|(output, _)| output)
    }

    fn normalize(&self, input: &Array2<f64>, mean: &Array2<f64>, var: &Array2<f64>) -> (Array2<f64>, BatchNormCache) {
        let eps = self.epsilon;
        let inv_std = var.mapv(|v| 1.0 / (v + eps).sqrt());
        let normalized = (input - mean) * &inv_std;
        let output = self.scale_shift(&normalized);
        (
            output,
            BatchNormCache {
                normalized,
                inv_std,
                batch_stats: None,
            },
        )
    }

    /// Fold the batch statistics of `cache` into the running statistics:
    /// `running = momentum · running + (1 − momentum) · batch`.
    pub fn commit_statistics(&mut self, cache: &BatchNormCache) {
        if let Some((mean, var)) = &cache.batch_stats {
            let momentum = self.momentum;
            self.running_mean.zip_mut_with(mean, |r, &b| {
                *r = momentum * *r + (1.0 - momentum) * b;
            });
            self.running_var.zip_mut_with(var, |r, &b| {
                *r = momentum * *r + (1.0 - momentum) * b;
            });
        }
    }

    /// Backward pass through the normalization.
    ///
    /// With batch statistics the gradient accounts for the dependence of the mean
    /// and variance on every row; with running statistics they are constants.
    pub fn backward(&self, grad_output: &Array2<f64>, cache: &BatchNormCache) -> BatchNormGradients {
        let gamma_grad = (grad_output * &cache.normalized)
            .sum_axis(Axis(0))
            .insert_axis(Axis(0));
        let beta_grad = grad_output.sum_axis(Axis(0)).insert_axis(Axis(0));
        let grad_normalized = grad_output * &self.gamma;

        let input = if cache.batch_stats.is_some() {
            let m = grad_output.nrows() as f64;
            let sum_grad = grad_normalized.sum_axis(Axis(0)).insert_axis(Axis(0));
            let sum_grad_norm = (&grad_normalized * &cache.normalized)
                .sum_axis(Axis(0))
                .insert_axis(Axis(0));
            let inner = grad_normalized * m - &sum_grad - &cache.normalized * &sum_grad_norm;
            inner * &cache.inv_std / m
        } else {
            grad_normalized * &cache.inv_std
        };

        BatchNormGradients {
            input,
            gamma: gamma_grad,
            beta: beta_grad,
        }
    }

    pub(crate) fn params_mut(&mut self) -> (&mut Array2<f64>, &mut Array2<f64>) {
        (&mut self.gamma, &mut self.beta)
    }
}

impl Layer for BatchNormLayer {
    fn infer(&self, input: &Array2<f64>) -> Result<Array2<f64>> {
        self.forward_inference(input)
    }

    fn input_size(&self) -> usize {
        self.gamma.ncols()
    }

    fn output_size(&self) -> usize {
        self.gamma.ncols()
    }

    fn parameter_count(&self) -> usize {
        2 * self.gamma.ncols() // gamma + beta
    }
}
