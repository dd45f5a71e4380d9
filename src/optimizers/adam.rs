//! Adam (Adaptive Moment Estimation) optimizer implementation
//!
//! This module provides the Adam optimizer, which combines momentum and
//! adaptive learning rates with bias correction for improved convergence.

use crate::error::Result;
use crate::optimizers::{
    check_buffers, check_update_shapes, validate_epsilon, validate_learning_rate,
    validate_unit_rate, zeros_like, Optimizer,
};
use crate::utils::matrix::optional_nested_list;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Adam (Adaptive Moment Estimation) optimizer.
///
/// Adam maintains two moving averages for each parameter tensor:
///
/// 1. First moment (mean) of gradients (momentum)
/// 2. Second moment (uncentered variance) of gradients (adaptive learning rate)
///
/// The update rule is:
///
/// ```text
/// m_t = β1 * m_{t-1} + (1 - β1) * gradient
/// v_t = β2 * v_{t-1} + (1 - β2) * gradient²
/// m_hat = m_t / (1 - β1^t)
/// v_hat = v_t / (1 - β2^t)
/// parameter = parameter - α * m_hat / (√v_hat + ε)
/// ```
///
/// The moment buffers are zero-initialised lazily on the first update, shaped like
/// the parameters passed in. Weights and biases share the single step counter `t`.
/// Buffers are omitted from the serialized form until they exist.
///
/// # Reference
///
/// Kingma, D. P., & Ba, J. (2014). Adam: A method for stochastic optimization.
/// arXiv preprint arXiv:1412.6980.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: u64,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "optional_nested_list")]
    m_weights: Option<Vec<Array2<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "optional_nested_list")]
    v_weights: Option<Vec<Array2<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "optional_nested_list")]
    m_biases: Option<Vec<Array2<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "optional_nested_list")]
    v_biases: Option<Vec<Array2<f64>>>,
}

/// Moment buffers for one group of tensors (weights or biases).
struct MomentsMut<'a> {
    m: &'a mut [Array2<f64>],
    v: &'a mut [Array2<f64>],
}

impl Adam {
    /// Default first-moment decay.
    pub const DEFAULT_BETA1: f64 = 0.9;
    /// Default second-moment decay.
    pub const DEFAULT_BETA2: f64 = 0.999;
    /// Default numerical stabilizer.
    pub const DEFAULT_EPSILON: f64 = 1e-8;

    /// Creates a new Adam optimizer with the specified hyperparameters.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::InvalidHyperparameter`] if `learning_rate` or `epsilon`
    /// is not positive, or a beta lies outside `[0, 1)`.
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Result<Self> {
        let optimizer = Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m_weights: None,
            v_weights: None,
            m_biases: None,
            v_biases: None,
        };
        optimizer.validate()?;
        Ok(optimizer)
    }

    /// Adam with the standard `β1 = 0.9`, `β2 = 0.999`, `ε = 1e-8`.
    pub fn with_learning_rate(learning_rate: f64) -> Result<Self> {
        Self::new(
            learning_rate,
            Self::DEFAULT_BETA1,
            Self::DEFAULT_BETA2,
            Self::DEFAULT_EPSILON,
        )
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_learning_rate(self.learning_rate)?;
        validate_unit_rate("beta1", self.beta1)?;
        validate_unit_rate("beta2", self.beta2)?;
        validate_epsilon(self.epsilon)
    }

    /// Whether the moment buffers have been allocated.
    pub fn is_initialized(&self) -> bool {
        self.m_weights.is_some()
    }

    fn step_group(&self, params: &mut [&mut Array2<f64>], grads: &[Array2<f64>], moments: MomentsMut<'_>) {
        let (beta1, beta2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let bias_correction1 = 1.0 - beta1.powf(self.t as f64);
        let bias_correction2 = 1.0 - beta2.powf(self.t as f64);

        for (((param, grad), m), v) in params
            .iter_mut()
            .zip(grads)
            .zip(moments.m.iter_mut())
            .zip(moments.v.iter_mut())
        {
            Zip::from(&mut **param)
                .and(grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / bias_correction1;
                    let v_hat = *v / bias_correction2;
                    *p -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
    }
}

impl Optimizer for Adam {
    fn update(
        &mut self,
        weights: &mut [&mut Array2<f64>],
        biases: &mut [&mut Array2<f64>],
        weight_grads: &[Array2<f64>],
        bias_grads: &[Array2<f64>],
    ) -> Result<()> {
        check_update_shapes(weights, biases, weight_grads, bias_grads)?;

        if self.m_weights.is_none() {
            self.m_weights = Some(zeros_like(weights));
            self.v_weights = Some(zeros_like(weights));
            self.m_biases = Some(zeros_like(biases));
            self.v_biases = Some(zeros_like(biases));
        }

        let mut m_weights = self.m_weights.take().unwrap_or_default();
        let mut v_weights = self.v_weights.take().unwrap_or_default();
        let mut m_biases = self.m_biases.take().unwrap_or_default();
        let mut v_biases = self.v_biases.take().unwrap_or_default();

        let checked = check_buffers("adam weight moments", &m_weights, weights)
            .and_then(|_| check_buffers("adam weight moments", &v_weights, weights))
            .and_then(|_| check_buffers("adam bias moments", &m_biases, biases))
            .and_then(|_| check_buffers("adam bias moments", &v_biases, biases));

        if checked.is_ok() {
            self.t += 1;
            self.step_group(
                weights,
                weight_grads,
                MomentsMut {
                    m: &mut m_weights,
                    v: &mut v_weights,
                },
            );
            self.step_group(
                biases,
                bias_grads,
                MomentsMut {
                    m: &mut m_biases,
                    v: &mut v_biases,
                },
            );
        }

        self.m_weights = Some(m_weights);
        self.v_weights = Some(v_weights);
        self.m_biases = Some(m_biases);
        self.v_biases = Some(v_biases);
        checked
    }

    fn reset(&mut self) {
        self.m_weights = None;
        self.v_weights = None;
        self.m_biases = None;
        self.v_biases = None;
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
