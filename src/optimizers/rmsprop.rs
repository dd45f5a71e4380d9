//! RMSprop optimizer implementation

use crate::error::Result;
use crate::optimizers::{
    check_buffers, check_update_shapes, validate_epsilon, validate_learning_rate,
    validate_unit_rate, zeros_like, Optimizer,
};
use crate::utils::matrix::optional_nested_list;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// RMSprop optimizer.
///
/// Keeps a moving average of squared gradients per parameter and divides the
/// step by its square root:
///
/// ```text
/// cache = decay * cache + (1 - decay) * gradient²
/// parameter = parameter - lr * gradient / (√cache + ε)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RmsProp {
    learning_rate: f64,
    decay_rate: f64,
    epsilon: f64,
    t: u64,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "optional_nested_list")]
    cache_weights: Option<Vec<Array2<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "optional_nested_list")]
    cache_biases: Option<Vec<Array2<f64>>>,
}

impl RmsProp {
    pub const DEFAULT_DECAY: f64 = 0.9;
    pub const DEFAULT_EPSILON: f64 = 1e-8;

    /// Creates a new RMSprop optimizer.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::InvalidHyperparameter`] if `learning_rate` or `epsilon`
    /// is not positive, or `decay_rate` lies outside `[0, 1)`.
    pub fn new(learning_rate: f64, decay_rate: f64, epsilon: f64) -> Result<Self> {
        let optimizer = Self {
            learning_rate,
            decay_rate,
            epsilon,
            t: 0,
            cache_weights: None,
            cache_biases: None,
        };
        optimizer.validate()?;
        Ok(optimizer)
    }

    pub fn with_learning_rate(learning_rate: f64) -> Result<Self> {
        Self::new(learning_rate, Self::DEFAULT_DECAY, Self::DEFAULT_EPSILON)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_learning_rate(self.learning_rate)?;
        validate_unit_rate("decay_rate", self.decay_rate)?;
        validate_epsilon(self.epsilon)
    }

    fn step_group(&self, params: &mut [&mut Array2<f64>], grads: &[Array2<f64>], cache: &mut [Array2<f64>]) {
        let (decay, eps, lr) = (self.decay_rate, self.epsilon, self.learning_rate);
        for ((param, grad), cache) in params.iter_mut().zip(grads).zip(cache.iter_mut()) {
            Zip::from(&mut **param)
                .and(grad)
                .and(cache)
                .for_each(|p, &g, c| {
                    *c = decay * *c + (1.0 - decay) * g * g;
                    *p -= lr * g / (c.sqrt() + eps);
                });
        }
    }
}

impl Optimizer for RmsProp {
    fn update(
        &mut self,
        weights: &mut [&mut Array2<f64>],
        biases: &mut [&mut Array2<f64>],
        weight_grads: &[Array2<f64>],
        bias_grads: &[Array2<f64>],
    ) -> Result<()> {
        check_update_shapes(weights, biases, weight_grads, bias_grads)?;

        let mut cache_weights = self
            .cache_weights
            .take()
            .unwrap_or_else(|| zeros_like(weights));
        let mut cache_biases = self
            .cache_biases
            .take()
            .unwrap_or_else(|| zeros_like(biases));

        let checked = check_buffers("rmsprop weight cache", &cache_weights, weights)
            .and_then(|_| check_buffers("rmsprop bias cache", &cache_biases, biases));

        if checked.is_ok() {
            self.t += 1;
            self.step_group(weights, weight_grads, &mut cache_weights);
            self.step_group(biases, bias_grads, &mut cache_biases);
        }

        self.cache_weights = Some(cache_weights);
        self.cache_biases = Some(cache_biases);
        checked
    }

    fn reset(&mut self) {
        self.cache_weights = None;
        self.cache_biases = None;
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
