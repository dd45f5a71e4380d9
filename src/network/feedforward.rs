//! Basic feedforward network: dense layers, ReLU hidden activations and a
//! sigmoid (or linear) output, trained by backpropagation.

use crate::error::{shape_mismatch, EngineError, Result};
use crate::layers::{DenseLayer, Layer};
use crate::network::{
    validate_clip_norm, validate_topology, Gradients, Network, NetworkDocument, NetworkKind,
};
use crate::optimizers::{validate_learning_rate, Optimizer, OptimizerKind, OptimizerType};
use crate::utils::activations::{relu_array, relu_derivative_array, sigmoid_array, sigmoid_derivative_array};
use crate::utils::lr_scheduler::{LRScheduler, LearningRateScheduler};
use crate::utils::matrix::{ensure_finite, nested_list, row_vector};
use crate::utils::SeededRng;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Activation applied by the output layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// Bounded outputs in (0, 1).
    #[default]
    Sigmoid,
    /// Unbounded outputs, used for Q-values.
    Linear,
}

impl OutputActivation {
    fn apply(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            OutputActivation::Sigmoid => sigmoid_array(z),
            OutputActivation::Linear => z.clone(),
        }
    }
}

/// Construction parameters for [`FeedForwardNetwork`].
///
/// # Example
///
/// ```
/// use neuropet::network::{FeedForwardConfig, FeedForwardNetwork};
/// use neuropet::utils::SeededRng;
///
/// let config = FeedForwardConfig {
///     learning_rate: 0.01,
///     ..FeedForwardConfig::new(9, vec![8, 6], 1)
/// };
/// let mut rng = SeededRng::new(42);
/// let network = FeedForwardNetwork::new(&config, &mut rng).unwrap();
/// assert_eq!(network.layer_sizes(), &[9, 8, 6, 1]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FeedForwardConfig {
    pub input_size: usize,
    pub hidden_layers: Vec<usize>,
    pub output_size: usize,
    pub learning_rate: f64,
    pub optimizer: OptimizerType,
    /// Maximum global gradient norm; `0` disables clipping.
    pub gradient_clip_norm: f64,
    /// Decay the learning rate exponentially (`1e-4` per step).
    pub use_lr_schedule: bool,
    pub output_activation: OutputActivation,
}

impl FeedForwardConfig {
    /// Adam, learning rate `0.001`, clip norm `5.0`, sigmoid output, no schedule.
    pub fn new(input_size: usize, hidden_layers: Vec<usize>, output_size: usize) -> Self {
        Self {
            input_size,
            hidden_layers,
            output_size,
            learning_rate: 0.001,
            optimizer: OptimizerType::Adam,
            gradient_clip_norm: 5.0,
            use_lr_schedule: false,
            output_activation: OutputActivation::Sigmoid,
        }
    }

    fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.hidden_layers.len() + 2);
        sizes.push(self.input_size);
        sizes.extend_from_slice(&self.hidden_layers);
        sizes.push(self.output_size);
        sizes
    }
}

/// Serialized form of a [`FeedForwardNetwork`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedForwardDocument {
    pub layers: Vec<usize>,
    pub learning_rate: f64,
    pub gradient_clip_norm: f64,
    #[serde(default)]
    pub output_activation: OutputActivation,
    #[serde(with = "nested_list")]
    pub weights: Vec<Array2<f64>>,
    #[serde(with = "nested_list")]
    pub biases: Vec<Array2<f64>>,
    pub optimizer: OptimizerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lr_scheduler: Option<LearningRateScheduler>,
}

/// Multi-layer perceptron trained by backpropagation.
///
/// Loss is half the mean squared error, `0.5 · Σ (prediction − target)² / m`.
/// Each training step computes gradients, rejects non-finite values, clips the
/// weight gradients and the bias gradients by global norm (separately), then
/// hands both to the owned optimizer.
#[derive(Debug, Clone)]
pub struct FeedForwardNetwork {
    layer_sizes: Vec<usize>,
    layers: Vec<DenseLayer>,
    output_activation: OutputActivation,
    learning_rate: f64,
    gradient_clip_norm: f64,
    optimizer: OptimizerKind,
    lr_scheduler: Option<LearningRateScheduler>,
}

impl FeedForwardNetwork {
    /// Build a network with He-initialized weights.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidHyperparameter`] for a zero-sized layer, a non-positive
    /// learning rate or a negative clip norm.
    pub fn new(config: &FeedForwardConfig, rng: &mut SeededRng) -> Result<Self> {
        let layer_sizes = config.layer_sizes();
        validate_topology(&layer_sizes)?;
        validate_learning_rate(config.learning_rate)?;
        validate_clip_norm(config.gradient_clip_norm)?;

        let layers = layer_sizes
            .windows(2)
            .map(|pair| DenseLayer::new(pair[0], pair[1], rng))
            .collect();
        let lr_scheduler = if config.use_lr_schedule {
            Some(LearningRateScheduler::exponential_default(config.learning_rate)?)
        } else {
            None
        };

        Ok(Self {
            layer_sizes,
            layers,
            output_activation: config.output_activation,
            learning_rate: config.learning_rate,
            gradient_clip_norm: config.gradient_clip_norm,
            optimizer: OptimizerKind::build(config.optimizer, config.learning_rate)?,
            lr_scheduler,
        })
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut DenseLayer> {
        self.layers.get_mut(index)
    }

    pub fn optimizer(&self) -> &OptimizerKind {
        &self.optimizer
    }

    pub fn lr_scheduler(&self) -> Option<&LearningRateScheduler> {
        self.lr_scheduler.as_ref()
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn output_activation(&self) -> OutputActivation {
        self.output_activation
    }

    pub fn input_size(&self) -> usize {
        self.layer_sizes[0]
    }

    pub fn output_size(&self) -> usize {
        self.layer_sizes[self.layer_sizes.len() - 1]
    }

    /// Forward pass. Returns every activation, the input first and the output last.
    pub fn forward(&self, x: &Array2<f64>) -> Result<Vec<Array2<f64>>> {
        ensure_finite("feedforward input", x)?;
        let last = self.layers.len() - 1;
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(x.clone());
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&activations[i])?;
            let a = if i == last {
                self.output_activation.apply(&z)
            } else {
                relu_array(&z)
            };
            activations.push(a);
        }
        Ok(activations)
    }

    fn check_targets(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(EngineError::ShapeMismatch("empty training batch".to_string()));
        }
        let expected = (x.nrows(), self.output_size());
        if y.dim() != expected {
            return Err(shape_mismatch("feedforward targets", expected, y.dim()));
        }
        Ok(())
    }

    fn backward(&self, activations: &[Array2<f64>], y: &Array2<f64>) -> Gradients {
        let m = y.nrows() as f64;
        let output = &activations[activations.len() - 1];
        let error = output - y;
        let mut delta = match self.output_activation {
            OutputActivation::Sigmoid => error * sigmoid_derivative_array(output),
            OutputActivation::Linear => error,
        } / m;

        let mut weights = Vec::with_capacity(self.layers.len());
        let mut biases = Vec::with_capacity(self.layers.len());
        for i in (0..self.layers.len()).rev() {
            let grads = self.layers[i].backward(&activations[i], &delta);
            weights.push(grads.weights);
            biases.push(grads.biases);
            if i > 0 {
                delta = grads.input * relu_derivative_array(&activations[i]);
            }
        }
        weights.reverse();
        biases.reverse();
        Gradients { weights, biases }
    }

    /// Unclipped gradients of the loss for one batch, one entry per layer.
    pub fn gradients(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<Gradients> {
        self.check_targets(x, y)?;
        let activations = self.forward(x)?;
        Ok(self.backward(&activations, y))
    }

    /// Half mean squared error of the current predictions.
    pub fn loss(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<f64> {
        self.check_targets(x, y)?;
        let prediction = self.predict(x)?;
        Ok(half_squared_error(&prediction, y))
    }

    /// One forward/backward/update step on a batch. Returns the loss measured
    /// before the update.
    ///
    /// # Errors
    ///
    /// [`EngineError::NonFinite`] if the loss or a gradient is NaN or infinite; the
    /// network is left unchanged.
    pub fn train_batch(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<f64> {
        self.check_targets(x, y)?;
        let activations = self.forward(x)?;
        let loss = half_squared_error(&activations[activations.len() - 1], y);
        let mut grads = self.backward(&activations, y);
        grads.ensure_finite("feedforward", loss)?;
        grads.clip(self.gradient_clip_norm);

        if let Some(scheduler) = self.lr_scheduler.as_mut() {
            self.optimizer.set_learning_rate(scheduler.get_lr());
            scheduler.step();
        }

        let (mut weights, mut biases): (Vec<_>, Vec<_>) =
            self.layers.iter_mut().map(DenseLayer::params_mut).unzip();
        self.optimizer
            .update(&mut weights, &mut biases, &grads.weights, &grads.biases)?;
        trace!(loss, step = self.optimizer.step_count(), "feedforward step");
        Ok(loss)
    }

    /// Train for `epochs` full-batch steps. Returns the loss of the last step.
    pub fn train(&mut self, x: &Array2<f64>, y: &Array2<f64>, epochs: usize) -> Result<f64> {
        let mut loss = self.loss(x, y)?;
        for _ in 0..epochs {
            loss = self.train_batch(x, y)?;
        }
        Ok(loss)
    }

    /// One training step on a single sample.
    pub fn train_one(&mut self, input: &[f64], target: &[f64]) -> Result<f64> {
        self.train_batch(&row_vector(input), &row_vector(target))
    }

    /// Network output for a batch.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut activations = self.forward(x)?;
        activations
            .pop()
            .ok_or_else(|| EngineError::ShapeMismatch("network has no layers".to_string()))
    }

    /// Network output for a single sample.
    pub fn predict_one(&self, input: &[f64]) -> Result<Vec<f64>> {
        let output = self.predict(&row_vector(input))?;
        Ok(output.iter().copied().collect())
    }

    /// Hard-copy every weight and bias from a network with the same topology.
    pub fn copy_parameters_from(&mut self, other: &FeedForwardNetwork) -> Result<()> {
        if self.layer_sizes != other.layer_sizes {
            return Err(EngineError::ShapeMismatch(format!(
                "cannot copy parameters from {:?} into {:?}",
                other.layer_sizes, self.layer_sizes
            )));
        }
        for (dst, src) in self.layers.iter_mut().zip(&other.layers) {
            dst.copy_from(src)?;
        }
        Ok(())
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    pub fn to_document(&self) -> FeedForwardDocument {
        FeedForwardDocument {
            layers: self.layer_sizes.clone(),
            learning_rate: self.learning_rate,
            gradient_clip_norm: self.gradient_clip_norm,
            output_activation: self.output_activation,
            weights: self.layers.iter().map(|l| l.weights().clone()).collect(),
            biases: self.layers.iter().map(|l| l.biases().clone()).collect(),
            optimizer: self.optimizer.clone(),
            lr_scheduler: self.lr_scheduler.clone(),
        }
    }

    /// Rebuild a network from its document, checking every shape against the topology.
    pub fn from_document(doc: FeedForwardDocument) -> Result<Self> {
        validate_topology(&doc.layers)?;
        validate_learning_rate(doc.learning_rate)?;
        validate_clip_norm(doc.gradient_clip_norm)?;
        doc.optimizer.validate()?;
        if let Some(scheduler) = &doc.lr_scheduler {
            scheduler.validate()?;
        }
        let layers = dense_layers_from_parts(&doc.layers, doc.weights, doc.biases)?;

        Ok(Self {
            layer_sizes: doc.layers,
            layers,
            output_activation: doc.output_activation,
            learning_rate: doc.learning_rate,
            gradient_clip_norm: doc.gradient_clip_norm,
            optimizer: doc.optimizer,
            lr_scheduler: doc.lr_scheduler,
        })
    }
}

/// `0.5 · Σ (prediction − target)² / m`.
pub(crate) fn half_squared_error(prediction: &Array2<f64>, target: &Array2<f64>) -> f64 {
    let m = target.nrows().max(1) as f64;
    0.5 * (prediction - target).mapv(|e| e * e).sum() / m
}

/// Pair stored weight and bias matrices into dense layers matching `sizes`.
pub(crate) fn dense_layers_from_parts(
    sizes: &[usize],
    weights: Vec<Array2<f64>>,
    biases: Vec<Array2<f64>>,
) -> Result<Vec<DenseLayer>> {
    let count = sizes.len() - 1;
    if weights.len() != count || biases.len() != count {
        return Err(EngineError::ShapeMismatch(format!(
            "topology {:?} needs {} weight/bias pairs, found {} weights and {} biases",
            sizes,
            count,
            weights.len(),
            biases.len()
        )));
    }
    weights
        .into_iter()
        .zip(biases)
        .zip(sizes.windows(2))
        .enumerate()
        .map(|(i, ((w, b), pair))| {
            let expected = (pair[0], pair[1]);
            if w.dim() != expected {
                return Err(shape_mismatch(&format!("weight {}", i), expected, w.dim()));
            }
            DenseLayer::from_parts(w, b)
        })
        .collect()
}

impl Network for FeedForwardNetwork {
    fn kind(&self) -> NetworkKind {
        NetworkKind::Dense
    }

    fn input_size(&self) -> usize {
        FeedForwardNetwork::input_size(self)
    }

    fn output_size(&self) -> usize {
        FeedForwardNetwork::output_size(self)
    }

    fn parameter_count(&self) -> usize {
        FeedForwardNetwork::parameter_count(self)
    }

    fn predict_vector(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        self.predict_one(input)
    }

    fn to_network_document(&self) -> NetworkDocument {
        NetworkDocument::Dense(self.to_document())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small_network(seed: u64) -> FeedForwardNetwork {
        let mut rng = SeededRng::new(seed);
        FeedForwardNetwork::new(&FeedForwardConfig::new(2, vec![3], 1), &mut rng).unwrap()
    }

    #[test]
    fn test_rejects_zero_sized_layer() {
        let mut rng = SeededRng::new(1);
        let config = FeedForwardConfig::new(2, vec![0], 1);
        assert!(matches!(
            FeedForwardNetwork::new(&config, &mut rng),
            Err(EngineError::InvalidHyperparameter(_))
        ));
    }

    #[test]
    fn test_forward_returns_every_activation() {
        let network = small_network(3);
        let activations = network.forward(&array![[0.5, -0.5]]).unwrap();
        assert_eq!(activations.len(), 3);
        assert_eq!(activations[1].dim(), (1, 3));
        assert!(activations[1].iter().all(|&a| a >= 0.0));
        let out = activations[2][[0, 0]];
        assert!(out > 0.0 && out < 1.0);
    }

    #[test]
    fn test_targets_must_match_output() {
        let network = small_network(4);
        assert!(matches!(
            network.gradients(&array![[0.0, 1.0]], &array![[1.0, 0.0]]),
            Err(EngineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let network = small_network(5);
        assert!(matches!(
            network.predict(&array![[f64::NAN, 0.0]]),
            Err(EngineError::NonFinite(_))
        ));
    }

    #[test]
    fn test_linear_output_is_unbounded() {
        let mut rng = SeededRng::new(6);
        let config = FeedForwardConfig {
            output_activation: OutputActivation::Linear,
            optimizer: OptimizerType::Sgd,
            learning_rate: 0.01,
            ..FeedForwardConfig::new(1, vec![4], 1)
        };
        let mut network = FeedForwardNetwork::new(&config, &mut rng).unwrap();
        for _ in 0..500 {
            network.train_one(&[1.0], &[-5.0]).unwrap();
        }
        assert!(network.predict_one(&[1.0]).unwrap()[0] < -4.0);
    }

    #[test]
    fn test_copy_parameters_requires_same_topology() {
        let mut a = small_network(7);
        let b = small_network(8);
        a.copy_parameters_from(&b).unwrap();
        assert_eq!(a.layers(), b.layers());

        let mut rng = SeededRng::new(9);
        let c = FeedForwardNetwork::new(&FeedForwardConfig::new(2, vec![4], 1), &mut rng).unwrap();
        assert!(a.copy_parameters_from(&c).is_err());
    }
}
