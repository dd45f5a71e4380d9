//! Advanced feedforward network with batch normalization, dropout and residual
//! connections.
//!
//! Each hidden layer computes
//!
//! ```text
//! z = a_prev · W + b
//! z = batch_norm(z)          (when enabled)
//! h = relu(z)
//! d = dropout(h)             (training only)
//! a = d + a_prev             (residual, when enabled, not on the first hidden
//!                             layer, and only when the shapes match)
//! ```
//!
//! The output layer applies a sigmoid. The backward pass is exact through every
//! one of these steps: batch normalization contributes `∂γ`, `∂β` and the input
//! gradient through the batch statistics, dropout routes gradients through its
//! mask, and the skip path adds its gradient to the previous activation's.
//! `γ` and `β` are updated by the same optimizer as the dense parameters.

use crate::error::{shape_mismatch, EngineError, Result};
use crate::layers::{BatchNormCache, BatchNormLayer, DenseLayer, DropoutLayer, Layer};
use crate::network::feedforward::{dense_layers_from_parts, half_squared_error};
use crate::network::{
    validate_clip_norm, validate_topology, Gradients, Network, NetworkDocument, NetworkKind,
};
use crate::optimizers::{validate_learning_rate, Adam, Optimizer, OptimizerKind};
use crate::utils::activations::{relu_array, relu_derivative_array, sigmoid_array, sigmoid_derivative_array};
use crate::utils::lr_scheduler::{LRScheduler, LearningRateScheduler};
use crate::utils::matrix::{ensure_finite, nested_list, row_vector};
use crate::utils::SeededRng;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Forward-pass mode.
///
/// Training draws dropout masks from the supplied generator and normalizes with
/// batch statistics; inference is deterministic.
#[derive(Debug)]
pub enum Mode<'a> {
    Training(&'a mut SeededRng),
    Inference,
}

/// Construction parameters for [`AdvancedNetwork`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdvancedConfig {
    pub input_size: usize,
    pub hidden_layers: Vec<usize>,
    pub output_size: usize,
    pub learning_rate: f64,
    pub dropout_rate: f64,
    pub use_batch_norm: bool,
    pub use_residual: bool,
    pub gradient_clip_norm: f64,
}

impl AdvancedConfig {
    /// Learning rate `0.001`, dropout `0.25`, batch norm and residuals on, clip norm `5.0`.
    pub fn new(input_size: usize, hidden_layers: Vec<usize>, output_size: usize) -> Self {
        Self {
            input_size,
            hidden_layers,
            output_size,
            learning_rate: 0.001,
            dropout_rate: 0.25,
            use_batch_norm: true,
            use_residual: true,
            gradient_clip_norm: 5.0,
        }
    }
}

/// Serialized form of an [`AdvancedNetwork`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedDocument {
    pub layers: Vec<usize>,
    pub dropout_rate: f64,
    pub use_batch_norm: bool,
    pub use_residual: bool,
    pub gradient_clip_norm: f64,
    pub learning_rate: f64,
    #[serde(with = "nested_list")]
    pub weights: Vec<Array2<f64>>,
    #[serde(with = "nested_list")]
    pub biases: Vec<Array2<f64>>,
    pub optimizer: OptimizerKind,
    pub lr_scheduler: LearningRateScheduler,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub batch_norms: Vec<BatchNormLayer>,
}

#[derive(Debug, Clone)]
struct HiddenCache {
    batch_norm: Option<BatchNormCache>,
    relu: Array2<f64>,
    mask: Option<Array2<f64>>,
    residual: bool,
}

/// Everything one forward pass produced, consumed by the matching backward pass.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    activations: Vec<Array2<f64>>,
    hidden: Vec<HiddenCache>,
}

impl ForwardPass {
    /// Network output.
    pub fn output(&self) -> &Array2<f64> {
        &self.activations[self.activations.len() - 1]
    }

    /// Input, every hidden activation (after dropout and residual) and the output.
    pub fn activations(&self) -> &[Array2<f64>] {
        &self.activations
    }

    /// Dropout mask drawn for hidden layer `index`, if any.
    pub fn dropout_mask(&self, index: usize) -> Option<&Array2<f64>> {
        self.hidden.get(index).and_then(|h| h.mask.as_ref())
    }
}

/// Feedforward network with batch normalization, dropout and residual connections.
///
/// Trains with Adam and an exponential learning-rate schedule (`1e-4` decay per step).
#[derive(Debug, Clone)]
pub struct AdvancedNetwork {
    layer_sizes: Vec<usize>,
    layers: Vec<DenseLayer>,
    batch_norms: Vec<BatchNormLayer>,
    dropout: DropoutLayer,
    use_residual: bool,
    learning_rate: f64,
    gradient_clip_norm: f64,
    optimizer: OptimizerKind,
    lr_scheduler: LearningRateScheduler,
}

impl AdvancedNetwork {
    /// Build a network with He-initialized dense layers and fresh batch-norm layers.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidHyperparameter`] for a zero-sized layer, a non-positive
    /// learning rate, a dropout rate outside `[0, 1)` or a negative clip norm.
    pub fn new(config: &AdvancedConfig, rng: &mut SeededRng) -> Result<Self> {
        let mut layer_sizes = vec![config.input_size];
        layer_sizes.extend_from_slice(&config.hidden_layers);
        layer_sizes.push(config.output_size);
        validate_topology(&layer_sizes)?;
        validate_learning_rate(config.learning_rate)?;
        validate_clip_norm(config.gradient_clip_norm)?;

        let layers = layer_sizes
            .windows(2)
            .map(|pair| DenseLayer::new(pair[0], pair[1], rng))
            .collect();
        let batch_norms = if config.use_batch_norm {
            config
                .hidden_layers
                .iter()
                .map(|&size| BatchNormLayer::new(size))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        Ok(Self {
            layer_sizes,
            layers,
            batch_norms,
            dropout: DropoutLayer::new(config.dropout_rate)?,
            use_residual: config.use_residual,
            learning_rate: config.learning_rate,
            gradient_clip_norm: config.gradient_clip_norm,
            optimizer: OptimizerKind::Adam(Adam::with_learning_rate(config.learning_rate)?),
            lr_scheduler: LearningRateScheduler::exponential_default(config.learning_rate)?,
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

    pub fn batch_norms(&self) -> &[BatchNormLayer] {
        &self.batch_norms
    }

    pub fn batch_norm_mut(&mut self, index: usize) -> Option<&mut BatchNormLayer> {
        self.batch_norms.get_mut(index)
    }

    pub fn dropout_rate(&self) -> f64 {
        self.dropout.drop_rate()
    }

    pub fn optimizer(&self) -> &OptimizerKind {
        &self.optimizer
    }

    pub fn lr_scheduler(&self) -> &LearningRateScheduler {
        &self.lr_scheduler
    }

    pub fn input_size(&self) -> usize {
        self.layer_sizes[0]
    }

    pub fn output_size(&self) -> usize {
        self.layer_sizes[self.layer_sizes.len() - 1]
    }

    /// Forward pass in the given mode.
    ///
    /// Never modifies the network: batch statistics drawn in training mode are
    /// committed to the running statistics by [`Self::train_step`].
    pub fn forward(&self, x: &Array2<f64>, mut mode: Mode<'_>) -> Result<ForwardPass> {
        ensure_finite("advanced network input", x)?;
        let last = self.layers.len() - 1;
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        let mut hidden = Vec::with_capacity(last);
        activations.push(x.clone());

        for (i, layer) in self.layers.iter().enumerate() {
            let a_prev = &activations[i];
            let z = layer.forward(a_prev)?;
            if i == last {
                activations.push(sigmoid_array(&z));
                break;
            }

            let (z, batch_norm) = match (self.batch_norms.get(i), &mode) {
                (Some(bn), Mode::Training(_)) => {
                    let (out, cache) = bn.forward_train(&z)?;
                    (out, Some(cache))
                }
                (Some(bn), Mode::Inference) => {
                    let (out, cache) = bn.forward_running(&z)?;
                    (out, Some(cache))
                }
                (None, _) => (z, None),
            };
            let relu = relu_array(&z);
            let (dropped, mask) = match &mut mode {
                Mode::Training(rng) => self.dropout.forward_train(&relu, rng),
                Mode::Inference => (relu.clone(), None),
            };
            let residual = self.use_residual && i > 0 && a_prev.dim() == dropped.dim();
            let a = if residual { dropped + a_prev } else { dropped };

            hidden.push(HiddenCache {
                batch_norm,
                relu,
                mask,
                residual,
            });
            activations.push(a);
        }

        Ok(ForwardPass { activations, hidden })
    }

    fn check_targets(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(EngineError::ShapeMismatch("empty training batch".to_string()));
        }
        let expected = (x.nrows(), self.output_size());
        if y.dim() != expected {
            return Err(shape_mismatch("advanced network targets", expected, y.dim()));
        }
        Ok(())
    }

    /// Gradients for one forward pass. Dense parameters come first, followed by
    /// the batch-norm `γ` (with the weights) and `β` (with the biases).
    fn backward(&self, pass: &ForwardPass, y: &Array2<f64>) -> Gradients {
        let n = self.layers.len();
        let m = y.nrows() as f64;
        let output = pass.output();
        let delta = (output - y) * sigmoid_derivative_array(output) / m;

        let mut weights = Vec::with_capacity(n);
        let mut biases = Vec::with_capacity(n);
        let mut gammas = Vec::with_capacity(self.batch_norms.len());
        let mut betas = Vec::with_capacity(self.batch_norms.len());

        let head = self.layers[n - 1].backward(&pass.activations[n - 1], &delta);
        weights.push(head.weights);
        biases.push(head.biases);
        let mut upstream = head.input;

        for i in (0..n - 1).rev() {
            let cache = &pass.hidden[i];
            let through_dropout = self.dropout.backward(upstream.clone(), cache.mask.as_ref());
            let mut dz = through_dropout * relu_derivative_array(&cache.relu);
            if let (Some(bn), Some(bn_cache)) = (self.batch_norms.get(i), cache.batch_norm.as_ref()) {
                let grads = bn.backward(&dz, bn_cache);
                dz = grads.input;
                gammas.push(grads.gamma);
                betas.push(grads.beta);
            }

            let grads = self.layers[i].backward(&pass.activations[i], &dz);
            weights.push(grads.weights);
            biases.push(grads.biases);

            let mut next = grads.input;
            if cache.residual {
                next += &upstream;
            }
            upstream = next;
        }

        weights.reverse();
        biases.reverse();
        gammas.reverse();
        betas.reverse();
        weights.extend(gammas);
        biases.extend(betas);
        Gradients { weights, biases }
    }

    /// Unclipped gradients for one training-mode pass, drawing dropout masks from `rng`.
    ///
    /// Order: dense weights then batch-norm `γ` in `weights`; dense biases then
    /// batch-norm `β` in `biases`.
    pub fn gradients(&self, x: &Array2<f64>, y: &Array2<f64>, rng: &mut SeededRng) -> Result<Gradients> {
        self.check_targets(x, y)?;
        let pass = self.forward(x, Mode::Training(rng))?;
        Ok(self.backward(&pass, y))
    }

    /// Half mean squared error of one pass in the given mode.
    pub fn loss(&self, x: &Array2<f64>, y: &Array2<f64>, mode: Mode<'_>) -> Result<f64> {
        self.check_targets(x, y)?;
        let pass = self.forward(x, mode)?;
        Ok(half_squared_error(pass.output(), y))
    }

    /// One training step: forward in training mode, exact backward pass, global
    /// norm clipping, scheduled Adam update, then the running statistics are
    /// updated. Returns the loss before the update.
    ///
    /// # Errors
    ///
    /// [`EngineError::NonFinite`] if the loss or a gradient is NaN or infinite; the
    /// network is left unchanged.
    pub fn train_step(&mut self, x: &Array2<f64>, y: &Array2<f64>, rng: &mut SeededRng) -> Result<f64> {
        self.check_targets(x, y)?;
        let pass = self.forward(x, Mode::Training(rng))?;
        let loss = half_squared_error(pass.output(), y);
        let mut grads = self.backward(&pass, y);
        grads.ensure_finite("advanced network", loss)?;
        grads.clip(self.gradient_clip_norm);

        self.optimizer.set_learning_rate(self.lr_scheduler.get_lr());
        self.lr_scheduler.step();

        let (mut weights, mut biases): (Vec<_>, Vec<_>) = self
            .layers
            .iter_mut()
            .map(DenseLayer::params_mut)
            .chain(self.batch_norms.iter_mut().map(BatchNormLayer::params_mut))
            .unzip();
        self.optimizer
            .update(&mut weights, &mut biases, &grads.weights, &grads.biases)?;

        for (bn, cache) in self.batch_norms.iter_mut().zip(&pass.hidden) {
            if let Some(bn_cache) = &cache.batch_norm {
                bn.commit_statistics(bn_cache);
            }
        }
        trace!(loss, step = self.optimizer.step_count(), "advanced network step");
        Ok(loss)
    }

    /// Training step on a single sample.
    pub fn train_one(&mut self, input: &[f64], target: &[f64], rng: &mut SeededRng) -> Result<f64> {
        self.train_step(&row_vector(input), &row_vector(target), rng)
    }

    /// Deterministic inference-mode output for a batch.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let pass = self.forward(x, Mode::Inference)?;
        Ok(pass.output().clone())
    }

    pub fn predict_one(&self, input: &[f64]) -> Result<Vec<f64>> {
        let output = self.predict(&row_vector(input))?;
        Ok(output.iter().copied().collect())
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum::<usize>()
            + self.batch_norms.iter().map(Layer::parameter_count).sum::<usize>()
    }

    pub fn to_document(&self) -> AdvancedDocument {
        AdvancedDocument {
            layers: self.layer_sizes.clone(),
            dropout_rate: self.dropout.drop_rate(),
            use_batch_norm: !self.batch_norms.is_empty(),
            use_residual: self.use_residual,
            gradient_clip_norm: self.gradient_clip_norm,
            learning_rate: self.learning_rate,
            weights: self.layers.iter().map(|l| l.weights().clone()).collect(),
            biases: self.layers.iter().map(|l| l.biases().clone()).collect(),
            optimizer: self.optimizer.clone(),
            lr_scheduler: self.lr_scheduler.clone(),
            batch_norms: self.batch_norms.clone(),
        }
    }

    /// Rebuild a network from its document, checking every shape against the topology.
    pub fn from_document(doc: AdvancedDocument) -> Result<Self> {
        validate_topology(&doc.layers)?;
        validate_learning_rate(doc.learning_rate)?;
        validate_clip_norm(doc.gradient_clip_norm)?;
        doc.optimizer.validate()?;
        doc.lr_scheduler.validate()?;
        let dropout = DropoutLayer::new(doc.dropout_rate)?;

        let hidden = &doc.layers[1..doc.layers.len() - 1];
        let expected_norms = if doc.use_batch_norm { hidden.len() } else { 0 };
        if doc.batch_norms.len() != expected_norms {
            return Err(EngineError::ShapeMismatch(format!(
                "expected {} batch norm layers, found {}",
                expected_norms,
                doc.batch_norms.len()
            )));
        }
        for (bn, &size) in doc.batch_norms.iter().zip(hidden) {
            bn.validate()?;
            if bn.input_size() != size {
                return Err(shape_mismatch("batch norm layer", (1, size), (1, bn.input_size())));
            }
        }
        let layers = dense_layers_from_parts(&doc.layers, doc.weights, doc.biases)?;

        Ok(Self {
            layer_sizes: doc.layers,
            layers,
            batch_norms: doc.batch_norms,
            dropout,
            use_residual: doc.use_residual,
            learning_rate: doc.learning_rate,
            gradient_clip_norm: doc.gradient_clip_norm,
            optimizer: doc.optimizer,
            lr_scheduler: doc.lr_scheduler,
        })
    }
}

impl Network for AdvancedNetwork {
    fn kind(&self) -> NetworkKind {
        NetworkKind::Advanced
    }

    fn input_size(&self) -> usize {
        AdvancedNetwork::input_size(self)
    }

    fn output_size(&self) -> usize {
        AdvancedNetwork::output_size(self)
    }

    fn parameter_count(&self) -> usize {
        AdvancedNetwork::parameter_count(self)
    }

    fn predict_vector(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        self.predict_one(input)
    }

    fn to_network_document(&self) -> NetworkDocument {
        NetworkDocument::Advanced(self.to_document())
    }
}
