//! Stacked LSTM network with a sigmoid output head, trained by backpropagation
//! through time.
//!
//! Layer `k` feeds its hidden output to layer `k + 1`; the head maps the top
//! layer's hidden state to the output vector at every timestep. The network keeps
//! its own `(h, c)` per layer between calls and a bounded buffer of recent input
//! vectors used for online prediction and short-window training.

use std::collections::VecDeque;

use crate::error::{shape_mismatch, EngineError, Result};
use crate::layers::{DenseLayer, Layer, LstmCache, LstmCell, LstmGateGradients};
use crate::network::{Gradients, Network, NetworkDocument, NetworkKind};
use crate::optimizers::{validate_learning_rate, Adam, Optimizer, OptimizerKind};
use crate::utils::activations::sigmoid_array;
use crate::utils::matrix::{ensure_shape, nested, nested_list, row_vector};
use crate::utils::SeededRng;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Global gradient norm applied before every update.
const GRADIENT_CLIP_NORM: f64 = 5.0;

/// Scale of the output head's Gaussian initialization.
const HEAD_INIT_SCALE: f64 = 0.01;

/// Probabilities are clamped this far from 0 and 1 when computing the loss.
const LOSS_EPSILON: f64 = 1e-12;

/// Construction parameters for [`LstmNetwork`].
#[derive(Debug, Clone, PartialEq)]
pub struct LstmConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub num_layers: usize,
    pub learning_rate: f64,
    /// Capacity of the sequence buffer.
    pub sequence_length: usize,
}

impl LstmConfig {
    /// Two layers, learning rate `0.001`, sequence buffer of 50.
    pub fn new(input_size: usize, hidden_size: usize, output_size: usize) -> Self {
        Self {
            input_size,
            hidden_size,
            output_size,
            num_layers: 2,
            learning_rate: 0.001,
            sequence_length: 50,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.input_size == 0 || self.hidden_size == 0 || self.output_size == 0 {
            return Err(EngineError::InvalidHyperparameter(format!(
                "lstm sizes must be positive, got input {} hidden {} output {}",
                self.input_size, self.hidden_size, self.output_size
            )));
        }
        if self.num_layers == 0 {
            return Err(EngineError::InvalidHyperparameter(
                "lstm network needs at least one layer".to_string(),
            ));
        }
        if self.sequence_length == 0 {
            return Err(EngineError::InvalidHyperparameter(
                "sequence buffer capacity must be positive".to_string(),
            ));
        }
        validate_learning_rate(self.learning_rate)
    }
}

/// Serialized form of an [`LstmNetwork`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmDocument {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub num_layers: usize,
    pub learning_rate: f64,
    pub sequence_length: usize,
    #[serde(with = "nested_list")]
    pub h_states: Vec<Array2<f64>>,
    #[serde(with = "nested_list")]
    pub c_states: Vec<Array2<f64>>,
    pub sequence_buffer: Vec<Vec<f64>>,
    #[serde(rename = "Wy", with = "nested")]
    pub wy: Array2<f64>,
    #[serde(rename = "by", with = "nested")]
    pub by: Array2<f64>,
    pub lstm_layers: Vec<LstmCell>,
    pub optimizer: OptimizerKind,
}

/// Values recorded by [`LstmNetwork::forward_sequence`] for the backward pass.
#[derive(Debug, Clone)]
pub struct SequenceTrace {
    outputs: Vec<Array2<f64>>,
    top_hidden: Vec<Array2<f64>>,
    caches: Vec<Vec<LstmCache>>,
}

impl SequenceTrace {
    /// Head output at every timestep, each `1 × output_size`.
    pub fn outputs(&self) -> &[Array2<f64>] {
        &self.outputs
    }

    pub fn last_output(&self) -> Option<&Array2<f64>> {
        self.outputs.last()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Stacked LSTM network.
///
/// Training resets the state, runs the sequence forward, walks it in reverse
/// accumulating gate gradients, averages them over the sequence length, clips
/// them to a global norm of `5.0` and applies an Adam update.
///
/// # Example
///
/// ```
/// use neuropet::network::{LstmConfig, LstmNetwork};
/// use neuropet::utils::SeededRng;
///
/// let mut rng = SeededRng::new(3);
/// let mut net = LstmNetwork::new(&LstmConfig::new(4, 8, 2), &mut rng).unwrap();
/// let out = net.predict(&[0.1, 0.2, 0.3, 0.4]).unwrap();
/// assert_eq!(out.len(), 2);
/// assert_eq!(net.sequence_buffer().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct LstmNetwork {
    input_size: usize,
    hidden_size: usize,
    output_size: usize,
    learning_rate: f64,
    sequence_length: usize,
    cells: Vec<LstmCell>,
    head: DenseLayer,
    h_states: Vec<Array2<f64>>,
    c_states: Vec<Array2<f64>>,
    sequence_buffer: VecDeque<Vec<f64>>,
    optimizer: OptimizerKind,
}

impl LstmNetwork {
    pub fn new(config: &LstmConfig, rng: &mut SeededRng) -> Result<Self> {
        config.validate()?;
        let cells = (0..config.num_layers)
            .map(|i| {
                let input = if i == 0 { config.input_size } else { config.hidden_size };
                LstmCell::new(input, config.hidden_size, rng)
            })
            .collect();
        let head = DenseLayer::with_scale(config.hidden_size, config.output_size, HEAD_INIT_SCALE, rng);
        let zeros = vec![Array2::zeros((1, config.hidden_size)); config.num_layers];

        Ok(Self {
            input_size: config.input_size,
            hidden_size: config.hidden_size,
            output_size: config.output_size,
            learning_rate: config.learning_rate,
            sequence_length: config.sequence_length,
            cells,
            head,
            h_states: zeros.clone(),
            c_states: zeros,
            sequence_buffer: VecDeque::with_capacity(config.sequence_length),
            optimizer: OptimizerKind::Adam(Adam::with_learning_rate(config.learning_rate)?),
        })
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn num_layers(&self) -> usize {
        self.cells.len()
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn cells(&self) -> &[LstmCell] {
        &self.cells
    }

    pub fn cell_mut(&mut self, index: usize) -> Option<&mut LstmCell> {
        self.cells.get_mut(index)
    }

    /// Output head mapping the top hidden state to the outputs.
    pub fn head(&self) -> &DenseLayer {
        &self.head
    }

    pub fn head_mut(&mut self) -> &mut DenseLayer {
        &mut self.head
    }

    pub fn hidden_states(&self) -> &[Array2<f64>] {
        &self.h_states
    }

    pub fn cell_states(&self) -> &[Array2<f64>] {
        &self.c_states
    }

    pub fn sequence_buffer(&self) -> &VecDeque<Vec<f64>> {
        &self.sequence_buffer
    }

    pub fn optimizer(&self) -> &OptimizerKind {
        &self.optimizer
    }

    pub fn parameter_count(&self) -> usize {
        self.cells.iter().map(LstmCell::parameter_count).sum::<usize>() + self.head.parameter_count()
    }

    /// Zero every layer's hidden and cell state.
    pub fn reset_states(&mut self) {
        for state in self.h_states.iter_mut().chain(self.c_states.iter_mut()) {
            state.fill(0.0);
        }
    }

    /// Append an input vector to the sequence buffer, evicting the oldest entry when full.
    pub fn add_to_sequence(&mut self, input: &[f64]) -> Result<()> {
        self.check_input(input)?;
        if self.sequence_buffer.len() == self.sequence_length {
            self.sequence_buffer.pop_front();
        }
        self.sequence_buffer.push_back(input.to_vec());
        Ok(())
    }

    fn check_input(&self, input: &[f64]) -> Result<()> {
        if input.len() != self.input_size {
            return Err(shape_mismatch("lstm input", (1, self.input_size), (1, input.len())));
        }
        if input.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::NonFinite("lstm input".to_string()));
        }
        Ok(())
    }

    fn check_targets(&self, steps: usize, targets: &[Vec<f64>]) -> Result<()> {
        if steps == 0 {
            return Err(EngineError::ShapeMismatch("empty training sequence".to_string()));
        }
        if targets.len() != steps {
            return Err(EngineError::ShapeMismatch(format!(
                "sequence has {} steps but {} targets",
                steps,
                targets.len()
            )));
        }
        for target in targets {
            if target.len() != self.output_size {
                return Err(shape_mismatch("lstm target", (1, self.output_size), (1, target.len())));
            }
        }
        Ok(())
    }

    /// Run the network over `sequence`, carrying state from step to step.
    ///
    /// With `reset` the state is zeroed first; otherwise the sequence continues
    /// from the current state. The final state is kept.
    ///
    /// # Errors
    ///
    /// [`EngineError::ShapeMismatch`] if any input has the wrong length. Inputs are
    /// checked before the state is touched.
    pub fn forward_sequence(&mut self, sequence: &[Vec<f64>], reset: bool) -> Result<SequenceTrace> {
        for input in sequence {
            self.check_input(input)?;
        }
        if reset {
            self.reset_states();
        }

        let mut trace = SequenceTrace {
            outputs: Vec::with_capacity(sequence.len()),
            top_hidden: Vec::with_capacity(sequence.len()),
            caches: Vec::with_capacity(sequence.len()),
        };
        for input in sequence {
            let mut layer_input = row_vector(input);
            let mut step_caches = Vec::with_capacity(self.cells.len());
            for (l, cell) in self.cells.iter().enumerate() {
                let (h, c, cache) = cell.forward(&layer_input, &self.h_states[l], &self.c_states[l])?;
                self.c_states[l] = c;
                self.h_states[l] = h.clone();
                step_caches.push(cache);
                layer_input = h;
            }
            let output = sigmoid_array(&self.head.forward(&layer_input)?);
            trace.outputs.push(output);
            trace.top_hidden.push(layer_input);
            trace.caches.push(step_caches);
        }
        Ok(trace)
    }

    /// Backpropagation through time for a recorded forward pass.
    ///
    /// The output error at each step is `prediction − target`. Gradients are
    /// averaged over the sequence length and returned unclipped, ordered
    /// `[Wf, Wi, Wc, Wo]` per layer followed by the head's `Wy` (biases likewise).
    pub fn backward_sequence(&self, trace: &SequenceTrace, targets: &[Vec<f64>]) -> Result<Gradients> {
        self.check_targets(trace.len(), targets)?;
        let layers = self.cells.len();
        let steps = trace.len() as f64;

        let mut cell_grads: Vec<LstmGateGradients> = self.cells.iter().map(LstmGateGradients::zeros_like).collect();
        let mut d_wy = Array2::zeros(self.head.weights().raw_dim());
        let mut d_by = Array2::zeros(self.head.biases().raw_dim());
        let mut dh_next = vec![Array2::<f64>::zeros((1, self.hidden_size)); layers];
        let mut dc_next = dh_next.clone();

        for t in (0..trace.len()).rev() {
            let dy = &trace.outputs[t] - &row_vector(&targets[t]);
            let head = self.head.backward(&trace.top_hidden[t], &dy);
            d_wy += &head.weights;
            d_by += &head.biases;

            let mut dh = head.input + &dh_next[layers - 1];
            for l in (0..layers).rev() {
                let step = self.cells[l].backward(&dh, &dc_next[l], &trace.caches[t][l]);
                cell_grads[l].add_assign(&step.params);
                dh_next[l] = step.dh_prev;
                dc_next[l] = step.dc_prev;
                if l > 0 {
                    dh = step.dx + &dh_next[l - 1];
                }
            }
        }

        let mut weights = Vec::with_capacity(4 * layers + 1);
        let mut biases = Vec::with_capacity(4 * layers + 1);
        for grads in cell_grads {
            weights.extend(grads.weights.into_iter().map(|g| g / steps));
            biases.extend(grads.biases.into_iter().map(|g| g / steps));
        }
        weights.push(d_wy / steps);
        biases.push(d_by / steps);
        Ok(Gradients { weights, biases })
    }

    /// Train on one sequence: reset, forward, BPTT, clip, Adam update.
    ///
    /// Returns the mean binary cross-entropy over the sequence before the update.
    pub fn train_sequence(&mut self, sequence: &[Vec<f64>], targets: &[Vec<f64>]) -> Result<f64> {
        self.check_targets(sequence.len(), targets)?;
        let trace = self.forward_sequence(sequence, true)?;
        let loss = cross_entropy(&trace, targets);
        let mut grads = self.backward_sequence(&trace, targets)?;
        grads.ensure_finite("lstm network", loss)?;
        grads.clip(GRADIENT_CLIP_NORM);

        let mut weights = Vec::with_capacity(grads.weights.len());
        let mut biases = Vec::with_capacity(grads.biases.len());
        for cell in self.cells.iter_mut() {
            let (w, b) = cell.params_mut();
            weights.extend(w);
            biases.extend(b);
        }
        let (wy, by) = self.head.params_mut();
        weights.push(wy);
        biases.push(by);
        self.optimizer
            .update(&mut weights, &mut biases, &grads.weights, &grads.biases)?;

        trace!(loss, steps = sequence.len(), "lstm sequence step");
        Ok(loss)
    }

    /// Mean binary cross-entropy of `sequence` from a zeroed state. Resets the state.
    pub fn sequence_loss(&mut self, sequence: &[Vec<f64>], targets: &[Vec<f64>]) -> Result<f64> {
        self.check_targets(sequence.len(), targets)?;
        let trace = self.forward_sequence(sequence, true)?;
        Ok(cross_entropy(&trace, targets))
    }

    /// Train on the last `window` buffered inputs, every step aiming at `target`.
    ///
    /// Returns `Ok(None)` without training while the buffer holds fewer than
    /// `window` inputs.
    pub fn train_recent(&mut self, target: &[f64], window: usize) -> Result<Option<f64>> {
        if window == 0 || self.sequence_buffer.len() < window {
            return Ok(None);
        }
        let start = self.sequence_buffer.len() - window;
        let sequence: Vec<Vec<f64>> = self.sequence_buffer.range(start..).cloned().collect();
        let targets = vec![target.to_vec(); window];
        self.train_sequence(&sequence, &targets).map(Some)
    }

    /// Buffer `input`, replay the whole buffer from a zeroed state and return the
    /// last output.
    pub fn predict(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        self.add_to_sequence(input)?;
        let sequence: Vec<Vec<f64>> = self.sequence_buffer.iter().cloned().collect();
        let trace = self.forward_sequence(&sequence, true)?;
        Ok(trace
            .last_output()
            .map(|out| out.iter().copied().collect())
            .unwrap_or_default())
    }

    /// Advance the carried state by one input without touching the buffer.
    pub fn predict_step(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        let trace = self.forward_sequence(&[input.to_vec()], false)?;
        Ok(trace
            .last_output()
            .map(|out| out.iter().copied().collect())
            .unwrap_or_default())
    }

    pub fn to_document(&self) -> LstmDocument {
        LstmDocument {
            input_size: self.input_size,
            hidden_size: self.hidden_size,
            output_size: self.output_size,
            num_layers: self.cells.len(),
            learning_rate: self.learning_rate,
            sequence_length: self.sequence_length,
            h_states: self.h_states.clone(),
            c_states: self.c_states.clone(),
            sequence_buffer: self.sequence_buffer.iter().cloned().collect(),
            wy: self.head.weights().clone(),
            by: self.head.biases().clone(),
            lstm_layers: self.cells.clone(),
            optimizer: self.optimizer.clone(),
        }
    }

    /// Rebuild a network from its document, checking every shape against the topology.
    pub fn from_document(doc: LstmDocument) -> Result<Self> {
        let config = LstmConfig {
            input_size: doc.input_size,
            hidden_size: doc.hidden_size,
            output_size: doc.output_size,
            num_layers: doc.num_layers,
            learning_rate: doc.learning_rate,
            sequence_length: doc.sequence_length,
        };
        config.validate()?;
        doc.optimizer.validate()?;

        if doc.lstm_layers.len() != doc.num_layers {
            return Err(EngineError::ShapeMismatch(format!(
                "expected {} lstm layers, found {}",
                doc.num_layers,
                doc.lstm_layers.len()
            )));
        }
        for (i, cell) in doc.lstm_layers.iter().enumerate() {
            let input = if i == 0 { doc.input_size } else { doc.hidden_size };
            cell.validate(input, doc.hidden_size)?;
        }
        ensure_shape("lstm output weights", &doc.wy, (doc.hidden_size, doc.output_size))?;
        let head = DenseLayer::from_parts(doc.wy, doc.by)?;

        for states in [&doc.h_states, &doc.c_states] {
            if states.len() != doc.num_layers {
                return Err(EngineError::ShapeMismatch(format!(
                    "expected {} recurrent states, found {}",
                    doc.num_layers,
                    states.len()
                )));
            }
            for state in states {
                ensure_shape("lstm state", state, (1, doc.hidden_size))?;
            }
        }
        if doc.sequence_buffer.len() > doc.sequence_length {
            return Err(EngineError::SerializationError(format!(
                "sequence buffer holds {} entries but capacity is {}",
                doc.sequence_buffer.len(),
                doc.sequence_length
            )));
        }
        if let Some(bad) = doc.sequence_buffer.iter().find(|x| x.len() != doc.input_size) {
            return Err(shape_mismatch("buffered input", (1, doc.input_size), (1, bad.len())));
        }

        Ok(Self {
            input_size: doc.input_size,
            hidden_size: doc.hidden_size,
            output_size: doc.output_size,
            learning_rate: doc.learning_rate,
            sequence_length: doc.sequence_length,
            cells: doc.lstm_layers,
            head,
            h_states: doc.h_states,
            c_states: doc.c_states,
            sequence_buffer: doc.sequence_buffer.into(),
            optimizer: doc.optimizer,
        })
    }
}

/// Mean binary cross-entropy over every output of every step.
fn cross_entropy(trace: &SequenceTrace, targets: &[Vec<f64>]) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for (output, target) in trace.outputs.iter().zip(targets) {
        for (&p, &y) in output.iter().zip(target) {
            let p = p.clamp(LOSS_EPSILON, 1.0 - LOSS_EPSILON);
            total -= y * p.ln() + (1.0 - y) * (1.0 - p).ln();
            count += 1;
        }
    }
    total / count.max(1) as f64
}

impl Network for LstmNetwork {
    fn kind(&self) -> NetworkKind {
        NetworkKind::Recurrent
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn parameter_count(&self) -> usize {
        LstmNetwork::parameter_count(self)
    }

    fn predict_vector(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        self.predict(input)
    }

    fn to_network_document(&self) -> NetworkDocument {
        NetworkDocument::Recurrent(self.to_document())
    }
}
