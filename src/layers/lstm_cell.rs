//! LSTM cell: one layer of gated recurrent memory.
//!
//! Each timestep concatenates the input with the previous hidden state and runs
//! four gates over it:
//!
//! ```text
//! f  = σ([x, h_prev] · Wf + bf)        forget gate
//! i  = σ([x, h_prev] · Wi + bi)        input gate
//! c~ = tanh([x, h_prev] · Wc + bc)     candidate
//! o  = σ([x, h_prev] · Wo + bo)        output gate
//! c  = f ⊙ c_prev + i ⊙ c~
//! h  = o ⊙ tanh(c)
//! ```

use crate::error::{shape_mismatch, Result};
use crate::utils::activations::{sigmoid_array, sigmoid_derivative_array, tanh_array, tanh_derivative_array};
use crate::utils::matrix::nested;
use crate::utils::SeededRng;
use ndarray::{concatenate, s, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Scale of the Gaussian gate-weight initialization.
const GATE_INIT_SCALE: f64 = 0.01;

/// Gate selector, used to reach a single gate's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Forget,
    Input,
    Candidate,
    Output,
}

/// Weights and biases of the four gates.
///
/// Every weight matrix is `(input_size + hidden_size) × hidden_size`; every bias
/// is `1 × hidden_size`. Serialized field names are `Wf, bf, Wi, bi, Wc, bc, Wo, bo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmCell {
    #[serde(rename = "Wf", with = "nested")]
    wf: Array2<f64>,
    #[serde(rename = "bf", with = "nested")]
    bf: Array2<f64>,
    #[serde(rename = "Wi", with = "nested")]
    wi: Array2<f64>,
    #[serde(rename = "bi", with = "nested")]
    bi: Array2<f64>,
    #[serde(rename = "Wc", with = "nested")]
    wc: Array2<f64>,
    #[serde(rename = "bc", with = "nested")]
    bc: Array2<f64>,
    #[serde(rename = "Wo", with = "nested")]
    wo: Array2<f64>,
    #[serde(rename = "bo", with = "nested")]
    bo: Array2<f64>,
}

/// Per-timestep values kept for the backward pass.
#[derive(Debug, Clone)]
pub struct LstmCache {
    concat: Array2<f64>,
    c_prev: Array2<f64>,
    forget: Array2<f64>,
    input: Array2<f64>,
    candidate: Array2<f64>,
    output: Array2<f64>,
    tanh_c: Array2<f64>,
}

/// Parameter gradients of one cell, in gate order `f, i, c, o`.
#[derive(Debug, Clone, PartialEq)]
pub struct LstmGateGradients {
    pub weights: [Array2<f64>; 4],
    pub biases: [Array2<f64>; 4],
}

/// Result of [`LstmCell::backward`] for one timestep.
#[derive(Debug, Clone)]
pub struct LstmStepGradients {
    pub dx: Array2<f64>,
    pub dh_prev: Array2<f64>,
    pub dc_prev: Array2<f64>,
    pub params: LstmGateGradients,
}

impl LstmGateGradients {
    /// Zero gradients shaped like `cell`'s parameters.
    pub fn zeros_like(cell: &LstmCell) -> Self {
        let w = cell.wf.raw_dim();
        let b = cell.bf.raw_dim();
        Self {
            weights: [(); 4].map(|_| Array2::zeros(w)),
            biases: [(); 4].map(|_| Array2::zeros(b)),
        }
    }

    /// Accumulate `other` into `self`.
    pub fn add_assign(&mut self, other: &LstmGateGradients) {
        for (acc, g) in self.weights.iter_mut().zip(&other.weights) {
            *acc += g;
        }
        for (acc, g) in self.biases.iter_mut().zip(&other.biases) {
            *acc += g;
        }
    }
}

impl LstmCell {
    /// New cell with gate weights drawn from `N(0, 1) · 0.01` and zero biases.
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut SeededRng) -> Self {
        let rows = input_size + hidden_size;
        let mut gate = || rng.standard_normal(rows, hidden_size) * GATE_INIT_SCALE;
        let (wf, wi, wc, wo) = (gate(), gate(), gate(), gate());
        Self {
            wf,
            bf: Array2::zeros((1, hidden_size)),
            wi,
            bi: Array2::zeros((1, hidden_size)),
            wc,
            bc: Array2::zeros((1, hidden_size)),
            wo,
            bo: Array2::zeros((1, hidden_size)),
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.wf.ncols()
    }

    pub fn input_size(&self) -> usize {
        self.wf.nrows().saturating_sub(self.hidden_size())
    }

    pub fn parameter_count(&self) -> usize {
        4 * (self.wf.len() + self.bf.len())
    }

    /// Check that all gates agree with `input_size × hidden_size`.
    pub fn validate(&self, input_size: usize, hidden_size: usize) -> Result<()> {
        let w = (input_size + hidden_size, hidden_size);
        let b = (1, hidden_size);
        for (name, weight, bias) in [
            ("Wf", &self.wf, &self.bf),
            ("Wi", &self.wi, &self.bi),
            ("Wc", &self.wc, &self.bc),
            ("Wo", &self.wo, &self.bo),
        ] {
            if weight.dim() != w {
                return Err(shape_mismatch(&format!("lstm gate {}", name), w, weight.dim()));
            }
            if bias.dim() != b {
                return Err(shape_mismatch(&format!("lstm gate bias of {}", name), b, bias.dim()));
            }
        }
        Ok(())
    }

    /// Weight and bias of a single gate.
    pub fn gate(&self, gate: Gate) -> (&Array2<f64>, &Array2<f64>) {
        match gate {
            Gate::Forget => (&self.wf, &self.bf),
            Gate::Input => (&self.wi, &self.bi),
            Gate::Candidate => (&self.wc, &self.bc),
            Gate::Output => (&self.wo, &self.bo),
        }
    }

    pub fn gate_mut(&mut self, gate: Gate) -> (&mut Array2<f64>, &mut Array2<f64>) {
        match gate {
            Gate::Forget => (&mut self.wf, &mut self.bf),
            Gate::Input => (&mut self.wi, &mut self.bi),
            Gate::Candidate => (&mut self.wc, &mut self.bc),
            Gate::Output => (&mut self.wo, &mut self.bo),
        }
    }

    /// Mutable borrows of all parameters, weights then biases, in gate order.
    pub(crate) fn params_mut(&mut self) -> ([&mut Array2<f64>; 4], [&mut Array2<f64>; 4]) {
        (
            [&mut self.wf, &mut self.wi, &mut self.wc, &mut self.wo],
            [&mut self.bf, &mut self.bi, &mut self.bc, &mut self.bo],
        )
    }

    /// One timestep forward. Returns `(h_next, c_next, cache)`.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::ShapeMismatch`] if `x`, `h_prev` or `c_prev` do not
    /// match the cell's dimensions or each other's row count.
    pub fn forward(
        &self,
        x: &Array2<f64>,
        h_prev: &Array2<f64>,
        c_prev: &Array2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>, LstmCache)> {
        let batch = x.nrows();
        let hidden = self.hidden_size();
        if x.ncols() != self.input_size() {
            return Err(shape_mismatch("lstm input", (batch, self.input_size()), x.dim()));
        }
        if h_prev.dim() != (batch, hidden) {
            return Err(shape_mismatch("lstm hidden state", (batch, hidden), h_prev.dim()));
        }
        if c_prev.dim() != (batch, hidden) {
            return Err(shape_mismatch("lstm cell state", (batch, hidden), c_prev.dim()));
        }

        let concat = concatenate(Axis(1), &[x.view(), h_prev.view()])
            .map_err(|err| crate::EngineError::ShapeMismatch(err.to_string()))?;

        let forget = sigmoid_array(&(concat.dot(&self.wf) + &self.bf));
        let input = sigmoid_array(&(concat.dot(&self.wi) + &self.bi));
        let candidate = tanh_array(&(concat.dot(&self.wc) + &self.bc));
        let output = sigmoid_array(&(concat.dot(&self.wo) + &self.bo));

        let c_next = &forget * c_prev + &input * &candidate;
        let tanh_c = tanh_array(&c_next);
        let h_next = &output * &tanh_c;

        let cache = LstmCache {
            concat,
            c_prev: c_prev.clone(),
            forget,
            input,
            candidate,
            output,
            tanh_c,
        };
        Ok((h_next, c_next, cache))
    }

    /// One timestep backward.
    ///
    /// `dh` is the total gradient reaching this step's hidden output (from the
    /// layer above or the output head, plus the recurrent path); `dc_next` is the
    /// gradient reaching this step's cell state from the following timestep.
    pub fn backward(&self, dh: &Array2<f64>, dc_next: &Array2<f64>, cache: &LstmCache) -> LstmStepGradients {
        let d_output = dh * &cache.tanh_c * sigmoid_derivative_array(&cache.output);
        let dc = dh * &cache.output * tanh_derivative_array(&cache.tanh_c) + dc_next;
        let d_forget = &dc * &cache.c_prev * sigmoid_derivative_array(&cache.forget);
        let d_input = &dc * &cache.candidate * sigmoid_derivative_array(&cache.input);
        let d_candidate = &dc * &cache.input * tanh_derivative_array(&cache.candidate);
        let dc_prev = &dc * &cache.forget;

        let concat_t = cache.concat.t();
        let row_sum = |d: &Array2<f64>| d.sum_axis(Axis(0)).insert_axis(Axis(0));
        let params = LstmGateGradients {
            weights: [
                concat_t.dot(&d_forget),
                concat_t.dot(&d_input),
                concat_t.dot(&d_candidate),
                concat_t.dot(&d_output),
            ],
            biases: [
                row_sum(&d_forget),
                row_sum(&d_input),
                row_sum(&d_candidate),
                row_sum(&d_output),
            ],
        };

        let d_concat = d_forget.dot(&self.wf.t())
            + d_input.dot(&self.wi.t())
            + d_candidate.dot(&self.wc.t())
            + d_output.dot(&self.wo.t());
        let split = self.input_size();
        let dx = d_concat.slice(s![.., ..split]).to_owned();
        let dh_prev = d_concat.slice(s![.., split..]).to_owned();

        LstmStepGradients {
            dx,
            dh_prev,
            dc_prev,
            params,
        }
    }
}
