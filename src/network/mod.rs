//! Trainable networks and their save documents.
//!
//! Three kinds of network share one interface:
//!
//! - [`FeedForwardNetwork`]: dense layers with ReLU hidden activations
//! - [`AdvancedNetwork`]: adds batch normalization, dropout and residual connections
//! - [`LstmNetwork`]: stacked LSTM cells with a sigmoid output head, trained by BPTT
//!
//! Every network owns its parameters and its optimizer. Serialized documents carry
//! a `"type"` discriminator (`dense`, `advanced` or `recurrent`) so a document can be
//! loaded without knowing its kind in advance.
//!
//! # Example
//!
//! ```
//! use neuropet::network::{AnyNetwork, FeedForwardConfig, FeedForwardNetwork, Network, NetworkKind};
//! use neuropet::utils::SeededRng;
//!
//! let mut rng = SeededRng::new(1);
//! let network = FeedForwardNetwork::new(&FeedForwardConfig::new(2, vec![3], 1), &mut rng).unwrap();
//! let document = network.to_network_document();
//! let json = serde_json::to_string(&document).unwrap();
//! assert!(json.contains("\"type\":\"dense\""));
//!
//! let restored = AnyNetwork::from_document(serde_json::from_str(&json).unwrap()).unwrap();
//! assert_eq!(restored.kind(), NetworkKind::Dense);
//! ```

pub mod advanced;
pub mod feedforward;
pub mod recurrent;

pub use advanced::{AdvancedConfig, AdvancedDocument, AdvancedNetwork, ForwardPass, Mode};
pub use feedforward::{FeedForwardConfig, FeedForwardDocument, FeedForwardNetwork, OutputActivation};
pub use recurrent::{LstmConfig, LstmDocument, LstmNetwork, SequenceTrace};

use crate::error::{EngineError, Result};
use crate::optimizers::clip_gradients;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Discriminator for the three network families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Dense,
    Advanced,
    Recurrent,
}

/// Interface shared by every network kind.
pub trait Network {
    fn kind(&self) -> NetworkKind;

    fn input_size(&self) -> usize;

    fn output_size(&self) -> usize;

    /// Number of trainable scalars.
    fn parameter_count(&self) -> usize;

    /// Inference on one input vector.
    ///
    /// Takes `&mut self` because recurrent networks append the input to their
    /// sequence buffer.
    fn predict_vector(&mut self, input: &[f64]) -> Result<Vec<f64>>;

    fn to_network_document(&self) -> NetworkDocument;
}

/// Tagged save document of any network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NetworkDocument {
    Dense(FeedForwardDocument),
    Advanced(AdvancedDocument),
    Recurrent(LstmDocument),
}

impl NetworkDocument {
    pub fn kind(&self) -> NetworkKind {
        match self {
            NetworkDocument::Dense(_) => NetworkKind::Dense,
            NetworkDocument::Advanced(_) => NetworkKind::Advanced,
            NetworkDocument::Recurrent(_) => NetworkKind::Recurrent,
        }
    }
}

/// A network of any kind, dispatched through [`Network`].
#[derive(Debug, Clone)]
pub enum AnyNetwork {
    Dense(FeedForwardNetwork),
    Advanced(AdvancedNetwork),
    Recurrent(LstmNetwork),
}

impl AnyNetwork {
    pub fn from_document(doc: NetworkDocument) -> Result<Self> {
        Ok(match doc {
            NetworkDocument::Dense(doc) => AnyNetwork::Dense(FeedForwardNetwork::from_document(doc)?),
            NetworkDocument::Advanced(doc) => AnyNetwork::Advanced(AdvancedNetwork::from_document(doc)?),
            NetworkDocument::Recurrent(doc) => AnyNetwork::Recurrent(LstmNetwork::from_document(doc)?),
        })
    }

    fn as_network(&self) -> &dyn Network {
        match self {
            AnyNetwork::Dense(net) => net,
            AnyNetwork::Advanced(net) => net,
            AnyNetwork::Recurrent(net) => net,
        }
    }

    fn as_network_mut(&mut self) -> &mut dyn Network {
        match self {
            AnyNetwork::Dense(net) => net,
            AnyNetwork::Advanced(net) => net,
            AnyNetwork::Recurrent(net) => net,
        }
    }
}

impl Network for AnyNetwork {
    fn kind(&self) -> NetworkKind {
        self.as_network().kind()
    }

    fn input_size(&self) -> usize {
        self.as_network().input_size()
    }

    fn output_size(&self) -> usize {
        self.as_network().output_size()
    }

    fn parameter_count(&self) -> usize {
        self.as_network().parameter_count()
    }

    fn predict_vector(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        self.as_network_mut().predict_vector(input)
    }

    fn to_network_document(&self) -> NetworkDocument {
        self.as_network().to_network_document()
    }
}

impl From<FeedForwardNetwork> for AnyNetwork {
    fn from(net: FeedForwardNetwork) -> Self {
        AnyNetwork::Dense(net)
    }
}

impl From<AdvancedNetwork> for AnyNetwork {
    fn from(net: AdvancedNetwork) -> Self {
        AnyNetwork::Advanced(net)
    }
}

impl From<LstmNetwork> for AnyNetwork {
    fn from(net: LstmNetwork) -> Self {
        AnyNetwork::Recurrent(net)
    }
}

/// Write a network document as pretty JSON.
pub fn save_network<P: AsRef<Path>>(path: P, network: &AnyNetwork) -> Result<()> {
    let json = serde_json::to_string_pretty(&network.to_network_document())?;
    fs::write(path.as_ref(), json)?;
    info!(path = %path.as_ref().display(), kind = ?network.kind(), "saved network");
    Ok(())
}

/// Read a network document written by [`save_network`].
pub fn load_network<P: AsRef<Path>>(path: P) -> Result<AnyNetwork> {
    let text = fs::read_to_string(path.as_ref())?;
    let doc: NetworkDocument = serde_json::from_str(&text)?;
    let network = AnyNetwork::from_document(doc)?;
    info!(path = %path.as_ref().display(), kind = ?network.kind(), "loaded network");
    Ok(network)
}

/// Per-parameter gradients, in the same order as the parameters handed to the optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub weights: Vec<Array2<f64>>,
    pub biases: Vec<Array2<f64>>,
}

impl Gradients {
    /// Fail with [`EngineError::NonFinite`] if the loss or any gradient is NaN or infinite.
    pub fn ensure_finite(&self, context: &str, loss: f64) -> Result<()> {
        let finite = loss.is_finite()
            && self
                .weights
                .iter()
                .chain(&self.biases)
                .all(|g| g.iter().all(|v| v.is_finite()));
        if !finite {
            warn!(context, loss, "rejected non-finite gradient");
            return Err(EngineError::NonFinite(format!("{} loss or gradient", context)));
        }
        Ok(())
    }

    /// Clip weight gradients and bias gradients by global norm, each group on its own.
    pub fn clip(&mut self, max_norm: f64) {
        clip_gradients(&mut self.weights, max_norm);
        clip_gradients(&mut self.biases, max_norm);
    }
}

pub(crate) fn validate_topology(sizes: &[usize]) -> Result<()> {
    if sizes.len() < 2 {
        return Err(EngineError::InvalidHyperparameter(format!(
            "a network needs at least an input and an output layer, got {:?}",
            sizes
        )));
    }
    if sizes.iter().any(|&s| s == 0) {
        return Err(EngineError::InvalidHyperparameter(format!(
            "layer sizes must be positive, got {:?}",
            sizes
        )));
    }
    Ok(())
}

pub(crate) fn validate_clip_norm(max_norm: f64) -> Result<()> {
    if !(max_norm.is_finite() && max_norm >= 0.0) {
        return Err(EngineError::InvalidHyperparameter(format!(
            "gradient clip norm must be non-negative, got {}",
            max_norm
        )));
    }
    Ok(())
}
