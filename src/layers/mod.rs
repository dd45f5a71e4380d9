//! Layer abstractions for neural networks
//!
//! This module provides the Layer trait and the building blocks the networks are
//! assembled from: dense layers, batch normalization, dropout and the LSTM cell.

mod r#trait;
pub mod batchnorm;
pub mod dense;
pub mod dropout;
pub mod lstm_cell;

// Re-export the Layer trait for convenience
pub use batchnorm::{BatchNormCache, BatchNormGradients, BatchNormLayer};
pub use dense::{DenseGradients, DenseLayer};
pub use dropout::DropoutLayer;
pub use lstm_cell::{Gate, LstmCache, LstmCell, LstmGateGradients};
pub use r#trait::Layer;
