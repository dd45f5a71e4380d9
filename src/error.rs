//! Error type shared by every component of the engine
//!
//! All fallible operations return [`Result`]. Shape, hyperparameter and
//! serialization errors are not recoverable locally and surface to the caller;
//! [`EngineError::BufferUnderflow`] is the one condition callers are expected
//! to treat as "skip this learning step".

use thiserror::Error;

/// Errors raised by networks, optimizers, the RL agent and the facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Incompatible matrix dimensions, either between layers or between a
    /// loaded document and the topology it claims to describe.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A hyperparameter outside its valid range (non-positive learning rate,
    /// rate outside [0, 1], zero capacity, ...).
    #[error("invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    /// A batch larger than the replay buffer was requested.
    #[error("buffer underflow: requested {requested} experiences but only {available} stored")]
    BufferUnderflow { requested: usize, available: usize },

    /// A malformed or incomplete save document.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// A loss or gradient became NaN or infinite. Raised before any parameter
    /// is modified.
    #[error("non-finite value: {0}")]
    NonFinite(String),

    /// Reading or writing a document on disk failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::SerializationError(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Build a [`EngineError::ShapeMismatch`] describing two incompatible shapes.
pub(crate) fn shape_mismatch(context: &str, expected: (usize, usize), found: (usize, usize)) -> EngineError {
    EngineError::ShapeMismatch(format!(
        "{}: expected {}x{}, found {}x{}",
        context, expected.0, expected.1, found.0, found.1
    ))
}
