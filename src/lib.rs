//! Neuropet learning engine
//!
//! A from-scratch numeric learning engine for desktop-pet behavior. Networks,
//! optimizers and the Q-learning agent are written directly on `ndarray`, and
//! every stochastic step draws from an explicit seeded generator so runs are
//! reproducible.
//!
//! # Modules
//!
//! - `layers`: Layer trait and implementations (Dense, BatchNorm, Dropout, LSTM cell)
//! - `optimizers`: Optimizer trait and implementations (SGD, Adam, RMSprop) plus gradient clipping
//! - `network`: feedforward, advanced and recurrent networks and their save documents
//! - `rl`: replay buffer, Q-learning agent, reward shaping and the goal planner
//! - `behavior`: state encodings, specialized networks, tiers and the [`behavior::BehaviorEngine`] facade
//! - `utils`: Shared utilities (RNG, activation functions, LR scheduler, matrix helpers)
//! - `config`: Engine configuration structures
//! - `error`: the [`EngineError`] type

pub mod behavior;
pub mod config;
pub mod error;
pub mod layers;
pub mod network;
pub mod optimizers;
pub mod rl;
pub mod utils;

pub use error::{EngineError, Result};
