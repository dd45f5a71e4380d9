//! Reinforcement learning: a deep Q-learning agent with experience replay.
//!
//! - [`ReplayBuffer`]: bounded FIFO of past transitions
//! - [`QAgent`]: epsilon-greedy policy over a Q-network, with a target network
//! - [`shape_reward`]: scalar reward from needs before and after an action
//! - [`GoalPlanner`]: keeps a need-driven goal and drives the agent's learn loop
//!
//! The loop is `choose_action → store_experience → learn → (periodically) sync
//! the target network`. Learning is skipped until the buffer holds one batch.

pub mod actions;
pub mod agent;
pub mod goals;
pub mod replay;
pub mod reward;

pub use actions::{ActionType, ACTION_COUNT};
pub use agent::{QAgent, QAgentDocument};
pub use goals::{Goal, GoalDecision, GoalPlanner, LearnReport};
pub use replay::{Experience, ReplayBuffer};
pub use reward::{shape_reward, NeedsSnapshot};
