//! Behavior layer: turns a creature's state into decisions and learns from outcomes.
//!
//! - [`state`]: the state snapshot and its per-network encodings
//! - [`specialized`]: movement, activity, emotion and social networks
//! - [`coordinator`]: the full tier, combining the specialized networks with the goal planner
//! - [`tiers`]: the simple and recurrent tiers
//! - [`engine`]: the [`BehaviorEngine`] facade over all three tiers

pub mod coordinator;
pub mod decision;
pub mod engine;
pub mod specialized;
pub mod state;
pub mod tiers;

pub use coordinator::{CoordinatorDocument, NetworkCoordinator};
pub use decision::{BehaviorAction, BehaviorDecision, LearningSummary, Outcome, RlOutcome};
pub use engine::{BehaviorEngine, EngineDocument, InteractionRecord, TierDocument, HISTORY_LIMIT};
pub use specialized::{
    ActivityNetwork, EmotionNetwork, EmotionalModifiers, Emotions, InteractionLikelihoods, Movement,
    MovementNetwork, PlayerPrediction, SocialNetwork,
};
pub use state::{Activity, CreatureState, InteractionType, Personality};
pub use tiers::{RecurrentLearner, SimpleLearner};
