//! Values exchanged with the host simulation: what the engine decided, what the
//! creature did, and how it turned out.

use crate::rl::{GoalDecision, LearnReport, NeedsSnapshot};
use serde::{Deserialize, Serialize};

use super::specialized::{EmotionalModifiers, Emotions, Movement, PlayerPrediction};
use super::state::{Activity, CreatureState, InteractionType};

/// Result of one decision. Only the full tier fills the optional parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorDecision {
    pub activity: Activity,
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub should_move: bool,
    pub emotions: Option<Emotions>,
    pub modifiers: Option<EmotionalModifiers>,
    pub player_prediction: Option<PlayerPrediction>,
    /// Action proposed by the goal planner, for the caller to use or ignore.
    pub rl: Option<GoalDecision>,
}

impl BehaviorDecision {
    /// A decision that only names an activity.
    pub fn activity_only(activity: Activity) -> Self {
        Self {
            activity,
            velocity_x: 0.0,
            velocity_y: 0.0,
            should_move: false,
            emotions: None,
            modifiers: None,
            player_prediction: None,
            rl: None,
        }
    }

    /// The action the creature would perform by following this decision.
    pub fn action(&self) -> BehaviorAction {
        let movement = self.emotions.map(|_| Movement {
            velocity_x: self.velocity_x,
            velocity_y: self.velocity_y,
            should_move: self.should_move,
        });
        BehaviorAction {
            activity: self.activity,
            movement,
        }
    }
}

/// What the creature actually did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BehaviorAction {
    pub activity: Activity,
    /// Movement to reinforce; `None` skips movement learning.
    pub movement: Option<Movement>,
}

impl BehaviorAction {
    pub fn new(activity: Activity) -> Self {
        Self {
            activity,
            movement: None,
        }
    }
}

/// Needs around the RL action, plus the state that followed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RlOutcome {
    pub action_index: usize,
    pub before: NeedsSnapshot,
    pub after: NeedsSnapshot,
    /// State after the action; the state the decision was made in when absent.
    pub next_state: Option<CreatureState>,
}

/// How an action turned out. Every field is optional in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Outcome {
    /// Movement reward; `0.5` when absent.
    pub reward: Option<f64>,
    /// Activity enjoyment; derived from `enjoyed` when absent.
    pub enjoyment: Option<f64>,
    pub enjoyed: bool,
    pub expected_emotions: Option<Emotions>,
    pub player_interaction: bool,
    pub interaction_type: Option<InteractionType>,
    pub positive: bool,
    pub rl: Option<RlOutcome>,
}

impl Default for Outcome {
    fn default() -> Self {
        Self {
            reward: None,
            enjoyment: None,
            enjoyed: false,
            expected_emotions: None,
            player_interaction: false,
            interaction_type: None,
            positive: true,
            rl: None,
        }
    }
}

impl Outcome {
    /// Outcome carrying only whether the creature enjoyed the activity.
    pub fn enjoyed(enjoyed: bool) -> Self {
        Self {
            enjoyed,
            ..Self::default()
        }
    }
}

/// Losses of the networks trained by one learning call; `None` means skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LearningSummary {
    pub movement_loss: Option<f64>,
    pub activity_loss: Option<f64>,
    pub emotion_loss: Option<f64>,
    pub social_loss: Option<f64>,
    pub rl: Option<LearnReport>,
}
