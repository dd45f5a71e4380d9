//! Reward shaping for the Q-learning agent.

use crate::rl::ActionType;
use serde::{Deserialize, Serialize};

/// Creature needs and outcome flags observed before or after an action.
///
/// Needs are on the `0..=100` scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeedsSnapshot {
    pub hunger: f64,
    pub energy: f64,
    pub happiness: f64,
    pub alive: bool,
    pub player_interacted: bool,
    pub interaction_positive: bool,
    pub ball_caught: bool,
}

impl Default for NeedsSnapshot {
    fn default() -> Self {
        Self {
            hunger: 0.0,
            energy: 100.0,
            happiness: 50.0,
            alive: true,
            player_interacted: false,
            interaction_positive: false,
            ball_caught: false,
        }
    }
}

/// Actions tried fewer times than this earn the novelty bonus.
const RARE_ACTION_THRESHOLD: u64 = 5;

/// Scalar reward for taking `action` and moving from `before` to `after`.
///
/// `action_count` is how many times the action had been tried so far.
///
/// | Term | Value |
/// |---|---|
/// | happiness change | `Δhappiness · 0.1` |
/// | hunger after > 80 / > 60 | `−2.0` / `−0.5` |
/// | energy after < 20 | `−1.0` |
/// | sleeping with energy < 50 | `+1.0` |
/// | alive / dead | `+0.5` / `−50.0` |
/// | player interacted (positively) | `+2.0` (`+1.0` more) |
/// | food sought and hunger dropped | `+1.5` |
/// | ball played and caught | `+1.0` |
/// | rarely tried action | `+0.3` |
pub fn shape_reward(before: &NeedsSnapshot, after: &NeedsSnapshot, action: ActionType, action_count: u64) -> f64 {
    let mut reward = (after.happiness - before.happiness) * 0.1;

    if after.hunger > 80.0 {
        reward -= 2.0;
    } else if after.hunger > 60.0 {
        reward -= 0.5;
    }

    if after.energy < 20.0 {
        reward -= 1.0;
    } else if action == ActionType::Sleep && after.energy < 50.0 {
        reward += 1.0;
    }

    reward += if after.alive { 0.5 } else { -50.0 };

    if after.player_interacted {
        reward += 2.0;
        if after.interaction_positive {
            reward += 1.0;
        }
    }

    if action == ActionType::SeekFood && after.hunger < before.hunger {
        reward += 1.5;
    }
    if action == ActionType::PlayBall && after.ball_caught {
        reward += 1.0;
    }

    if action_count < RARE_ACTION_THRESHOLD {
        reward += 0.3;
    }
    reward
}
