//! Discrete action catalogue of the Q-learning agent.

use serde::{Deserialize, Serialize};

/// Number of actions the agent chooses between.
pub const ACTION_COUNT: usize = 10;

/// One discrete action, indexed `0..ACTION_COUNT` in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    MoveToMouse,
    Explore,
    SeekFood,
    Hide,
    PlayBall,
    Sleep,
    MoveToCenter,
    StayStill,
    SeekInteraction,
    RandomWander,
    /// Returned for indices outside the catalogue.
    Unknown,
}

impl ActionType {
    pub const ALL: [ActionType; ACTION_COUNT] = [
        ActionType::MoveToMouse,
        ActionType::Explore,
        ActionType::SeekFood,
        ActionType::Hide,
        ActionType::PlayBall,
        ActionType::Sleep,
        ActionType::MoveToCenter,
        ActionType::StayStill,
        ActionType::SeekInteraction,
        ActionType::RandomWander,
    ];

    /// Action at `index`, or [`ActionType::Unknown`] when out of range.
    pub fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or(ActionType::Unknown)
    }

    pub fn index(self) -> Option<usize> {
        Self::ALL.iter().position(|&a| a == self)
    }

    /// Machine-readable type tag, e.g. `"seek_food"`.
    pub fn tag(self) -> &'static str {
        match self {
            ActionType::MoveToMouse => "move_to_mouse",
            ActionType::Explore => "explore",
            ActionType::SeekFood => "seek_food",
            ActionType::Hide => "hide",
            ActionType::PlayBall => "play_ball",
            ActionType::Sleep => "sleep",
            ActionType::MoveToCenter => "move_to_center",
            ActionType::StayStill => "stay_still",
            ActionType::SeekInteraction => "seek_interaction",
            ActionType::RandomWander => "random_wander",
            ActionType::Unknown => "unknown",
        }
    }

    /// Human-readable name, e.g. `"Seek Food"`.
    pub fn name(self) -> &'static str {
        match self {
            ActionType::MoveToMouse => "Chase Mouse",
            ActionType::Explore => "Explore",
            ActionType::SeekFood => "Seek Food",
            ActionType::Hide => "Hide",
            ActionType::PlayBall => "Play with Ball",
            ActionType::Sleep => "Sleep",
            ActionType::MoveToCenter => "Move to Center",
            ActionType::StayStill => "Stay Still",
            ActionType::SeekInteraction => "Seek Player Interaction",
            ActionType::RandomWander => "Wander",
            ActionType::Unknown => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_round_trip() {
        for (i, action) in ActionType::ALL.iter().enumerate() {
            assert_eq!(ActionType::from_index(i), *action);
            assert_eq!(action.index(), Some(i));
        }
    }

    #[test]
    fn test_out_of_range_is_unknown() {
        let action = ActionType::from_index(ACTION_COUNT);
        assert_eq!(action, ActionType::Unknown);
        assert_eq!(action.name(), "Unknown");
        assert_eq!(action.index(), None);
        assert_eq!(ActionType::SeekInteraction.name(), "Seek Player Interaction");
    }
}
