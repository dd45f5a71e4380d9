//! Specialized networks, one per aspect of behavior.
//!
//! - [`MovementNetwork`]: advanced network predicting a velocity and a move flag
//! - [`ActivityNetwork`]: LSTM choosing an activity from recent context
//! - [`EmotionNetwork`]: advanced network tracking five emotion intensities
//! - [`SocialNetwork`]: LSTM learning when and how the player interacts

use crate::error::Result;
use crate::network::{AdvancedConfig, AdvancedDocument, AdvancedNetwork, LstmConfig, LstmDocument, LstmNetwork};
use crate::utils::matrix::argmax;
use crate::utils::SeededRng;
use serde::{Deserialize, Serialize};

use super::state::{
    Activity, CreatureState, InteractionType, ACTIVITY_INPUT_SIZE, EMOTION_INPUT_SIZE, MOVEMENT_INPUT_SIZE,
    SOCIAL_INPUT_SIZE,
};

/// Buffered steps used for each online recurrent update.
pub(crate) const RECENT_WINDOW: usize = 3;

/// Velocity range is `±VELOCITY_SCALE / 2` per axis.
const VELOCITY_SCALE: f64 = 10.0;

/// Decoded movement output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub should_move: bool,
}

#[derive(Debug, Clone)]
pub struct MovementNetwork {
    network: AdvancedNetwork,
}

impl MovementNetwork {
    /// `18 → [32, 16, 8] → 3` with dropout `0.2`.
    pub fn new(learning_rate: f64, rng: &mut SeededRng) -> Result<Self> {
        let config = AdvancedConfig {
            learning_rate,
            dropout_rate: 0.2,
            ..AdvancedConfig::new(MOVEMENT_INPUT_SIZE, vec![32, 16, 8], 3)
        };
        Ok(Self {
            network: AdvancedNetwork::new(&config, rng)?,
        })
    }

    pub(crate) fn from_network(network: AdvancedNetwork) -> Self {
        Self { network }
    }

    pub fn network(&self) -> &AdvancedNetwork {
        &self.network
    }

    /// Velocity per axis is `(out − 0.5) · 10`; the creature moves when `out₂ > 0.5`.
    pub fn predict_movement(&self, state: &CreatureState) -> Result<Movement> {
        let out = self.network.predict_one(&state.movement_input())?;
        Ok(Movement {
            velocity_x: (out[0] - 0.5) * VELOCITY_SCALE,
            velocity_y: (out[1] - 0.5) * VELOCITY_SCALE,
            should_move: out[2] > 0.5,
        })
    }

    /// Reinforce `movement` in proportion to `reward`.
    pub fn learn(&mut self, state: &CreatureState, movement: &Movement, reward: f64, rng: &mut SeededRng) -> Result<f64> {
        let target = [
            ((movement.velocity_x / VELOCITY_SCALE + 0.5) * reward).clamp(0.0, 1.0),
            ((movement.velocity_y / VELOCITY_SCALE + 0.5) * reward).clamp(0.0, 1.0),
            if movement.should_move && reward > 0.5 { 1.0 } else { 0.0 },
        ];
        self.network.train_one(&state.movement_input(), &target, rng)
    }

    pub fn to_document(&self) -> AdvancedDocument {
        self.network.to_document()
    }
}

#[derive(Debug, Clone)]
pub struct ActivityNetwork {
    network: LstmNetwork,
}

impl ActivityNetwork {
    pub const ACTIVITIES: [Activity; 6] = [
        Activity::BallPlay,
        Activity::MouseChase,
        Activity::HideAndSeek,
        Activity::Explore,
        Activity::Sleep,
        Activity::Eat,
    ];

    /// `14 → 32 × 2 → 6`, remembering the last 20 decisions.
    pub fn new(learning_rate: f64, rng: &mut SeededRng) -> Result<Self> {
        let config = LstmConfig {
            learning_rate,
            sequence_length: 20,
            ..LstmConfig::new(ACTIVITY_INPUT_SIZE, 32, Self::ACTIVITIES.len())
        };
        Ok(Self {
            network: LstmNetwork::new(&config, rng)?,
        })
    }

    pub(crate) fn from_network(network: LstmNetwork) -> Self {
        Self { network }
    }

    pub fn network(&self) -> &LstmNetwork {
        &self.network
    }

    pub fn choose_activity(&mut self, state: &CreatureState) -> Result<Activity> {
        let scores = self.network.predict(&state.activity_input())?;
        Ok(Self::ACTIVITIES[argmax(&scores)])
    }

    /// Buffer the state and train the recent window towards `enjoyment` on the
    /// chosen activity. Activities outside the catalogue train towards all zeros.
    pub fn learn_from_activity(&mut self, state: &CreatureState, activity: Activity, enjoyment: f64) -> Result<Option<f64>> {
        let mut target = vec![0.0; Self::ACTIVITIES.len()];
        if let Some(i) = Self::ACTIVITIES.iter().position(|&a| a == activity) {
            target[i] = enjoyment;
        }
        self.network.add_to_sequence(&state.activity_input())?;
        self.network.train_recent(&target, RECENT_WINDOW)
    }

    pub fn to_document(&self) -> LstmDocument {
        self.network.to_document()
    }
}

/// Intensities of the five tracked emotions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Emotions {
    pub joy: f64,
    pub excitement: f64,
    pub contentment: f64,
    pub anxiety: f64,
    pub loneliness: f64,
}

impl Default for Emotions {
    /// Every emotion at `0.5`; also the target for emotions left out of an expectation.
    fn default() -> Self {
        Self::from_array([0.5; 5])
    }
}

impl Emotions {
    /// Emotions of a freshly built network.
    pub const INITIAL: Emotions = Emotions {
        joy: 0.5,
        excitement: 0.5,
        contentment: 0.5,
        anxiety: 0.3,
        loneliness: 0.3,
    };

    pub fn from_array(values: [f64; 5]) -> Self {
        let [joy, excitement, contentment, anxiety, loneliness] = values;
        Self {
            joy,
            excitement,
            contentment,
            anxiety,
            loneliness,
        }
    }

    pub fn to_array(self) -> [f64; 5] {
        [self.joy, self.excitement, self.contentment, self.anxiety, self.loneliness]
    }

    /// Behavioral modifiers derived from these emotions.
    pub fn modifiers(&self) -> EmotionalModifiers {
        EmotionalModifiers {
            movement_speed: 0.5 + self.excitement * 0.8 - self.contentment * 0.3,
            interaction_desire: self.joy * 0.5 + self.loneliness * 0.8,
            playfulness: self.excitement * 0.7 + self.joy * 0.5,
            fearfulness: self.anxiety * 0.9,
            energy_consumption: 0.8 + self.excitement * 0.4 - self.contentment * 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionalModifiers {
    pub movement_speed: f64,
    pub interaction_desire: f64,
    pub playfulness: f64,
    pub fearfulness: f64,
    pub energy_consumption: f64,
}

#[derive(Debug, Clone)]
pub struct EmotionNetwork {
    network: AdvancedNetwork,
    current: Emotions,
}

impl EmotionNetwork {
    /// `21 → [32, 16] → 5`.
    pub fn new(learning_rate: f64, rng: &mut SeededRng) -> Result<Self> {
        let config = AdvancedConfig {
            learning_rate,
            ..AdvancedConfig::new(EMOTION_INPUT_SIZE, vec![32, 16], 5)
        };
        Ok(Self {
            network: AdvancedNetwork::new(&config, rng)?,
            current: Emotions::INITIAL,
        })
    }

    pub(crate) fn from_parts(network: AdvancedNetwork, current: Emotions) -> Self {
        Self { network, current }
    }

    pub fn network(&self) -> &AdvancedNetwork {
        &self.network
    }

    pub fn current(&self) -> Emotions {
        self.current
    }

    /// Recompute the emotions from `state` and remember them.
    pub fn update_emotions(&mut self, state: &CreatureState) -> Result<Emotions> {
        let out = self.network.predict_one(&state.emotion_input())?;
        self.current = Emotions::from_array([out[0], out[1], out[2], out[3], out[4]]);
        Ok(self.current)
    }

    pub fn modifiers(&self) -> EmotionalModifiers {
        self.current.modifiers()
    }

    /// Train towards the emotions the creature should have felt in `state`.
    pub fn learn_emotional_response(&mut self, state: &CreatureState, expected: &Emotions, rng: &mut SeededRng) -> Result<f64> {
        self.network
            .train_one(&state.emotion_input(), &expected.to_array(), rng)
    }

    pub fn to_document(&self) -> AdvancedDocument {
        self.network.to_document()
    }
}

/// Likelihood of each interaction type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InteractionLikelihoods {
    pub feed: f64,
    pub play_ball: f64,
    pub pet: f64,
    pub talk: f64,
    pub ignore: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerPrediction {
    pub interaction_probability: f64,
    pub likely_interaction: InteractionLikelihoods,
}

#[derive(Debug, Clone)]
pub struct SocialNetwork {
    network: LstmNetwork,
}

impl SocialNetwork {
    /// `9 → 24 × 1 → 6`, remembering the last 50 observations.
    pub fn new(learning_rate: f64, rng: &mut SeededRng) -> Result<Self> {
        let config = LstmConfig {
            num_layers: 1,
            learning_rate,
            sequence_length: 50,
            ..LstmConfig::new(SOCIAL_INPUT_SIZE, 24, 1 + InteractionType::ALL.len())
        };
        Ok(Self {
            network: LstmNetwork::new(&config, rng)?,
        })
    }

    pub(crate) fn from_network(network: LstmNetwork) -> Self {
        Self { network }
    }

    pub fn network(&self) -> &LstmNetwork {
        &self.network
    }

    pub fn predict_player_behavior(&mut self, state: &CreatureState) -> Result<PlayerPrediction> {
        let out = self.network.predict(&state.social_input())?;
        Ok(PlayerPrediction {
            interaction_probability: out[0],
            likely_interaction: InteractionLikelihoods {
                feed: out[1],
                play_ball: out[2],
                pet: out[3],
                talk: out[4],
                ignore: out[5],
            },
        })
    }

    /// Record that the player interacted and train the recent window.
    ///
    /// Target: interaction probability `1`, and `1.0` (positive) or `0.2`
    /// (negative) on the interaction's type.
    pub fn learn_from_interaction(
        &mut self,
        state: &CreatureState,
        interaction: Option<InteractionType>,
        positive: bool,
    ) -> Result<Option<f64>> {
        let mut target = vec![0.0; 1 + InteractionType::ALL.len()];
        target[0] = 1.0;
        if let Some(kind) = interaction {
            target[1 + kind.index()] = if positive { 1.0 } else { 0.2 };
        }
        self.network.add_to_sequence(&state.social_input())?;
        self.network.train_recent(&target, RECENT_WINDOW)
    }

    pub fn to_document(&self) -> LstmDocument {
        self.network.to_document()
    }
}
