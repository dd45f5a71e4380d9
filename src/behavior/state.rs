//! Creature state and the fixed-length input encodings derived from it.
//!
//! Every network reads its own slice of the state:
//!
//! | Encoding | Length | Channels |
//! |---|---|---|
//! | enhanced (RL, recurrent tier) | `12 + sensory_size` | needs, recency, personality, sensory |
//! | movement | 18 | position, target, energy, distance, edges, personality |
//! | activity | 14 | needs, time of day, recent activities, emotions |
//! | emotion | 21 | needs, last 10 interaction qualities, personality |
//! | social | 9 | hour, weekday, recency, recent interaction types, player mood |
//!
//! Needs are stored on the `0..=100` scale and divided by 100 when encoded.

use crate::error::{shape_mismatch, Result};
use crate::rl::NeedsSnapshot;
use serde::{Deserialize, Serialize};

/// Screen dimensions used to normalize positions and edge distances.
pub const SCREEN_WIDTH: f64 = 1920.0;
pub const SCREEN_HEIGHT: f64 = 1080.0;

/// Distance at which the target-distance channel saturates.
const MAX_TARGET_DISTANCE: f64 = 500.0;
const SECONDS_PER_HOUR: f64 = 3600.0;
/// Interaction qualities fed to the emotion network.
pub const INTERACTION_QUALITY_WINDOW: usize = 10;
/// Quality assumed for missing interaction slots.
const DEFAULT_INTERACTION_QUALITY: f64 = 0.5;

pub const MOVEMENT_INPUT_SIZE: usize = 18;
pub const ACTIVITY_INPUT_SIZE: usize = 14;
pub const EMOTION_INPUT_SIZE: usize = 21;
pub const SOCIAL_INPUT_SIZE: usize = 9;

/// Personality trait, encoded one-hot over eight channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    Playful,
    Shy,
    Curious,
    Lazy,
    Energetic,
    Mischievous,
    Affectionate,
    Independent,
}

impl Personality {
    pub const ALL: [Personality; 8] = [
        Personality::Playful,
        Personality::Shy,
        Personality::Curious,
        Personality::Lazy,
        Personality::Energetic,
        Personality::Mischievous,
        Personality::Affectionate,
        Personality::Independent,
    ];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|&p| p == self).unwrap_or(0)
    }
}

/// Activity labels across every tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    BallPlay,
    MouseChase,
    HideAndSeek,
    Explore,
    Sleep,
    Eat,
    IconInteraction,
    Idle,
}

impl Activity {
    pub fn as_str(self) -> &'static str {
        match self {
            Activity::BallPlay => "ball_play",
            Activity::MouseChase => "mouse_chase",
            Activity::HideAndSeek => "hide_and_seek",
            Activity::Explore => "explore",
            Activity::Sleep => "sleep",
            Activity::Eat => "eat",
            Activity::IconInteraction => "icon_interaction",
            Activity::Idle => "idle",
        }
    }
}

/// Kind of player interaction predicted by the social network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Feed,
    PlayBall,
    Pet,
    Talk,
    Ignore,
}

impl InteractionType {
    pub const ALL: [InteractionType; 5] = [
        InteractionType::Feed,
        InteractionType::PlayBall,
        InteractionType::Pet,
        InteractionType::Talk,
        InteractionType::Ignore,
    ];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|&t| t == self).unwrap_or(0)
    }
}

/// Snapshot of everything the engine knows about the creature and its surroundings.
///
/// Supplied by the host simulation on every call; missing fields take neutral
/// defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreatureState {
    pub hunger: f64,
    pub energy: f64,
    pub happiness: f64,
    pub alive: bool,
    pub seconds_since_interaction: f64,
    pub personality: Option<Personality>,
    /// Environment sensory vector; empty means "no sensors" and encodes as zeros.
    pub sensory: Vec<f64>,
    pub pos_x: f64,
    pub pos_y: f64,
    pub target_x: f64,
    pub target_y: f64,
    pub distance_to_target: f64,
    pub edge_top: f64,
    pub edge_bottom: f64,
    pub edge_left: f64,
    pub edge_right: f64,
    /// Hour of the day in `[0, 24)`.
    pub time_of_day: f64,
    /// Day of the week in `0..7`, Monday first.
    pub day_of_week: f64,
    pub recent_activities: [f64; 5],
    pub emotional_state: [f64; 5],
    /// Quality of recent interactions, oldest first; only the last ten are used.
    pub recent_interaction_quality: Vec<f64>,
    pub recent_interaction_types: [f64; 5],
    pub player_mood: f64,
    pub player_nearby: bool,
}

impl Default for CreatureState {
    fn default() -> Self {
        Self {
            hunger: 0.0,
            energy: 100.0,
            happiness: 100.0,
            alive: true,
            seconds_since_interaction: 0.0,
            personality: None,
            sensory: Vec::new(),
            pos_x: 0.0,
            pos_y: 0.0,
            target_x: 0.0,
            target_y: 0.0,
            distance_to_target: 0.0,
            edge_top: 0.0,
            edge_bottom: 0.0,
            edge_left: 0.0,
            edge_right: 0.0,
            time_of_day: 12.0,
            day_of_week: 0.0,
            recent_activities: [0.0; 5],
            emotional_state: [0.5; 5],
            recent_interaction_quality: Vec::new(),
            recent_interaction_types: [0.0; 5],
            player_mood: 0.5,
            player_nearby: false,
        }
    }
}

impl CreatureState {
    /// One-hot personality; all zeros when unknown.
    pub fn personality_encoding(&self) -> [f64; 8] {
        let mut encoding = [0.0; 8];
        if let Some(personality) = self.personality {
            encoding[personality.index()] = 1.0;
        }
        encoding
    }

    /// Hours since the last interaction, saturating at one.
    pub fn interaction_recency(&self) -> f64 {
        (self.seconds_since_interaction / SECONDS_PER_HOUR).clamp(0.0, 1.0)
    }

    fn needs_channels(&self) -> [f64; 3] {
        [self.hunger / 100.0, self.energy / 100.0, self.happiness / 100.0]
    }

    /// Needs, recency, personality and the sensory vector: `12 + sensory_size` values.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::ShapeMismatch`] if a non-empty sensory vector is not
    /// `sensory_size` long.
    pub fn enhanced_input(&self, sensory_size: usize) -> Result<Vec<f64>> {
        let mut input = Vec::with_capacity(12 + sensory_size);
        input.extend(self.needs_channels());
        input.push(self.interaction_recency());
        input.extend(self.personality_encoding());
        if self.sensory.is_empty() {
            input.resize(12 + sensory_size, 0.0);
        } else if self.sensory.len() == sensory_size {
            input.extend_from_slice(&self.sensory);
        } else {
            return Err(shape_mismatch("sensory vector", (1, sensory_size), (1, self.sensory.len())));
        }
        Ok(input)
    }

    pub fn movement_input(&self) -> Vec<f64> {
        let mut input = vec![
            self.pos_x / SCREEN_WIDTH,
            self.pos_y / SCREEN_HEIGHT,
            self.target_x / SCREEN_WIDTH,
            self.target_y / SCREEN_HEIGHT,
            self.energy / 100.0,
            (self.distance_to_target / MAX_TARGET_DISTANCE).min(1.0),
            self.edge_top / SCREEN_HEIGHT,
            self.edge_bottom / SCREEN_HEIGHT,
            self.edge_left / SCREEN_WIDTH,
            self.edge_right / SCREEN_WIDTH,
        ];
        input.extend(self.personality_encoding());
        input
    }

    pub fn activity_input(&self) -> Vec<f64> {
        let mut input = Vec::with_capacity(ACTIVITY_INPUT_SIZE);
        input.extend(self.needs_channels());
        input.push(self.time_of_day / 24.0);
        input.extend(self.recent_activities);
        input.extend(self.emotional_state);
        input
    }

    /// The last ten interaction qualities, padded with `0.5`.
    pub fn interaction_quality_window(&self) -> [f64; INTERACTION_QUALITY_WINDOW] {
        let mut window = [DEFAULT_INTERACTION_QUALITY; INTERACTION_QUALITY_WINDOW];
        let skip = self
            .recent_interaction_quality
            .len()
            .saturating_sub(INTERACTION_QUALITY_WINDOW);
        for (slot, &q) in window.iter_mut().zip(&self.recent_interaction_quality[skip..]) {
            *slot = q;
        }
        window
    }

    pub fn emotion_input(&self) -> Vec<f64> {
        let mut input = Vec::with_capacity(EMOTION_INPUT_SIZE);
        input.extend(self.needs_channels());
        input.extend(self.interaction_quality_window());
        input.extend(self.personality_encoding());
        input
    }

    pub fn social_input(&self) -> Vec<f64> {
        let mut input = Vec::with_capacity(SOCIAL_INPUT_SIZE);
        input.push(self.time_of_day.floor() / 24.0);
        input.push(self.day_of_week.floor() / 7.0);
        input.push(self.interaction_recency());
        input.extend(self.recent_interaction_types);
        input.push(self.player_mood);
        input
    }

    /// Needs in the form the reward shaper reads.
    pub fn needs(&self) -> NeedsSnapshot {
        NeedsSnapshot {
            hunger: self.hunger,
            energy: self.energy,
            happiness: self.happiness,
            alive: self.alive,
            ..NeedsSnapshot::default()
        }
    }
}
