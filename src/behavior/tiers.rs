//! The two lightweight tiers.
//!
//! [`SimpleLearner`] scores each candidate activity with one small feedforward
//! network. [`RecurrentLearner`] reads the enhanced state history with an LSTM
//! and outputs one score per activity.

use crate::error::{shape_mismatch, Result};
use crate::network::{FeedForwardConfig, FeedForwardDocument, FeedForwardNetwork, LstmConfig, LstmDocument, LstmNetwork};
use crate::utils::matrix::argmax;
use crate::utils::SeededRng;

use super::specialized::RECENT_WINDOW;
use super::state::{Activity, CreatureState};

/// Needs and recency channels ahead of the activity one-hot.
const SIMPLE_STATE_CHANNELS: usize = 4;

/// Feedforward enjoyment predictor over `(needs, recency, activity)`.
#[derive(Debug, Clone)]
pub struct SimpleLearner {
    network: FeedForwardNetwork,
}

impl SimpleLearner {
    /// Activities in one-hot order.
    pub const ACTIVITIES: [Activity; 5] = [
        Activity::BallPlay,
        Activity::MouseChase,
        Activity::HideAndSeek,
        Activity::IconInteraction,
        Activity::Idle,
    ];

    /// Activities [`SimpleLearner::best_activity`] chooses from; idling is never proposed.
    pub const CANDIDATES: [Activity; 4] = [
        Activity::BallPlay,
        Activity::MouseChase,
        Activity::HideAndSeek,
        Activity::IconInteraction,
    ];

    const INPUT_SIZE: usize = SIMPLE_STATE_CHANNELS + Self::ACTIVITIES.len();

    /// `9 → [8, 6] → 1` with learning rate `0.01`.
    pub fn new(rng: &mut SeededRng) -> Result<Self> {
        let config = FeedForwardConfig {
            learning_rate: 0.01,
            ..FeedForwardConfig::new(Self::INPUT_SIZE, vec![8, 6], 1)
        };
        Ok(Self {
            network: FeedForwardNetwork::new(&config, rng)?,
        })
    }

    pub fn network(&self) -> &FeedForwardNetwork {
        &self.network
    }

    fn input(state: &CreatureState, activity: Activity) -> Vec<f64> {
        let mut input = vec![
            state.hunger / 100.0,
            state.energy / 100.0,
            state.happiness / 100.0,
            state.interaction_recency(),
        ];
        input.extend(Self::ACTIVITIES.iter().map(|&a| if a == activity { 1.0 } else { 0.0 }));
        input
    }

    /// Predicted enjoyment in `[0, 1]`.
    pub fn predict_enjoyment(&self, state: &CreatureState, activity: Activity) -> Result<f64> {
        Ok(self.network.predict_one(&Self::input(state, activity))?[0])
    }

    pub fn best_activity(&self, state: &CreatureState) -> Result<Activity> {
        let scores = Self::CANDIDATES
            .iter()
            .map(|&a| self.predict_enjoyment(state, a))
            .collect::<Result<Vec<f64>>>()?;
        Ok(Self::CANDIDATES[argmax(&scores)])
    }

    /// One training step towards `1` (enjoyed) or `0`.
    pub fn learn_from_interaction(&mut self, state: &CreatureState, activity: Activity, enjoyed: bool) -> Result<f64> {
        let target = if enjoyed { 1.0 } else { 0.0 };
        self.network.train_one(&Self::input(state, activity), &[target])
    }

    pub fn to_document(&self) -> FeedForwardDocument {
        self.network.to_document()
    }

    pub fn from_document(doc: FeedForwardDocument) -> Result<Self> {
        let network = FeedForwardNetwork::from_document(doc)?;
        if network.input_size() != Self::INPUT_SIZE || network.output_size() != 1 {
            return Err(shape_mismatch(
                "simple learner",
                (Self::INPUT_SIZE, 1),
                (network.input_size(), network.output_size()),
            ));
        }
        Ok(Self { network })
    }
}

/// LSTM activity scorer over the enhanced state.
#[derive(Debug, Clone)]
pub struct RecurrentLearner {
    network: LstmNetwork,
    sensory_size: usize,
}

impl RecurrentLearner {
    pub const ACTIVITIES: [Activity; 5] = [
        Activity::BallPlay,
        Activity::MouseChase,
        Activity::HideAndSeek,
        Activity::Explore,
        Activity::Idle,
    ];

    /// `(12 + sensory_size) → 32 × 2 → 5`, remembering the last 30 states.
    pub fn new(sensory_size: usize, learning_rate: f64, rng: &mut SeededRng) -> Result<Self> {
        let config = LstmConfig {
            learning_rate,
            sequence_length: 30,
            ..LstmConfig::new(12 + sensory_size, 32, Self::ACTIVITIES.len())
        };
        Ok(Self {
            network: LstmNetwork::new(&config, rng)?,
            sensory_size,
        })
    }

    pub fn network(&self) -> &LstmNetwork {
        &self.network
    }

    pub fn choose_activity(&mut self, state: &CreatureState) -> Result<Activity> {
        let input = state.enhanced_input(self.sensory_size)?;
        let scores = self.network.predict(&input)?;
        Ok(Self::ACTIVITIES[argmax(&scores)])
    }

    /// Buffer the state and train the recent window towards `1.0` (enjoyed) or
    /// `0.2` on the activity. Returns `None` while fewer than three states are buffered.
    pub fn learn_from_interaction(
        &mut self,
        state: &CreatureState,
        activity: Activity,
        enjoyed: bool,
    ) -> Result<Option<f64>> {
        let input = state.enhanced_input(self.sensory_size)?;
        let mut target = vec![0.0; Self::ACTIVITIES.len()];
        if let Some(i) = Self::ACTIVITIES.iter().position(|&a| a == activity) {
            target[i] = if enjoyed { 1.0 } else { 0.2 };
        }
        self.network.add_to_sequence(&input)?;
        self.network.train_recent(&target, RECENT_WINDOW)
    }

    pub fn to_document(&self) -> LstmDocument {
        self.network.to_document()
    }

    pub fn from_document(doc: LstmDocument, sensory_size: usize) -> Result<Self> {
        let network = LstmNetwork::from_document(doc)?;
        let expected = (12 + sensory_size, Self::ACTIVITIES.len());
        let found = (network.input_size(), network.output_size());
        if found != expected {
            return Err(shape_mismatch("recurrent learner", expected, found));
        }
        Ok(Self { network, sensory_size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_never_proposes_idle() {
        let mut rng = SeededRng::new(21);
        let learner = SimpleLearner::new(&mut rng).unwrap();
        let choice = learner.best_activity(&CreatureState::default()).unwrap();
        assert!(SimpleLearner::CANDIDATES.contains(&choice));
    }

    #[test]
    fn test_simple_learning_moves_prediction() {
        let mut rng = SeededRng::new(22);
        let mut learner = SimpleLearner::new(&mut rng).unwrap();
        let state = CreatureState::default();
        let before = learner.predict_enjoyment(&state, Activity::BallPlay).unwrap();
        for _ in 0..200 {
            learner
                .learn_from_interaction(&state, Activity::BallPlay, true)
                .unwrap();
        }
        let after = learner.predict_enjoyment(&state, Activity::BallPlay).unwrap();
        assert!(after > before);
    }

    #[test]
    fn test_recurrent_input_width() {
        let mut rng = SeededRng::new(23);
        let mut learner = RecurrentLearner::new(6, 0.001, &mut rng).unwrap();
        assert_eq!(learner.network().input_size(), 18);
        let state = CreatureState {
            sensory: vec![0.2; 6],
            ..CreatureState::default()
        };
        assert!(RecurrentLearner::ACTIVITIES.contains(&learner.choose_activity(&state).unwrap()));
        assert_eq!(learner.network().sequence_buffer().len(), 1);
    }

    #[test]
    fn test_recurrent_document_checks_width() {
        let mut rng = SeededRng::new(24);
        let learner = RecurrentLearner::new(6, 0.001, &mut rng).unwrap();
        assert!(RecurrentLearner::from_document(learner.to_document(), 5).is_err());
        assert!(RecurrentLearner::from_document(learner.to_document(), 6).is_ok());
    }
}
