//! Coordinator of the full tier.
//!
//! Owns the four specialized networks and the goal planner. A decision runs
//! them in a fixed order: emotions first, then the emotion-augmented state feeds
//! the social, activity and movement networks, and the planner proposes an RL
//! action on the side.

use crate::config::EngineConfig;
use crate::error::{shape_mismatch, Result};
use crate::network::{AdvancedDocument, AdvancedNetwork, LstmDocument, LstmNetwork};
use crate::rl::{GoalPlanner, QAgent, QAgentDocument};
use crate::utils::SeededRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::decision::{BehaviorAction, BehaviorDecision, LearningSummary, Outcome};
use super::specialized::{ActivityNetwork, EmotionNetwork, Emotions, MovementNetwork, SocialNetwork};
use super::state::{
    CreatureState, ACTIVITY_INPUT_SIZE, EMOTION_INPUT_SIZE, MOVEMENT_INPUT_SIZE, SOCIAL_INPUT_SIZE,
};

/// Movement reward assumed when an outcome carries none.
pub const DEFAULT_REWARD: f64 = 0.5;

/// Length of the enhanced state the RL agent reads.
pub fn rl_state_size(sensory_size: usize) -> usize {
    12 + sensory_size
}

/// Serialized form of a [`NetworkCoordinator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorDocument {
    pub sensory_size: usize,
    pub movement: AdvancedDocument,
    pub activity: LstmDocument,
    pub emotion: AdvancedDocument,
    pub social: LstmDocument,
    pub current_emotions: Emotions,
    pub rl: QAgentDocument,
}

#[derive(Debug, Clone)]
pub struct NetworkCoordinator {
    sensory_size: usize,
    movement: MovementNetwork,
    activity: ActivityNetwork,
    emotion: EmotionNetwork,
    social: SocialNetwork,
    planner: GoalPlanner,
}

impl NetworkCoordinator {
    pub fn new(config: &EngineConfig, rng: &mut SeededRng) -> Result<Self> {
        let lr = config.learning_rate;
        let movement = MovementNetwork::new(lr, rng)?;
        let activity = ActivityNetwork::new(lr, rng)?;
        let emotion = EmotionNetwork::new(lr, rng)?;
        let social = SocialNetwork::new(lr, rng)?;
        let agent = QAgent::new(rl_state_size(config.sensory_size), &config.rl, rng)?;
        Ok(Self {
            sensory_size: config.sensory_size,
            movement,
            activity,
            emotion,
            social,
            planner: GoalPlanner::new(agent),
        })
    }

    pub fn sensory_size(&self) -> usize {
        self.sensory_size
    }

    pub fn movement(&self) -> &MovementNetwork {
        &self.movement
    }

    pub fn activity(&self) -> &ActivityNetwork {
        &self.activity
    }

    pub fn emotion(&self) -> &EmotionNetwork {
        &self.emotion
    }

    pub fn social(&self) -> &SocialNetwork {
        &self.social
    }

    pub fn planner(&self) -> &GoalPlanner {
        &self.planner
    }

    /// Run every network on `state` and combine their outputs.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::ShapeMismatch`] if the state's sensory vector does
    /// not match the configured size. The check runs before any network sees the
    /// state, so the recurrent buffers are left untouched.
    pub fn decide_behavior(&mut self, state: &CreatureState, rng: &mut SeededRng) -> Result<BehaviorDecision> {
        let rl_state = state.enhanced_input(self.sensory_size)?;

        let emotions = self.emotion.update_emotions(state)?;
        let modifiers = emotions.modifiers();

        let mut enriched = state.clone();
        enriched.emotional_state = emotions.to_array();

        let player_prediction = self.social.predict_player_behavior(&enriched)?;
        let activity = self.activity.choose_activity(&enriched)?;
        let movement = self.movement.predict_movement(&enriched)?;

        let rl = self
            .planner
            .execute(&rl_state, &state.needs(), state.player_nearby, rng)?;

        debug!(
            activity = activity.as_str(),
            action = rl.action.name(),
            speed = modifiers.movement_speed,
            "behavior decided"
        );

        Ok(BehaviorDecision {
            activity,
            velocity_x: movement.velocity_x * modifiers.movement_speed,
            velocity_y: movement.velocity_y * modifiers.movement_speed,
            should_move: movement.should_move,
            emotions: Some(emotions),
            modifiers: Some(modifiers),
            player_prediction: Some(player_prediction),
            rl: Some(rl),
        })
    }

    /// Train every network the outcome has something to say about.
    ///
    /// - movement, when the action carries one, towards the outcome's reward
    /// - activity, always, towards the enjoyment (the reward when absent)
    /// - emotion, when expected emotions are given
    /// - social, when the player interacted
    /// - the goal planner, when the outcome reports the RL action's needs
    pub fn learn_from_outcome(
        &mut self,
        state: &CreatureState,
        action: &BehaviorAction,
        outcome: &Outcome,
        rng: &mut SeededRng,
    ) -> Result<LearningSummary> {
        let rl_states = match &outcome.rl {
            Some(rl) => {
                let before = state.enhanced_input(self.sensory_size)?;
                let after = match &rl.next_state {
                    Some(next) => next.enhanced_input(self.sensory_size)?,
                    None => before.clone(),
                };
                Some((before, after))
            }
            None => None,
        };

        let reward = outcome.reward.unwrap_or(DEFAULT_REWARD);
        let mut summary = LearningSummary::default();

        if let Some(movement) = &action.movement {
            summary.movement_loss = Some(self.movement.learn(state, movement, reward, rng)?);
        }

        let enjoyment = outcome.enjoyment.unwrap_or(reward);
        summary.activity_loss = self
            .activity
            .learn_from_activity(state, action.activity, enjoyment)?;

        if let Some(expected) = &outcome.expected_emotions {
            summary.emotion_loss = Some(self.emotion.learn_emotional_response(state, expected, rng)?);
        }

        if outcome.player_interaction {
            summary.social_loss =
                self.social
                    .learn_from_interaction(state, outcome.interaction_type, outcome.positive)?;
        }

        if let (Some(rl), Some((before, after))) = (&outcome.rl, rl_states) {
            summary.rl = Some(self.planner.learn_from_outcome(
                before,
                rl.action_index,
                after,
                &rl.before,
                &rl.after,
                rng,
            )?);
        }

        Ok(summary)
    }

    pub fn to_document(&self) -> CoordinatorDocument {
        CoordinatorDocument {
            sensory_size: self.sensory_size,
            movement: self.movement.to_document(),
            activity: self.activity.to_document(),
            emotion: self.emotion.to_document(),
            social: self.social.to_document(),
            current_emotions: self.emotion.current(),
            rl: self.planner.to_document(),
        }
    }

    /// Rebuild a coordinator, checking every network against its expected topology.
    pub fn from_document(doc: CoordinatorDocument) -> Result<Self> {
        let movement = AdvancedNetwork::from_document(doc.movement)?;
        expect_topology("movement network", (movement.input_size(), movement.output_size()), (MOVEMENT_INPUT_SIZE, 3))?;

        let activity = LstmNetwork::from_document(doc.activity)?;
        expect_topology(
            "activity network",
            (activity.input_size(), activity.output_size()),
            (ACTIVITY_INPUT_SIZE, ActivityNetwork::ACTIVITIES.len()),
        )?;

        let emotion = AdvancedNetwork::from_document(doc.emotion)?;
        expect_topology("emotion network", (emotion.input_size(), emotion.output_size()), (EMOTION_INPUT_SIZE, 5))?;

        let social = LstmNetwork::from_document(doc.social)?;
        expect_topology("social network", (social.input_size(), social.output_size()), (SOCIAL_INPUT_SIZE, 6))?;

        let planner = GoalPlanner::from_document(doc.rl)?;
        let state_size = planner.agent().state_size();
        if state_size != rl_state_size(doc.sensory_size) {
            return Err(shape_mismatch(
                "rl state",
                (1, rl_state_size(doc.sensory_size)),
                (1, state_size),
            ));
        }

        Ok(Self {
            sensory_size: doc.sensory_size,
            movement: MovementNetwork::from_network(movement),
            activity: ActivityNetwork::from_network(activity),
            emotion: EmotionNetwork::from_parts(emotion, doc.current_emotions),
            social: SocialNetwork::from_network(social),
            planner,
        })
    }
}

fn expect_topology(context: &str, found: (usize, usize), expected: (usize, usize)) -> Result<()> {
    if found != expected {
        return Err(shape_mismatch(context, expected, found));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::NeedsSnapshot;
    use crate::behavior::state::Activity;

    fn small_config() -> EngineConfig {
        EngineConfig {
            sensory_size: 4,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_decision_is_complete() {
        let mut rng = SeededRng::new(11);
        let mut coordinator = NetworkCoordinator::new(&small_config(), &mut rng).unwrap();
        let decision = coordinator
            .decide_behavior(&CreatureState::default(), &mut rng)
            .unwrap();
        assert!(decision.emotions.is_some());
        assert!(decision.player_prediction.is_some());
        assert!(decision.rl.unwrap().action_index < 10);
        assert!(ActivityNetwork::ACTIVITIES.contains(&decision.activity));
    }

    #[test]
    fn test_velocity_scaled_by_emotional_speed() {
        let mut rng = SeededRng::new(15);
        let mut coordinator = NetworkCoordinator::new(&small_config(), &mut rng).unwrap();
        let state = CreatureState::default();
        let decision = coordinator.decide_behavior(&state, &mut rng).unwrap();

        let emotions = decision.emotions.unwrap();
        let speed = emotions.modifiers().movement_speed;
        assert_eq!(decision.modifiers.unwrap().movement_speed, speed);

        let enriched = CreatureState {
            emotional_state: emotions.to_array(),
            ..state
        };
        let raw = coordinator.movement().predict_movement(&enriched).unwrap();
        assert!((decision.velocity_x - raw.velocity_x * speed).abs() < 1e-12);
        assert!((decision.velocity_y - raw.velocity_y * speed).abs() < 1e-12);
        assert_eq!(decision.should_move, raw.should_move);
    }

    #[test]
    fn test_bad_sensory_rejected_before_buffers_change() {
        let mut rng = SeededRng::new(12);
        let mut coordinator = NetworkCoordinator::new(&small_config(), &mut rng).unwrap();
        let state = CreatureState {
            sensory: vec![0.0; 3],
            ..CreatureState::default()
        };
        assert!(coordinator.decide_behavior(&state, &mut rng).is_err());
        assert!(coordinator.activity().network().sequence_buffer().is_empty());
        assert!(coordinator.social().network().sequence_buffer().is_empty());
    }

    #[test]
    fn test_learning_touches_requested_networks() {
        let mut rng = SeededRng::new(13);
        let mut coordinator = NetworkCoordinator::new(&small_config(), &mut rng).unwrap();
        let state = CreatureState::default();
        let outcome = Outcome {
            expected_emotions: Some(Emotions::default()),
            rl: Some(crate::behavior::decision::RlOutcome {
                action_index: 2,
                before: NeedsSnapshot::default(),
                after: NeedsSnapshot::default(),
                next_state: None,
            }),
            ..Outcome::default()
        };
        let summary = coordinator
            .learn_from_outcome(&state, &BehaviorAction::new(Activity::Eat), &outcome, &mut rng)
            .unwrap();
        assert_eq!(summary.movement_loss, None);
        assert_eq!(summary.activity_loss, None);
        assert!(summary.emotion_loss.is_some());
        assert_eq!(summary.social_loss, None);
        assert_eq!(coordinator.planner().agent().replay_buffer().len(), 1);
    }

    #[test]
    fn test_document_checks_rl_state_size() {
        let mut rng = SeededRng::new(14);
        let coordinator = NetworkCoordinator::new(&small_config(), &mut rng).unwrap();
        let mut doc = coordinator.to_document();
        doc.sensory_size = 5;
        assert!(NetworkCoordinator::from_document(doc).is_err());
    }
}
