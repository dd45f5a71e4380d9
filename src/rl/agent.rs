//! Q-learning agent with experience replay and a target network.
//!
//! The online network estimates `Q(s, ·)` for every action; the target network is
//! a periodically synced copy used for the Bellman targets
//!
//! ```text
//! target[a] = r                              if the episode ended
//! target[a] = r + γ · max_a' Q_target(s', a')  otherwise
//! ```
//!
//! Exploration is epsilon-greedy, biased towards rarely tried actions.

use crate::config::RlConfig;
use crate::error::{shape_mismatch, EngineError, Result};
use crate::network::{FeedForwardConfig, FeedForwardDocument, FeedForwardNetwork, OutputActivation};
use crate::optimizers::OptimizerType;
use crate::rl::{ActionType, Experience, ReplayBuffer, ACTION_COUNT};
use crate::utils::matrix::{argmax, stack_rows};
use crate::utils::SeededRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hidden layer sizes of the Q-network.
const Q_HIDDEN_LAYERS: [usize; 2] = [64, 32];

/// Experiences kept in a saved document.
const SAVED_EXPERIENCES: usize = 100;

/// Serialized form of a [`QAgent`].
///
/// Carries the online network and the most recent experiences only; the target
/// network is rebuilt as a copy of the online one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QAgentDocument {
    pub state_size: usize,
    pub epsilon: f64,
    pub action_counts: Vec<u64>,
    pub experiences_stored: u64,
    pub config: RlConfig,
    pub q_network: FeedForwardDocument,
    pub replay_buffer: Vec<Experience>,
}

/// Deep Q-learning agent over the [`ActionType`] catalogue.
#[derive(Debug, Clone)]
pub struct QAgent {
    state_size: usize,
    config: RlConfig,
    epsilon: f64,
    q_network: FeedForwardNetwork,
    target_network: FeedForwardNetwork,
    replay: ReplayBuffer,
    action_counts: Vec<u64>,
    experiences_stored: u64,
}

impl QAgent {
    /// New agent with a `state_size → 64 → 32 → 10` Q-network (linear output, SGD).
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidHyperparameter`] if `config` fails validation or
    /// `state_size` is zero.
    pub fn new(state_size: usize, config: &RlConfig, rng: &mut SeededRng) -> Result<Self> {
        config.validate()?;
        let network_config = FeedForwardConfig {
            learning_rate: config.learning_rate,
            optimizer: OptimizerType::Sgd,
            output_activation: OutputActivation::Linear,
            ..FeedForwardConfig::new(state_size, Q_HIDDEN_LAYERS.to_vec(), ACTION_COUNT)
        };
        let q_network = FeedForwardNetwork::new(&network_config, rng)?;
        let target_network = q_network.clone();

        Ok(Self {
            state_size,
            config: config.clone(),
            epsilon: config.epsilon,
            q_network,
            target_network,
            replay: ReplayBuffer::new(config.replay_capacity)?,
            action_counts: vec![0; ACTION_COUNT],
            experiences_stored: 0,
        })
    }

    pub fn state_size(&self) -> usize {
        self.state_size
    }

    pub fn action_size(&self) -> usize {
        ACTION_COUNT
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn config(&self) -> &RlConfig {
        &self.config
    }

    /// How many times each action has been stored as taken.
    pub fn action_counts(&self) -> &[u64] {
        &self.action_counts
    }

    pub fn experiences_stored(&self) -> u64 {
        self.experiences_stored
    }

    pub fn replay_buffer(&self) -> &ReplayBuffer {
        &self.replay
    }

    pub fn q_network(&self) -> &FeedForwardNetwork {
        &self.q_network
    }

    pub fn q_network_mut(&mut self) -> &mut FeedForwardNetwork {
        &mut self.q_network
    }

    pub fn target_network(&self) -> &FeedForwardNetwork {
        &self.target_network
    }

    /// Catalogue entry for `index`; [`ActionType::Unknown`] when out of range.
    pub fn describe_action(&self, index: usize) -> ActionType {
        ActionType::from_index(index)
    }

    fn check_state(&self, context: &str, state: &[f64]) -> Result<()> {
        if state.len() != self.state_size {
            return Err(shape_mismatch(context, (1, self.state_size), (1, state.len())));
        }
        Ok(())
    }

    /// Online Q-values for `state`.
    pub fn q_values(&self, state: &[f64]) -> Result<Vec<f64>> {
        self.check_state("rl state", state)?;
        self.q_network.predict_one(state)
    }

    /// Epsilon-greedy action choice.
    ///
    /// With `explore` and probability `epsilon`, an action is drawn with
    /// probability proportional to `1 / (count + 1)`. Otherwise the action with the
    /// highest Q-value wins; with `explore` each Q-value first receives a bonus of
    /// `curiosity_weight / (count + 1)`.
    pub fn choose_action(&self, state: &[f64], explore: bool, rng: &mut SeededRng) -> Result<usize> {
        self.check_state("rl state", state)?;
        if explore && rng.chance(self.epsilon) {
            let weights: Vec<f64> = self.action_counts.iter().map(|&n| 1.0 / (n as f64 + 1.0)).collect();
            return Ok(match rng.weighted_index(&weights) {
                Some(index) => index,
                None => rng.gen_usize(ACTION_COUNT),
            });
        }

        let mut q_values = self.q_network.predict_one(state)?;
        if explore {
            for (q, &n) in q_values.iter_mut().zip(&self.action_counts) {
                *q += self.config.curiosity_weight / (n as f64 + 1.0);
            }
        }
        Ok(argmax(&q_values))
    }

    /// Record a transition and count the action as tried.
    ///
    /// # Errors
    ///
    /// [`EngineError::ShapeMismatch`] for a state of the wrong length or an action
    /// outside the catalogue.
    pub fn store_experience(
        &mut self,
        state: Vec<f64>,
        action: usize,
        reward: f64,
        next_state: Vec<f64>,
        done: bool,
    ) -> Result<()> {
        self.check_state("rl state", &state)?;
        self.check_state("rl next state", &next_state)?;
        if action >= ACTION_COUNT {
            return Err(EngineError::ShapeMismatch(format!(
                "action index {} outside 0..{}",
                action, ACTION_COUNT
            )));
        }
        if !reward.is_finite() {
            return Err(EngineError::NonFinite("rl reward".to_string()));
        }
        self.replay.push(Experience {
            state,
            action,
            reward,
            next_state,
            done,
        });
        self.action_counts[action] += 1;
        self.experiences_stored += 1;
        Ok(())
    }

    /// One replay step: sample a batch, fit the online network to the Bellman
    /// targets and decay epsilon.
    ///
    /// Returns `Ok(None)` and leaves everything untouched while the buffer holds
    /// fewer than `batch_size` experiences; otherwise the loss before the update.
    pub fn learn(&mut self, rng: &mut SeededRng) -> Result<Option<f64>> {
        let batch_size = self.config.batch_size;
        if self.replay.len() < batch_size {
            debug!(stored = self.replay.len(), batch_size, "skipping rl step, replay buffer too small");
            return Ok(None);
        }

        let batch = self.replay.sample(batch_size, rng)?;
        let states: Vec<Vec<f64>> = batch.iter().map(|e| e.state.clone()).collect();
        let next_states: Vec<Vec<f64>> = batch.iter().map(|e| e.next_state.clone()).collect();
        let states = stack_rows(&states, self.state_size)?;
        let next_states = stack_rows(&next_states, self.state_size)?;

        let mut targets = self.q_network.predict(&states)?;
        let next_q = self.target_network.predict(&next_states)?;
        for (i, experience) in batch.iter().enumerate() {
            targets[[i, experience.action]] = if experience.done {
                experience.reward
            } else {
                let best = next_q.row(i).iter().copied().fold(f64::NEG_INFINITY, f64::max);
                experience.reward + self.config.gamma * best
            };
        }

        let loss = self.q_network.train_batch(&states, &targets)?;
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
        debug!(loss, epsilon = self.epsilon, batch_size, "rl learn step");
        Ok(Some(loss))
    }

    /// Copy the online network's parameters into the target network.
    pub fn update_target_network(&mut self) -> Result<()> {
        self.target_network.copy_parameters_from(&self.q_network)?;
        debug!(stored = self.experiences_stored, "synced target network");
        Ok(())
    }

    /// Whether the stored-experience counter has just reached a sync point.
    pub fn target_sync_due(&self) -> bool {
        self.experiences_stored > 0 && self.experiences_stored % self.config.target_sync_interval == 0
    }

    pub fn to_document(&self) -> QAgentDocument {
        QAgentDocument {
            state_size: self.state_size,
            epsilon: self.epsilon,
            action_counts: self.action_counts.clone(),
            experiences_stored: self.experiences_stored,
            config: self.config.clone(),
            q_network: self.q_network.to_document(),
            replay_buffer: self.replay.most_recent(SAVED_EXPERIENCES).cloned().collect(),
        }
    }

    pub fn from_document(doc: QAgentDocument) -> Result<Self> {
        doc.config.validate()?;
        if !(0.0..=1.0).contains(&doc.epsilon) {
            return Err(EngineError::InvalidHyperparameter(format!(
                "epsilon must be in [0, 1], got {}",
                doc.epsilon
            )));
        }
        if doc.action_counts.len() != ACTION_COUNT {
            return Err(EngineError::SerializationError(format!(
                "expected {} action counts, found {}",
                ACTION_COUNT,
                doc.action_counts.len()
            )));
        }
        let q_network = FeedForwardNetwork::from_document(doc.q_network)?;
        if q_network.input_size() != doc.state_size || q_network.output_size() != ACTION_COUNT {
            return Err(shape_mismatch(
                "q-network topology",
                (doc.state_size, ACTION_COUNT),
                (q_network.input_size(), q_network.output_size()),
            ));
        }

        let mut agent = Self {
            state_size: doc.state_size,
            epsilon: doc.epsilon,
            target_network: q_network.clone(),
            q_network,
            replay: ReplayBuffer::new(doc.config.replay_capacity)?,
            config: doc.config,
            action_counts: doc.action_counts,
            experiences_stored: doc.experiences_stored,
        };
        for experience in doc.replay_buffer {
            agent.check_state("saved rl state", &experience.state)?;
            agent.check_state("saved rl next state", &experience.next_state)?;
            if experience.action >= ACTION_COUNT {
                return Err(EngineError::SerializationError(format!(
                    "saved action index {} outside 0..{}",
                    experience.action, ACTION_COUNT
                )));
            }
            agent.replay.push(experience);
        }
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::Optimizer;

    fn agent(config: RlConfig) -> QAgent {
        QAgent::new(4, &config, &mut SeededRng::new(5)).unwrap()
    }

    #[test]
    fn test_q_network_shape() {
        let agent = agent(RlConfig::default());
        assert_eq!(agent.q_network().layer_sizes(), &[4, 64, 32, 10]);
        assert_eq!(agent.q_network().output_activation(), OutputActivation::Linear);
        assert_eq!(agent.q_network().optimizer().name(), "sgd");
    }

    #[test]
    fn test_exploration_prefers_untried_actions() {
        let mut agent = agent(RlConfig::default());
        for _ in 0..50 {
            agent.store_experience(vec![0.0; 4], 0, 0.0, vec![0.0; 4], false).unwrap();
        }
        let mut rng = SeededRng::new(3);
        let picks = (0..200)
            .filter(|_| agent.choose_action(&[0.0; 4], true, &mut rng).unwrap() == 0)
            .count();
        // weight of action 0 is 1/51 against 1 for each of the nine others
        assert!(picks < 10);
    }

    #[test]
    fn test_greedy_choice_is_argmax() {
        let agent = agent(RlConfig::default());
        let state = [0.2, 0.4, 0.6, 0.8];
        let q = agent.q_values(&state).unwrap();
        let mut rng = SeededRng::new(1);
        assert_eq!(agent.choose_action(&state, false, &mut rng).unwrap(), argmax(&q));
    }

    #[test]
    fn test_learn_waits_for_a_full_batch() {
        let mut agent = agent(RlConfig {
            batch_size: 4,
            ..RlConfig::default()
        });
        let mut rng = SeededRng::new(2);
        for a in 0..3 {
            agent.store_experience(vec![0.1; 4], a, 1.0, vec![0.2; 4], false).unwrap();
        }
        assert_eq!(agent.learn(&mut rng).unwrap(), None);
        assert_eq!(agent.epsilon(), 1.0);

        agent.store_experience(vec![0.1; 4], 3, 1.0, vec![0.2; 4], true).unwrap();
        assert!(agent.learn(&mut rng).unwrap().is_some());
        assert!((agent.epsilon() - 0.995).abs() < 1e-12);
        assert_eq!(agent.q_network().optimizer().step_count(), 1);
    }

    #[test]
    fn test_rejects_bad_action() {
        let mut agent = agent(RlConfig::default());
        let err = agent.store_experience(vec![0.0; 4], ACTION_COUNT, 0.0, vec![0.0; 4], false);
        assert!(matches!(err, Err(EngineError::ShapeMismatch(_))));
        assert_eq!(agent.experiences_stored(), 0);
    }

    #[test]
    fn test_sync_cadence() {
        let mut agent = agent(RlConfig {
            target_sync_interval: 3,
            ..RlConfig::default()
        });
        let mut due = Vec::new();
        for _ in 0..6 {
            agent.store_experience(vec![0.0; 4], 1, 0.0, vec![0.0; 4], false).unwrap();
            due.push(agent.target_sync_due());
        }
        assert_eq!(due, vec![false, false, true, false, false, true]);
    }
}
