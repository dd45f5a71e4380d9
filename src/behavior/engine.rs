//! The behavior facade.
//!
//! [`BehaviorEngine`] hides the tier behind two calls, `choose_action` and
//! `learn_from_outcome`, and owns the random number generator every stochastic
//! step draws from.

use crate::config::{Complexity, EngineConfig};
use crate::error::{EngineError, Result};
use crate::network::{FeedForwardDocument, LstmDocument};
use crate::utils::SeededRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::coordinator::{CoordinatorDocument, NetworkCoordinator};
use super::decision::{BehaviorAction, BehaviorDecision, LearningSummary, Outcome};
use super::state::{Activity, CreatureState};
use super::tiers::{RecurrentLearner, SimpleLearner};

/// Interaction records kept when history is enabled.
pub const HISTORY_LIMIT: usize = 100;

/// Full-tier enjoyment for an outcome that only says whether the activity was enjoyed.
const ENJOYED: f64 = 1.0;
const NOT_ENJOYED: f64 = 0.3;

/// One learned interaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub interaction: u64,
    pub activity: Activity,
    pub enjoyed: bool,
}

/// Serialized models of the active tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "lowercase")]
pub enum TierDocument {
    Simple { network: FeedForwardDocument },
    Recurrent { network: LstmDocument },
    Full(Box<CoordinatorDocument>),
}

impl TierDocument {
    pub fn complexity(&self) -> Complexity {
        match self {
            TierDocument::Simple { .. } => Complexity::Simple,
            TierDocument::Recurrent { .. } => Complexity::Recurrent,
            TierDocument::Full(_) => Complexity::Full,
        }
    }
}

/// Serialized form of a [`BehaviorEngine`].
///
/// The random number generator is not saved; a loaded engine reseeds from
/// `config.seed + total_interactions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineDocument {
    pub config: EngineConfig,
    pub total_interactions: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<InteractionRecord>,
    pub model: TierDocument,
}

#[derive(Debug, Clone)]
enum TierModel {
    Simple(SimpleLearner),
    Recurrent(RecurrentLearner),
    Full(Box<NetworkCoordinator>),
}

/// Single entry point for deciding and learning, whatever the tier.
///
/// # Example
///
/// ```
/// use neuropet::behavior::{BehaviorEngine, CreatureState, Outcome};
/// use neuropet::config::{Complexity, EngineConfig};
///
/// let config = EngineConfig {
///     complexity: Complexity::Simple,
///     ..EngineConfig::default()
/// };
/// let mut engine = BehaviorEngine::new(config).unwrap();
/// let state = CreatureState::default();
///
/// let decision = engine.choose_action(&state).unwrap();
/// engine
///     .learn_from_outcome(&state, &decision.action(), &Outcome::enjoyed(true))
///     .unwrap();
/// assert_eq!(engine.total_interactions(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct BehaviorEngine {
    config: EngineConfig,
    rng: SeededRng,
    model: TierModel,
    total_interactions: u64,
    history: VecDeque<InteractionRecord>,
}

impl BehaviorEngine {
    /// Build the networks of the configured tier.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidHyperparameter`] if the configuration is invalid.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = SeededRng::new(config.seed);
        let model = match config.complexity {
            Complexity::Simple => TierModel::Simple(SimpleLearner::new(&mut rng)?),
            Complexity::Recurrent => TierModel::Recurrent(RecurrentLearner::new(
                config.sensory_size,
                config.learning_rate,
                &mut rng,
            )?),
            Complexity::Full => TierModel::Full(Box::new(NetworkCoordinator::new(&config, &mut rng)?)),
        };
        info!(
            tier = ?config.complexity,
            seed = config.seed,
            sensory_size = config.sensory_size,
            "behavior engine ready"
        );
        Ok(Self {
            config,
            rng,
            model,
            total_interactions: 0,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
        })
    }

    pub fn tier(&self) -> Complexity {
        self.config.complexity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn total_interactions(&self) -> u64 {
        self.total_interactions
    }

    /// Recorded interactions, oldest first; empty unless `record_history` is set.
    pub fn history(&self) -> &VecDeque<InteractionRecord> {
        &self.history
    }

    /// The full-tier coordinator, if this engine runs that tier.
    pub fn coordinator(&self) -> Option<&NetworkCoordinator> {
        match &self.model {
            TierModel::Full(coordinator) => Some(coordinator),
            _ => None,
        }
    }

    pub fn choose_action(&mut self, state: &CreatureState) -> Result<BehaviorDecision> {
        match &mut self.model {
            TierModel::Simple(learner) => Ok(BehaviorDecision::activity_only(learner.best_activity(state)?)),
            TierModel::Recurrent(learner) => Ok(BehaviorDecision::activity_only(learner.choose_activity(state)?)),
            TierModel::Full(coordinator) => coordinator.decide_behavior(state, &mut self.rng),
        }
    }

    /// Learn from what happened after `action` was taken in `state`.
    ///
    /// The simple and recurrent tiers read only `outcome.enjoyed`. The full tier
    /// passes the whole outcome to the coordinator, with enjoyment defaulting to
    /// `1.0` when enjoyed and `0.3` otherwise.
    pub fn learn_from_outcome(
        &mut self,
        state: &CreatureState,
        action: &BehaviorAction,
        outcome: &Outcome,
    ) -> Result<LearningSummary> {
        let summary = match &mut self.model {
            TierModel::Simple(learner) => LearningSummary {
                activity_loss: Some(learner.learn_from_interaction(state, action.activity, outcome.enjoyed)?),
                ..LearningSummary::default()
            },
            TierModel::Recurrent(learner) => LearningSummary {
                activity_loss: learner.learn_from_interaction(state, action.activity, outcome.enjoyed)?,
                ..LearningSummary::default()
            },
            TierModel::Full(coordinator) => {
                let mut outcome = outcome.clone();
                if outcome.enjoyment.is_none() {
                    outcome.enjoyment = Some(if outcome.enjoyed { ENJOYED } else { NOT_ENJOYED });
                }
                coordinator.learn_from_outcome(state, action, &outcome, &mut self.rng)?
            }
        };

        self.total_interactions += 1;
        if self.config.record_history {
            if self.history.len() >= HISTORY_LIMIT {
                self.history.pop_front();
            }
            self.history.push_back(InteractionRecord {
                interaction: self.total_interactions,
                activity: action.activity,
                enjoyed: outcome.enjoyed,
            });
        }
        debug!(
            interaction = self.total_interactions,
            activity = action.activity.as_str(),
            enjoyed = outcome.enjoyed,
            "learned from outcome"
        );
        Ok(summary)
    }

    pub fn to_document(&self) -> EngineDocument {
        let model = match &self.model {
            TierModel::Simple(learner) => TierDocument::Simple {
                network: learner.to_document(),
            },
            TierModel::Recurrent(learner) => TierDocument::Recurrent {
                network: learner.to_document(),
            },
            TierModel::Full(coordinator) => TierDocument::Full(Box::new(coordinator.to_document())),
        };
        EngineDocument {
            config: self.config.clone(),
            total_interactions: self.total_interactions,
            history: self.history.iter().copied().collect(),
            model,
        }
    }

    /// # Errors
    ///
    /// [`EngineError::SerializationError`] if the saved tier differs from the
    /// configured one, or any error raised while rebuilding the networks.
    pub fn from_document(doc: EngineDocument) -> Result<Self> {
        doc.config.validate()?;
        if doc.model.complexity() != doc.config.complexity {
            return Err(EngineError::SerializationError(format!(
                "config selects the {:?} tier but the document holds {:?} models",
                doc.config.complexity,
                doc.model.complexity()
            )));
        }
        let model = match doc.model {
            TierDocument::Simple { network } => TierModel::Simple(SimpleLearner::from_document(network)?),
            TierDocument::Recurrent { network } => {
                TierModel::Recurrent(RecurrentLearner::from_document(network, doc.config.sensory_size)?)
            }
            TierDocument::Full(coordinator) => {
                let coordinator = NetworkCoordinator::from_document(*coordinator)?;
                if coordinator.sensory_size() != doc.config.sensory_size {
                    return Err(EngineError::SerializationError(format!(
                        "config sensory size {} does not match the saved coordinator's {}",
                        doc.config.sensory_size,
                        coordinator.sensory_size()
                    )));
                }
                TierModel::Full(Box::new(coordinator))
            }
        };
        let mut history = VecDeque::from(doc.history);
        while history.len() > HISTORY_LIMIT {
            history.pop_front();
        }
        Ok(Self {
            rng: SeededRng::new(doc.config.seed.wrapping_add(doc.total_interactions)),
            config: doc.config,
            model,
            total_interactions: doc.total_interactions,
            history,
        })
    }

    /// Write the engine document as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.to_document())?;
        fs::write(path.as_ref(), json)?;
        info!(
            path = %path.as_ref().display(),
            tier = ?self.tier(),
            interactions = self.total_interactions,
            "saved behavior engine"
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let engine = Self::from_document(serde_json::from_str(&text)?)?;
        info!(
            path = %path.as_ref().display(),
            tier = ?engine.tier(),
            interactions = engine.total_interactions,
            "loaded behavior engine"
        );
        Ok(engine)
    }
}
