//! Goal planner: a thin policy layer over [`QAgent`].
//!
//! The planner keeps a high-level goal derived from the creature's needs and
//! re-evaluates it once more than ten decisions have passed. Actions themselves
//! come from the agent.

use crate::error::Result;
use crate::rl::{shape_reward, ActionType, NeedsSnapshot, QAgent, QAgentDocument};
use crate::utils::SeededRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Decisions between two goal re-evaluations.
const GOAL_REFRESH_STEPS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    SeekFood,
    Rest,
    SeekInteraction,
    Play,
    Explore,
}

impl Goal {
    /// Highest-priority goal for the given needs.
    pub fn select(needs: &NeedsSnapshot, player_nearby: bool) -> Goal {
        if needs.hunger > 70.0 {
            Goal::SeekFood
        } else if needs.energy < 25.0 {
            Goal::Rest
        } else if needs.happiness < 40.0 {
            Goal::SeekInteraction
        } else if player_nearby {
            Goal::Play
        } else {
            Goal::Explore
        }
    }
}

/// Action proposed by [`GoalPlanner::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalDecision {
    pub action_index: usize,
    pub action: ActionType,
    /// `None` until the first re-evaluation.
    pub goal: Option<Goal>,
}

/// What one [`GoalPlanner::learn_from_outcome`] call did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearnReport {
    pub reward: f64,
    /// Loss of the replay step, `None` when the buffer was still too small.
    pub loss: Option<f64>,
    pub target_synced: bool,
}

#[derive(Debug, Clone)]
pub struct GoalPlanner {
    agent: QAgent,
    current_goal: Option<Goal>,
    steps_since_goal_update: u32,
}

impl GoalPlanner {
    pub fn new(agent: QAgent) -> Self {
        Self {
            agent,
            current_goal: None,
            steps_since_goal_update: 0,
        }
    }

    pub fn agent(&self) -> &QAgent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut QAgent {
        &mut self.agent
    }

    pub fn current_goal(&self) -> Option<Goal> {
        self.current_goal
    }

    /// Choose an action for `state` and refresh the goal when due.
    pub fn execute(
        &mut self,
        state: &[f64],
        needs: &NeedsSnapshot,
        player_nearby: bool,
        rng: &mut SeededRng,
    ) -> Result<GoalDecision> {
        let action_index = self.agent.choose_action(state, true, rng)?;
        self.steps_since_goal_update += 1;
        if self.steps_since_goal_update > GOAL_REFRESH_STEPS {
            let goal = Goal::select(needs, player_nearby);
            debug!(?goal, "goal re-evaluated");
            self.current_goal = Some(goal);
            self.steps_since_goal_update = 0;
        }
        Ok(GoalDecision {
            action_index,
            action: ActionType::from_index(action_index),
            goal: self.current_goal,
        })
    }

    /// Shape the reward, store the transition, run a replay step and sync the
    /// target network when the schedule says so.
    ///
    /// The transition is terminal when `after.alive` is false.
    pub fn learn_from_outcome(
        &mut self,
        state_before: Vec<f64>,
        action_index: usize,
        state_after: Vec<f64>,
        before: &NeedsSnapshot,
        after: &NeedsSnapshot,
        rng: &mut SeededRng,
    ) -> Result<LearnReport> {
        let action = ActionType::from_index(action_index);
        let tried = self.agent.action_counts().get(action_index).copied().unwrap_or(0);
        let reward = shape_reward(before, after, action, tried);

        self.agent
            .store_experience(state_before, action_index, reward, state_after, !after.alive)?;
        let loss = self.agent.learn(rng)?;
        let target_synced = self.agent.target_sync_due();
        if target_synced {
            self.agent.update_target_network()?;
        }
        Ok(LearnReport {
            reward,
            loss,
            target_synced,
        })
    }

    pub fn to_document(&self) -> QAgentDocument {
        self.agent.to_document()
    }

    pub fn from_document(doc: QAgentDocument) -> Result<Self> {
        Ok(Self::new(QAgent::from_document(doc)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RlConfig;

    #[test]
    fn test_goal_priority() {
        let hungry_and_tired = NeedsSnapshot {
            hunger: 80.0,
            energy: 10.0,
            ..NeedsSnapshot::default()
        };
        assert_eq!(Goal::select(&hungry_and_tired, true), Goal::SeekFood);

        let content = NeedsSnapshot::default();
        assert_eq!(Goal::select(&content, true), Goal::Play);
        assert_eq!(Goal::select(&content, false), Goal::Explore);
    }

    #[test]
    fn test_goal_set_after_eleven_steps() {
        let mut rng = SeededRng::new(8);
        let agent = QAgent::new(3, &RlConfig::default(), &mut rng).unwrap();
        let mut planner = GoalPlanner::new(agent);
        let needs = NeedsSnapshot {
            energy: 10.0,
            ..NeedsSnapshot::default()
        };
        for _ in 0..10 {
            let decision = planner.execute(&[0.0; 3], &needs, false, &mut rng).unwrap();
            assert_eq!(decision.goal, None);
        }
        let decision = planner.execute(&[0.0; 3], &needs, false, &mut rng).unwrap();
        assert_eq!(decision.goal, Some(Goal::Rest));
        assert_eq!(decision.action, ActionType::from_index(decision.action_index));
    }

    #[test]
    fn test_death_is_terminal() {
        let mut rng = SeededRng::new(8);
        let agent = QAgent::new(2, &RlConfig::default(), &mut rng).unwrap();
        let mut planner = GoalPlanner::new(agent);
        let before = NeedsSnapshot::default();
        let after = NeedsSnapshot {
            alive: false,
            ..before
        };
        let report = planner
            .learn_from_outcome(vec![0.0; 2], 1, vec![0.0; 2], &before, &after, &mut rng)
            .unwrap();
        assert!(report.reward < -40.0);
        assert_eq!(report.loss, None);
        let stored = planner.agent().replay_buffer().iter().next().unwrap();
        assert!(stored.done);
    }
}
