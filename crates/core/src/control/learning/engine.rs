use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::control::state_mapper::NUM_CONGESTION_STATES;
use crate::error::EngineError;

use super::table::ActionValueTable;

/// Which next-state value the temporal-difference target bootstraps from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapMode {
    /// Draw a fresh epsilon-greedy action for the next state and use its value.
    /// The drawn action is discarded.
    #[default]
    Resampled,
    /// Use the action actually selected for the next state (SARSA).
    OnPolicy,
    /// Use `max_a Q[s'][a]` (Q-learning).
    Greedy,
}

/// Parameters of a tabular learning engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RlEngineConfig {
    pub num_states: usize,
    pub num_actions: usize,
    /// Learning rate, in `(0, 1]`.
    pub alpha: f64,
    /// Exploration probability, in `[0, 1]`.
    pub epsilon: f64,
    /// Discount factor, in `[0, 1]`.
    pub gamma: f64,
    /// Log every decision and update at `debug` level.
    pub verbose: bool,
    pub bootstrap: BootstrapMode,
}

impl Default for RlEngineConfig {
    fn default() -> Self {
        Self {
            num_states: NUM_CONGESTION_STATES,
            num_actions: 9,
            alpha: 0.4,
            epsilon: 0.05,
            gamma: 0.9,
            verbose: false,
            bootstrap: BootstrapMode::Resampled,
        }
    }
}

impl RlEngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.num_states == 0 || self.num_actions == 0 {
            return Err(EngineError::InvalidDimensions {
                num_states: self.num_states,
                num_actions: self.num_actions,
            });
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(EngineError::InvalidParameter {
                name: "alpha",
                value: self.alpha,
            });
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(EngineError::InvalidParameter {
                name: "epsilon",
                value: self.epsilon,
            });
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(EngineError::InvalidParameter {
                name: "gamma",
                value: self.gamma,
            });
        }
        Ok(())
    }
}

/// Tabular temporal-difference learner with epsilon-greedy action selection.
///
/// The engine owns its random source so that two engines built from the same
/// seed make identical choices.
#[derive(Debug, Clone)]
pub struct RlEngine {
    config: RlEngineConfig,
    table: ActionValueTable,
    rng: SmallRng,
}

impl RlEngine {
    pub fn new(config: RlEngineConfig, rng: SmallRng) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            table: ActionValueTable::zeros(config.num_states, config.num_actions),
            config,
            rng,
        })
    }

    pub fn with_seed(config: RlEngineConfig, seed: u64) -> Result<Self, EngineError> {
        Self::new(config, SmallRng::seed_from_u64(seed))
    }

    pub fn config(&self) -> &RlEngineConfig {
        &self.config
    }

    pub fn num_states(&self) -> usize {
        self.config.num_states
    }

    pub fn num_actions(&self) -> usize {
        self.config.num_actions
    }

    pub fn epsilon(&self) -> f64 {
        self.config.epsilon
    }

    /// Change the exploration rate, e.g. to 0 for evaluation runs.
    pub fn set_epsilon(&mut self, epsilon: f64) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(EngineError::InvalidParameter {
                name: "epsilon",
                value: epsilon,
            });
        }
        self.config.epsilon = epsilon;
        Ok(())
    }

    pub fn table(&self) -> &ActionValueTable {
        &self.table
    }

    pub fn value(&self, state: usize, action: usize) -> f64 {
        self.table.get(state, action)
    }

    pub fn row(&self, state: usize) -> &[f64] {
        self.table.row(state)
    }

    /// Highest-valued action for `state`, lowest index on ties.
    pub fn act_greedily(&self, state: usize) -> usize {
        let action = self.table.argmax(state);
        if self.config.verbose {
            debug!(
                state,
                action,
                value = self.table.get(state, action),
                "greedy action"
            );
        }
        action
    }

    /// With probability `epsilon` a uniformly random action, otherwise greedy.
    pub fn act_eps_greedily(&mut self, state: usize) -> usize {
        if self.rng.gen::<f64>() < self.config.epsilon {
            let action = self.rng.gen_range(0..self.config.num_actions);
            if self.config.verbose {
                debug!(state, action, "exploratory action");
            }
            action
        } else {
            self.act_greedily(state)
        }
    }

    /// Temporal-difference update of `Q[state][action]`.
    ///
    /// The bootstrap value comes from the configured [`BootstrapMode`]; in
    /// `OnPolicy` mode, where no next action is known here, a resampled action
    /// is used. Callers that track the next action use
    /// [`update_on_policy`](Self::update_on_policy).
    pub fn update_with_reward(
        &mut self,
        state: usize,
        action: usize,
        next_state: usize,
        reward: f64,
    ) {
        let bootstrap = match self.config.bootstrap {
            BootstrapMode::Greedy => self.table.max(next_state),
            BootstrapMode::Resampled | BootstrapMode::OnPolicy => {
                let sampled = self.act_eps_greedily(next_state);
                self.table.get(next_state, sampled)
            }
        };
        self.apply_update(state, action, reward, bootstrap);
    }

    /// SARSA update using the action already chosen for `next_state`.
    pub fn update_on_policy(
        &mut self,
        state: usize,
        action: usize,
        reward: f64,
        next_state: usize,
        next_action: usize,
    ) {
        let bootstrap = self.table.get(next_state, next_action);
        self.apply_update(state, action, reward, bootstrap);
    }

    fn apply_update(&mut self, state: usize, action: usize, reward: f64, bootstrap: f64) {
        let old = self.table.get(state, action);
        let updated = old + self.config.alpha * (reward + self.config.gamma * bootstrap - old);
        self.table.set(state, action, updated);
        if self.config.verbose {
            debug!(state, action, reward, old, updated, "value update");
        }
    }

    /// Zero `state`'s row, then set `Q[state][action] = value`.
    ///
    /// Meant for seeding the table before the engine starts acting.
    pub fn prefer_action(
        &mut self,
        state: usize,
        action: usize,
        value: f64,
    ) -> Result<(), EngineError> {
        if state >= self.config.num_states || action >= self.config.num_actions {
            return Err(EngineError::InvalidPreference {
                state,
                action,
                num_states: self.config.num_states,
                num_actions: self.config.num_actions,
            });
        }
        if !value.is_finite() {
            return Err(EngineError::InvalidParameter {
                name: "preferred value",
                value,
            });
        }
        self.table.row_mut(state).fill(0.0);
        self.table.set(state, action, value);
        Ok(())
    }
}
