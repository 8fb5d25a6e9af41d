use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::control::policy::{
    DecisionPolicy, PolicyEvent, PolicyKind, Signals, UpdateReason, WindowUpdate,
};
use crate::control::state_mapper::{
    Bucket, CongestionState, StateMapper, Thresholds, NUM_CONGESTION_STATES,
};
use crate::error::{ConfigError, EngineError};

use super::engine::{BootstrapMode, RlEngine, RlEngineConfig};
use super::reward::{RewardFunction, ScoreTable};

/// How a chosen action becomes a window size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", rename_all_fields = "kebab-case", tag = "type")]
pub enum ActionMapping {
    /// `max_window * action / num_actions`, floored to the minimum window.
    Linear { max_window: f64 },
    /// `windows[action]`; must hold one entry per action.
    Lookup { windows: Vec<f64> },
}

impl ActionMapping {
    pub fn window_for(&self, action: usize, num_actions: usize, min_window: f64) -> f64 {
        let window = match self {
            Self::Linear { max_window } => max_window * action as f64 / num_actions.max(1) as f64,
            Self::Lookup { windows } => windows
                .get(action)
                .or(windows.last())
                .copied()
                .unwrap_or(min_window),
        };
        window.max(min_window)
    }

    fn validate(&self, num_actions: usize) -> Result<(), ConfigError> {
        match self {
            Self::Linear { max_window } if !(max_window.is_finite() && *max_window > 0.0) => {
                Err(ConfigError::InvalidParameter {
                    name: "learning.mapping.max-window",
                    value: *max_window,
                })
            }
            Self::Linear { .. } => Ok(()),
            Self::Lookup { windows } if windows.len() != num_actions => {
                Err(ConfigError::InvalidParameter {
                    name: "learning.mapping.windows",
                    value: windows.len() as f64,
                })
            }
            Self::Lookup { windows } => match windows.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
                Some(bad) => Err(ConfigError::InvalidParameter {
                    name: "learning.mapping.windows",
                    value: *bad,
                }),
                None => Ok(()),
            },
        }
    }
}

/// A construction-time bias: `Q[state][action]` starts at the seed value and
/// every other entry in the row at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredAction {
    pub state: usize,
    pub action: usize,
}

impl PreferredAction {
    pub fn new(throughput: Bucket, delay: Bucket, action: usize) -> Self {
        Self {
            state: CongestionState::new(throughput, delay).index(),
            action,
        }
    }
}

/// Configuration for the learning policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LearningConfig {
    pub mapper: StateMapper,
    pub reward: RewardFunction,
    pub mapping: ActionMapping,
    pub engine: RlEngineConfig,
    pub preferred_actions: Vec<PreferredAction>,
    pub preferred_value: f64,
    /// The smoothed RTT is divided by this before discretization, turning it
    /// into a one-way delay estimate.
    pub delay_divisor: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        use Bucket::{High, Low, Med};
        Self {
            mapper: StateMapper::new(Thresholds::new(300.0, 500.0), Thresholds::new(80.0, 200.0)),
            reward: RewardFunction::Table(ScoreTable::BALANCED),
            mapping: ActionMapping::Linear { max_window: 30.0 },
            engine: RlEngineConfig::default(),
            preferred_actions: vec![
                PreferredAction::new(Low, Low, 7),
                PreferredAction::new(Low, Med, 4),
                PreferredAction::new(Low, High, 2),
                PreferredAction::new(Med, Low, 6),
                PreferredAction::new(Med, Med, 4),
                PreferredAction::new(Med, High, 1),
                PreferredAction::new(High, Low, 3),
                PreferredAction::new(High, Med, 2),
                PreferredAction::new(High, High, 8),
            ],
            preferred_value: 900.0,
            delay_divisor: 2.0,
        }
    }
}

impl LearningConfig {
    /// SARSA variant: a fixed window ladder up to 40 and a steeper reward for
    /// good states.
    pub fn sarsa() -> Self {
        use Bucket::{High, Low};
        Self {
            mapper: StateMapper::new(Thresholds::new(200.0, 400.0), Thresholds::new(130.0, 200.0)),
            reward: RewardFunction::Table(ScoreTable::THROUGHPUT_HEAVY),
            mapping: ActionMapping::Lookup {
                windows: vec![1.0, 3.0, 7.0, 10.0, 12.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0],
            },
            engine: RlEngineConfig {
                num_actions: 11,
                epsilon: 0.2,
                bootstrap: BootstrapMode::OnPolicy,
                ..RlEngineConfig::default()
            },
            preferred_actions: vec![
                PreferredAction::new(Low, Low, 8),
                PreferredAction::new(Low, High, 4),
                PreferredAction::new(High, High, 5),
            ],
            preferred_value: 10.0,
            delay_divisor: 2.0,
        }
    }

    /// Unseeded learner rewarded by throughput over RTT.
    pub fn power() -> Self {
        Self {
            mapper: StateMapper::new(Thresholds::new(200.0, 400.0), Thresholds::new(80.0, 200.0)),
            reward: RewardFunction::Power,
            mapping: ActionMapping::Lookup {
                windows: vec![1.0, 3.0, 4.0, 5.0, 9.0, 12.0, 15.0, 18.0, 21.0, 23.0, 24.0],
            },
            engine: RlEngineConfig {
                num_actions: 11,
                epsilon: 0.2,
                ..RlEngineConfig::default()
            },
            preferred_actions: Vec::new(),
            preferred_value: 0.0,
            delay_divisor: 2.0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mapper.validate()?;
        self.engine.validate()?;
        if self.engine.num_states != NUM_CONGESTION_STATES {
            return Err(EngineError::InvalidDimensions {
                num_states: self.engine.num_states,
                num_actions: self.engine.num_actions,
            }
            .into());
        }
        self.mapping.validate(self.engine.num_actions)?;
        self.reward.validate(self.engine.num_states, self.engine.num_actions)?;
        if !(self.delay_divisor.is_finite() && self.delay_divisor > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "learning.delay-divisor",
                value: self.delay_divisor,
            });
        }
        if !self.preferred_value.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "learning.preferred-value",
                value: self.preferred_value,
            });
        }
        let (num_states, num_actions) = (self.engine.num_states, self.engine.num_actions);
        if let Some(p) = self
            .preferred_actions
            .iter()
            .find(|p| p.state >= num_states || p.action >= num_actions)
        {
            return Err(EngineError::InvalidPreference {
                state: p.state,
                action: p.action,
                num_states,
                num_actions,
            }
            .into());
        }
        Ok(())
    }
}

/// Lifecycle of the learning policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningPhase {
    /// No RTT sample yet; epoch boundaries are ignored.
    Init,
    /// RTT known; the next boundary picks the first action without learning.
    Warm,
    /// Every boundary learns from the previous (state, action) and acts again.
    Active,
}

/// Reinforcement-learning policy acting once per epoch.
#[derive(Debug, Clone)]
pub struct LearningPolicy {
    config: LearningConfig,
    engine: RlEngine,
    phase: LearningPhase,
    last: Option<(usize, usize)>,
    last_reward: Option<f64>,
    epochs: u64,
}

impl LearningPolicy {
    pub fn new(config: LearningConfig, rng: SmallRng) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut engine = RlEngine::new(config.engine, rng)?;
        for preferred in &config.preferred_actions {
            engine.prefer_action(preferred.state, preferred.action, config.preferred_value)?;
        }
        Ok(Self {
            config,
            engine,
            phase: LearningPhase::Init,
            last: None,
            last_reward: None,
            epochs: 0,
        })
    }

    pub fn phase(&self) -> LearningPhase {
        self.phase
    }

    pub fn engine(&self) -> &RlEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RlEngine {
        &mut self.engine
    }

    /// The (state, action) pair awaiting its reward.
    pub fn last_pair(&self) -> Option<(usize, usize)> {
        self.last
    }

    pub fn last_reward(&self) -> Option<f64> {
        self.last_reward
    }

    /// Number of epochs on which an action was chosen.
    pub fn epochs(&self) -> u64 {
        self.epochs
    }

    fn on_epoch(&mut self, signals: &Signals) -> WindowUpdate {
        if self.phase == LearningPhase::Init {
            return WindowUpdate::Unchanged;
        }
        let (Some(rtt_ms), Some(throughput)) =
            (signals.smoothed_rtt_ms, signals.smoothed_throughput)
        else {
            return WindowUpdate::Unchanged;
        };

        let congestion = self
            .config
            .mapper
            .state(throughput, rtt_ms / self.config.delay_divisor);
        let state = congestion.index();

        let action = match (self.phase, self.last) {
            (LearningPhase::Active, Some((prev_state, prev_action))) => {
                let reward = self.config.reward.reward(
                    (prev_state, prev_action),
                    congestion,
                    throughput,
                    rtt_ms,
                );
                self.last_reward = Some(reward);
                if self.engine.config().bootstrap == BootstrapMode::OnPolicy {
                    let action = self.engine.act_eps_greedily(state);
                    self.engine
                        .update_on_policy(prev_state, prev_action, reward, state, action);
                    action
                } else {
                    self.engine
                        .update_with_reward(prev_state, prev_action, state, reward);
                    self.engine.act_eps_greedily(state)
                }
            }
            _ => {
                debug!(state, "first epoch with RTT estimate, learning starts");
                self.phase = LearningPhase::Active;
                self.engine.act_eps_greedily(state)
            }
        };

        self.last = Some((state, action));
        self.epochs += 1;

        let window =
            self.config
                .mapping
                .window_for(action, self.engine.num_actions(), signals.min_window);
        debug!(
            state,
            action,
            throughput,
            delay_ms = rtt_ms / self.config.delay_divisor,
            reward = ?self.last_reward,
            window,
            "epoch decision"
        );
        WindowUpdate::resize(window, UpdateReason::Action(action))
    }
}

impl DecisionPolicy for LearningPolicy {
    fn decide(&mut self, event: &PolicyEvent, signals: &Signals) -> WindowUpdate {
        match event {
            PolicyEvent::Ack { .. } => {
                if self.phase == LearningPhase::Init {
                    self.phase = LearningPhase::Warm;
                }
                WindowUpdate::Unchanged
            }
            // Delay already shapes the reward.
            PolicyEvent::Timeout { .. } => WindowUpdate::Unchanged,
            PolicyEvent::EpochBoundary => self.on_epoch(signals),
        }
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Learning
    }
}
