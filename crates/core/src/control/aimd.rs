//! Additive-increase / multiplicative-decrease policy.
//!
//! Each ack whose transit time is under the retransmission timeout grows the
//! window by `gain / cwnd`, where `gain` creeps up by `gain_step` on every
//! increase. Slow acks and timeouts divide the window, at most once per
//! cool-down interval, and reset `gain` to its baseline.
//!
//! With `spike` configured the policy also reacts to RTT samples that jump
//! well above the smoothed RTT: a moderate spike cuts the window in proportion
//! to the jump, and an outage-sized spike collapses it to the minimum.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

use super::policy::{
    additive_increase, timeout_divisor, DecisionPolicy, DecreaseGate, PolicyEvent, PolicyKind,
    Signals, UpdateReason, WindowUpdate,
};

/// Delay-spike reaction thresholds, as multiples of the smoothed RTT.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SpikeConfig {
    /// Above this ratio the window is divided by `ratio * decrease_factor`.
    pub decrease_ratio: f64,
    /// Above this ratio the window collapses to the minimum.
    pub outage_ratio: f64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            decrease_ratio: 2.0,
            outage_ratio: 4.0,
        }
    }
}

/// Configuration for the AIMD policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AimdConfig {
    /// Baseline additive-increase gain.
    pub increase_gain: f64,
    /// Amount added to the gain after every increase step.
    pub gain_step: f64,
    /// Divisor applied on a decrease.
    pub decrease_factor: f64,
    /// Minimum interval between applied decreases.
    pub cool_down_ms: u64,
    /// Optional delay-spike reaction.
    pub spike: Option<SpikeConfig>,
    /// Divide by the purge severity instead of `decrease_factor` on a timeout
    /// when the severity is larger.
    pub scale_by_severity: bool,
}

impl Default for AimdConfig {
    fn default() -> Self {
        Self {
            increase_gain: 1.0,
            gain_step: 0.001,
            decrease_factor: 2.0,
            cool_down_ms: 200,
            spike: None,
            scale_by_severity: false,
        }
    }
}

impl AimdConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.increase_gain.is_finite() && self.increase_gain > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "aimd.increase-gain",
                value: self.increase_gain,
            });
        }
        if !(self.gain_step.is_finite() && self.gain_step >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "aimd.gain-step",
                value: self.gain_step,
            });
        }
        if !(self.decrease_factor.is_finite() && self.decrease_factor > 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "aimd.decrease-factor",
                value: self.decrease_factor,
            });
        }
        if let Some(spike) = self.spike {
            if !(spike.decrease_ratio.is_finite()
                && spike.decrease_ratio > 1.0
                && spike.outage_ratio >= spike.decrease_ratio)
            {
                return Err(ConfigError::InvalidParameter {
                    name: "aimd.spike.decrease-ratio",
                    value: spike.decrease_ratio,
                });
            }
        }
        Ok(())
    }
}

/// AIMD policy state.
#[derive(Debug, Clone)]
pub struct AimdPolicy {
    config: AimdConfig,
    gain: f64,
    gate: DecreaseGate,
}

impl AimdPolicy {
    pub fn new(config: AimdConfig) -> Self {
        Self {
            gain: config.increase_gain,
            gate: DecreaseGate::new(config.cool_down_ms),
            config,
        }
    }

    /// Current additive-increase gain.
    pub fn gain(&self) -> f64 {
        self.gain
    }

    fn increase(&mut self, signals: &Signals) -> WindowUpdate {
        self.gain += self.config.gain_step;
        WindowUpdate::resize(
            additive_increase(signals.cwnd, self.gain),
            UpdateReason::AdditiveIncrease,
        )
    }

    fn decrease(&mut self, divisor: f64, signals: &Signals) -> WindowUpdate {
        self.gain = self.config.increase_gain;
        if !self.gate.try_acquire(signals.now_ms) {
            return WindowUpdate::Unchanged;
        }
        let cwnd = (signals.cwnd / divisor).max(signals.min_window);
        debug!(divisor, from = signals.cwnd, to = cwnd, "AIMD decrease");
        WindowUpdate::resize(cwnd, UpdateReason::MultiplicativeDecrease)
    }

    fn react_to_spike(
        &mut self,
        rtt_ms: f64,
        baseline_rtt_ms: Option<f64>,
        signals: &Signals,
    ) -> Option<WindowUpdate> {
        let spike = self.config.spike?;
        let baseline = baseline_rtt_ms.filter(|b| *b > 0.0)?;
        let ratio = rtt_ms / baseline;
        if ratio > spike.outage_ratio {
            debug!(ratio, rtt_ms, baseline, "outage detected, collapsing window");
            self.gain = self.config.increase_gain;
            self.gate.try_acquire(signals.now_ms);
            return Some(WindowUpdate::resize(
                signals.min_window,
                UpdateReason::Outage,
            ));
        }
        if ratio > spike.decrease_ratio {
            return Some(self.decrease(ratio * self.config.decrease_factor, signals));
        }
        None
    }
}

impl DecisionPolicy for AimdPolicy {
    fn decide(&mut self, event: &PolicyEvent, signals: &Signals) -> WindowUpdate {
        match *event {
            PolicyEvent::Ack {
                rtt_ms,
                transit_ms,
                baseline_rtt_ms,
            } => {
                if let Some(update) = self.react_to_spike(rtt_ms, baseline_rtt_ms, signals) {
                    return update;
                }
                if transit_ms < signals.timeout_ms as f64 {
                    self.increase(signals)
                } else {
                    self.decrease(self.config.decrease_factor, signals)
                }
            }
            PolicyEvent::Timeout { severity } => {
                let divisor = timeout_divisor(
                    self.config.decrease_factor,
                    severity,
                    self.config.scale_by_severity,
                );
                self.decrease(divisor, signals)
            }
            PolicyEvent::EpochBoundary => WindowUpdate::Unchanged,
        }
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Aimd
    }
}
