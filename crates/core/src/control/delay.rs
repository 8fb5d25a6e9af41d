//! Delay-driven policy.
//!
//! In threshold mode the smoothed RTT is compared against a single bound:
//! at or under it the window grows additively, above it the window is divided
//! (cool-down gated). In banded mode the smoothed RTT selects a step from an
//! ordered table and the window moves by `step / cwnd`.
//!
//! Nothing happens until the RTT estimate has a value.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

use super::policy::{
    additive_increase, timeout_divisor, DecisionPolicy, DecreaseGate, PolicyEvent, PolicyKind,
    Signals, UpdateReason, WindowUpdate,
};

/// One row of the banded response: when the smoothed RTT is above
/// `above_ms`, apply `cwnd += step / cwnd`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DelayBand {
    pub above_ms: f64,
    pub step: f64,
}

/// Configuration for the delay policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DelayConfig {
    /// Smoothed RTT bound for threshold mode.
    pub rtt_threshold_ms: f64,
    /// Additive-increase gain for threshold mode.
    pub increase_gain: f64,
    /// Divisor for decreases (threshold mode and timeouts).
    pub decrease_factor: f64,
    pub cool_down_ms: u64,
    /// Banded response table. Empty selects threshold mode.
    pub bands: Vec<DelayBand>,
    /// Step used in banded mode when no band matches.
    pub fallback_step: f64,
    /// On a timeout, divide by the purge severity when it exceeds
    /// `decrease_factor`.
    pub scale_by_severity: bool,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            rtt_threshold_ms: 100.0,
            increase_gain: 1.0,
            decrease_factor: 2.0,
            cool_down_ms: 200,
            bands: Vec::new(),
            fallback_step: 0.8,
            scale_by_severity: false,
        }
    }
}

impl DelayConfig {
    /// Graded response: steep cuts above 150ms, gentle growth below 75ms.
    pub fn banded() -> Self {
        Self {
            bands: vec![
                DelayBand {
                    above_ms: 200.0,
                    step: -10.0,
                },
                DelayBand {
                    above_ms: 150.0,
                    step: -8.0,
                },
                DelayBand {
                    above_ms: 75.0,
                    step: 0.3,
                },
                DelayBand {
                    above_ms: 40.0,
                    step: 0.5,
                },
            ],
            fallback_step: 0.8,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rtt_threshold_ms.is_finite() && self.rtt_threshold_ms > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "delay.rtt-threshold-ms",
                value: self.rtt_threshold_ms,
            });
        }
        if !(self.increase_gain.is_finite() && self.increase_gain > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "delay.increase-gain",
                value: self.increase_gain,
            });
        }
        if !(self.decrease_factor.is_finite() && self.decrease_factor > 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "delay.decrease-factor",
                value: self.decrease_factor,
            });
        }
        for pair in self.bands.windows(2) {
            if pair[0].above_ms <= pair[1].above_ms {
                return Err(ConfigError::InvalidParameter {
                    name: "delay.bands.above-ms",
                    value: pair[1].above_ms,
                });
            }
        }
        if let Some(band) = self.bands.iter().find(|b| !b.step.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                name: "delay.bands.step",
                value: band.step,
            });
        }
        Ok(())
    }
}

/// Delay policy state.
#[derive(Debug, Clone)]
pub struct DelayPolicy {
    config: DelayConfig,
    gate: DecreaseGate,
}

impl DelayPolicy {
    pub fn new(config: DelayConfig) -> Self {
        Self {
            gate: DecreaseGate::new(config.cool_down_ms),
            config,
        }
    }

    pub fn is_banded(&self) -> bool {
        !self.config.bands.is_empty()
    }

    fn decrease(&mut self, divisor: f64, signals: &Signals) -> WindowUpdate {
        if !self.gate.try_acquire(signals.now_ms) {
            return WindowUpdate::Unchanged;
        }
        WindowUpdate::resize(
            (signals.cwnd / divisor).max(signals.min_window),
            UpdateReason::MultiplicativeDecrease,
        )
    }

    fn threshold_step(&mut self, rtt_ms: f64, signals: &Signals) -> WindowUpdate {
        if rtt_ms <= self.config.rtt_threshold_ms {
            WindowUpdate::resize(
                additive_increase(signals.cwnd, self.config.increase_gain),
                UpdateReason::AdditiveIncrease,
            )
        } else {
            debug!(
                rtt_ms,
                threshold = self.config.rtt_threshold_ms,
                "smoothed RTT over threshold"
            );
            self.decrease(self.config.decrease_factor, signals)
        }
    }

    fn banded_step(&self, rtt_ms: f64, signals: &Signals) -> WindowUpdate {
        let step = self
            .config
            .bands
            .iter()
            .find(|band| rtt_ms > band.above_ms)
            .map_or(self.config.fallback_step, |band| band.step);
        let cwnd = additive_increase(signals.cwnd, step).max(signals.min_window);
        WindowUpdate::resize(cwnd, UpdateReason::DelayBand)
    }
}

impl DecisionPolicy for DelayPolicy {
    fn decide(&mut self, event: &PolicyEvent, signals: &Signals) -> WindowUpdate {
        match *event {
            PolicyEvent::Ack { .. } => {
                let Some(rtt_ms) = signals.smoothed_rtt_ms else {
                    return WindowUpdate::Unchanged;
                };
                if self.is_banded() {
                    self.banded_step(rtt_ms, signals)
                } else {
                    self.threshold_step(rtt_ms, signals)
                }
            }
            // RTT-driven: no decrease of any kind until the estimate exists.
            PolicyEvent::Timeout { .. } if signals.smoothed_rtt_ms.is_none() => {
                WindowUpdate::Unchanged
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
        PolicyKind::Delay
    }
}
