//! PID control of the window on RTT error.
//!
//! `error = desired_rtt - measured_rtt`, so a path faster than the target
//! grows the window and a slower one shrinks it. The output is clamped to the
//! window bounds on every step.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::ConfigError;

use super::policy::{DecisionPolicy, PolicyEvent, PolicyKind, Signals, UpdateReason, WindowUpdate};

/// Configuration for the PID policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PidConfig {
    /// Target RTT in milliseconds.
    pub desired_rtt_ms: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Divisor applied once per timeout purge.
    pub decrease_factor: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            desired_rtt_ms: 80.0,
            kp: 0.002,
            ki: 0.0,
            kd: 0.0,
            decrease_factor: 2.0,
        }
    }
}

impl PidConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let gains = [("pid.kp", self.kp), ("pid.ki", self.ki), ("pid.kd", self.kd)];
        if let Some((name, value)) = gains.into_iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::InvalidParameter { name, value });
        }
        if !(self.desired_rtt_ms.is_finite() && self.desired_rtt_ms > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "pid.desired-rtt-ms",
                value: self.desired_rtt_ms,
            });
        }
        if !(self.decrease_factor.is_finite() && self.decrease_factor >= 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "pid.decrease-factor",
                value: self.decrease_factor,
            });
        }
        Ok(())
    }
}

/// PID policy state.
#[derive(Debug, Clone)]
pub struct PidPolicy {
    config: PidConfig,
    integral: f64,
    last_error: f64,
    last_update_ms: Option<u64>,
}

impl PidPolicy {
    pub fn new(config: PidConfig) -> Self {
        Self {
            integral: 0.0,
            // Treat the flow as starting at zero RTT.
            last_error: config.desired_rtt_ms,
            last_update_ms: None,
            config,
        }
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    fn step(&mut self, measured_rtt_ms: f64, signals: &Signals) -> WindowUpdate {
        let error = self.config.desired_rtt_ms - measured_rtt_ms;
        let dt = self
            .last_update_ms
            .map_or(0, |last| signals.now_ms.saturating_sub(last)) as f64;

        let derivative = if dt > 0.0 {
            (error - self.last_error) / dt
        } else {
            0.0
        };
        self.integral += error * dt;

        let output =
            self.config.kp * error + self.config.ki * self.integral + self.config.kd * derivative;
        let cwnd = (signals.cwnd + output).clamp(signals.min_window, signals.max_window);
        trace!(error, derivative, integral = self.integral, output, cwnd, "PID step");

        self.last_error = error;
        self.last_update_ms = Some(signals.now_ms);
        WindowUpdate::resize(cwnd, UpdateReason::PidStep)
    }
}

impl DecisionPolicy for PidPolicy {
    fn decide(&mut self, event: &PolicyEvent, signals: &Signals) -> WindowUpdate {
        match *event {
            PolicyEvent::Ack { rtt_ms, .. } => self.step(rtt_ms, signals),
            PolicyEvent::Timeout { .. } if signals.smoothed_rtt_ms.is_none() => {
                WindowUpdate::Unchanged
            }
            PolicyEvent::Timeout { .. } => WindowUpdate::resize(
                (signals.cwnd / self.config.decrease_factor).max(signals.min_window),
                UpdateReason::MultiplicativeDecrease,
            ),
            PolicyEvent::EpochBoundary => WindowUpdate::Unchanged,
        }
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Pid
    }
}
