//! Controller statistics snapshot.

use std::fmt;

use super::learning::LearningPhase;
use super::policy::PolicyKind;

/// Point-in-time view of a controller, for telemetry and debugging.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStats {
    pub policy: PolicyKind,
    /// Current window (fractional).
    pub cwnd: f64,
    /// Window as reported to the sender loop.
    pub window: u32,
    /// Largest window reached.
    pub peak_cwnd: f64,
    pub smoothed_rtt_ms: Option<f64>,
    /// Smoothed throughput in packets/sec.
    pub smoothed_throughput: Option<f64>,
    pub timeout_ms: u64,
    /// Datagrams sent but neither acked nor timed out.
    pub outstanding: usize,
    pub datagrams_sent: u64,
    pub acks: u64,
    /// Duplicate or unknown acks that were dropped.
    pub ignored_acks: u64,
    /// Purges that found at least one expired datagram.
    pub timeout_events: u64,
    pub total_increases: u64,
    pub total_decreases: u64,
    /// Completed measurement epochs.
    pub epochs: u64,
    /// Learning policy only.
    pub learning_phase: Option<LearningPhase>,
    /// Learning policy only: the action currently in force.
    pub last_action: Option<usize>,
}

impl fmt::Display for ControllerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} window={} (peak {:.1}) sent={} acked={} ignored={} timeouts={} +{}/-{} epochs={}",
            self.policy,
            self.window,
            self.peak_cwnd,
            self.datagrams_sent,
            self.acks,
            self.ignored_acks,
            self.timeout_events,
            self.total_increases,
            self.total_decreases,
            self.epochs,
        )?;
        if let Some(rtt) = self.smoothed_rtt_ms {
            write!(f, " srtt={rtt:.1}ms")?;
        }
        if let Some(action) = self.last_action {
            write!(f, " action={action}")?;
        }
        Ok(())
    }
}
