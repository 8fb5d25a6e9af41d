//! Decision policy interface.
//!
//! Every policy turns one event plus the current signals into a window update.
//! Rule-based policies react to individual acks; the learning policy reacts to
//! epoch boundaries only. All of them are invoked synchronously from the
//! sender loop through [`ControllerFacade`](super::ControllerFacade).
//!
//! ## Design
//!
//! As with the transport-level congestion controllers, dispatch goes through
//! an enum rather than trait objects: the set of policies is closed, and
//! pattern matching gives callers access to policy-specific state (for
//! example the learning engine's value table).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::aimd::AimdPolicy;
use super::delay::DelayPolicy;
use super::learning::LearningPolicy;
use super::pid::PidPolicy;

// =============================================================================
// Policy Identification
// =============================================================================

/// Identifies the decision policy in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Additive increase / multiplicative decrease with decrease cool-down.
    Aimd,
    /// Smoothed-RTT threshold (or banded) controller.
    Delay,
    /// Proportional-integral-derivative control on RTT error.
    Pid,
    /// Tabular reinforcement learning acting once per epoch.
    Learning,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Aimd => write!(f, "AIMD"),
            PolicyKind::Delay => write!(f, "Delay"),
            PolicyKind::Pid => write!(f, "PID"),
            PolicyKind::Learning => write!(f, "Learning"),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aimd" => Ok(Self::Aimd),
            "delay" => Ok(Self::Delay),
            "pid" => Ok(Self::Pid),
            "learning" | "rl" => Ok(Self::Learning),
            other => Err(format!("unknown policy kind: {other}")),
        }
    }
}

// =============================================================================
// Events, signals and updates
// =============================================================================

/// What just happened on the flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicyEvent {
    /// A tracked datagram was acknowledged.
    Ack {
        /// RTT sample resolved by the outstanding-packet tracker.
        rtt_ms: f64,
        /// `ack_recv_ts - send_ts` as reported by the sender loop.
        transit_ms: f64,
        /// Smoothed RTT before this sample was folded in.
        baseline_rtt_ms: Option<f64>,
    },
    /// One or more datagrams timed out in a single purge.
    Timeout {
        /// Worst `elapsed / timeout * scaler` among the purged datagrams.
        severity: f64,
    },
    /// The epoch clock crossed a boundary.
    EpochBoundary,
}

/// Read-only view of the controller's signals at decision time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signals {
    pub now_ms: u64,
    pub cwnd: f64,
    pub min_window: f64,
    pub max_window: f64,
    pub timeout_ms: u64,
    pub smoothed_rtt_ms: Option<f64>,
    pub smoothed_throughput: Option<f64>,
}

/// Why a policy resized the window. Carried into logs and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReason {
    AdditiveIncrease,
    MultiplicativeDecrease,
    Outage,
    DelayBand,
    PidStep,
    Action(usize),
}

impl UpdateReason {
    pub fn is_decrease(self) -> bool {
        matches!(self, Self::MultiplicativeDecrease | Self::Outage)
    }
}

/// Result of a policy decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowUpdate {
    Unchanged,
    Resize { cwnd: f64, reason: UpdateReason },
}

impl WindowUpdate {
    pub fn resize(cwnd: f64, reason: UpdateReason) -> Self {
        Self::Resize { cwnd, reason }
    }
}

// =============================================================================
// Shared control-law helpers
// =============================================================================

/// `cwnd += gain / cwnd`, the per-ack additive increase.
pub(crate) fn additive_increase(cwnd: f64, gain: f64) -> f64 {
    cwnd + gain / cwnd.max(f64::MIN_POSITIVE)
}

/// Divisor applied on a timeout: `factor`, or the purge severity when that is
/// larger and `scale_by_severity` is set.
pub(crate) fn timeout_divisor(factor: f64, severity: f64, scale_by_severity: bool) -> f64 {
    if scale_by_severity {
        factor.max(severity)
    } else {
        factor
    }
}

/// Rate limiter for multiplicative decreases.
///
/// A decrease request that arrives before `cool_down_ms` has elapsed since the
/// last *applied* decrease is dropped. The first request is always allowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DecreaseGate {
    cool_down_ms: u64,
    last_decrease_ms: Option<u64>,
}

impl DecreaseGate {
    pub(crate) fn new(cool_down_ms: u64) -> Self {
        Self {
            cool_down_ms,
            last_decrease_ms: None,
        }
    }

    /// Returns true and arms the cool-down if a decrease may be applied now.
    pub(crate) fn try_acquire(&mut self, now_ms: u64) -> bool {
        if let Some(last) = self.last_decrease_ms {
            if now_ms.saturating_sub(last) < self.cool_down_ms {
                return false;
            }
        }
        self.last_decrease_ms = Some(now_ms);
        true
    }
}

// =============================================================================
// Decision Policy Trait
// =============================================================================

/// Trait defining the contract shared by every decision policy.
pub trait DecisionPolicy {
    /// Turn an event into a window update.
    ///
    /// Policies ignore events outside their cadence by returning
    /// [`WindowUpdate::Unchanged`].
    fn decide(&mut self, event: &PolicyEvent, signals: &Signals) -> WindowUpdate;

    /// Returns the policy identifier.
    fn kind(&self) -> PolicyKind;
}

// =============================================================================
// Policy Enum (Dispatch)
// =============================================================================

/// Decision policy that dispatches to the configured variant.
#[derive(Debug)]
pub enum Policy {
    Aimd(AimdPolicy),
    Delay(DelayPolicy),
    Pid(PidPolicy),
    Learning(LearningPolicy),
}

impl DecisionPolicy for Policy {
    fn decide(&mut self, event: &PolicyEvent, signals: &Signals) -> WindowUpdate {
        match self {
            Self::Aimd(p) => p.decide(event, signals),
            Self::Delay(p) => p.decide(event, signals),
            Self::Pid(p) => p.decide(event, signals),
            Self::Learning(p) => p.decide(event, signals),
        }
    }

    fn kind(&self) -> PolicyKind {
        Policy::kind(self)
    }
}

impl Policy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::Aimd(_) => PolicyKind::Aimd,
            Self::Delay(_) => PolicyKind::Delay,
            Self::Pid(_) => PolicyKind::Pid,
            Self::Learning(_) => PolicyKind::Learning,
        }
    }

    /// Get a reference to the inner learning policy if applicable.
    pub fn as_learning(&self) -> Option<&LearningPolicy> {
        match self {
            Self::Learning(p) => Some(p),
            Self::Aimd(_) | Self::Delay(_) | Self::Pid(_) => None,
        }
    }

    /// Mutable access to the inner learning policy, e.g. to switch off
    /// exploration for evaluation.
    pub fn as_learning_mut(&mut self) -> Option<&mut LearningPolicy> {
        match self {
            Self::Learning(p) => Some(p),
            Self::Aimd(_) | Self::Delay(_) | Self::Pid(_) => None,
        }
    }

    pub fn as_aimd(&self) -> Option<&AimdPolicy> {
        match self {
            Self::Aimd(p) => Some(p),
            Self::Delay(_) | Self::Pid(_) | Self::Learning(_) => None,
        }
    }
}
