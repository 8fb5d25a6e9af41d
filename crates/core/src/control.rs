//! Congestion-control decision core.
//!
//! # Control
//!
//! [`ControllerFacade`] sits between a reliable-datagram sender loop and one of
//! several interchangeable decision policies. The loop reports sends and acks;
//! the facade resolves RTT samples through the [`OutstandingPacketTracker`],
//! smooths RTT and throughput with EWMAs, detects timeouts by polling, and
//! forwards each event to the active [`Policy`].
//!
//! ## Policies
//!
//! - **AIMD**: per-ack additive increase, cool-down gated multiplicative
//!   decrease, optional reaction to RTT spikes.
//! - **Delay**: smoothed RTT against a threshold, or a banded step table.
//! - **PID**: proportional-integral-derivative control on RTT error.
//! - **Learning**: tabular Q-learning / SARSA over a 3x3 congestion grid,
//!   acting once per epoch.
//!
//! ## Data Flow
//!
//! ```text
//! on_datagram_sent ──► tracker.on_send
//! on_ack_received  ──► tracker.on_ack ──► rtt EWMA ──► policy(Ack)
//!                  └─► purge_timeouts ──► policy(Timeout)   (at most once)
//!                  └─► epoch clock    ──► throughput EWMA ──► policy(EpochBoundary)
//! ```

mod aimd;
mod controller;
mod delay;
mod learning;
mod pid;
mod policy;
mod state_mapper;
mod stats;
mod tracker;

pub use aimd::{AimdConfig, AimdPolicy, SpikeConfig};
pub use controller::{ControllerFacade, WindowState};
pub use delay::{DelayBand, DelayConfig, DelayPolicy};
pub use learning::{
    ActionMapping, ActionValueTable, BootstrapMode, LearningConfig, LearningPhase, LearningPolicy,
    PreferredAction, RewardFunction, RlEngine, RlEngineConfig, ScoreTable,
};
pub use pid::{PidConfig, PidPolicy};
pub use policy::{
    DecisionPolicy, Policy, PolicyEvent, PolicyKind, Signals, UpdateReason, WindowUpdate,
};
pub use state_mapper::{
    state_index, Bucket, CongestionState, StateMapper, Thresholds, NUM_CONGESTION_STATES,
};
pub use stats::ControllerStats;
pub use tracker::{OutstandingPacketTracker, DEFAULT_SEVERITY_SCALER};
