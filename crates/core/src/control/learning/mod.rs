//! Tabular reinforcement learning for window control.
//!
//! The learner observes the flow once per epoch. Smoothed throughput and
//! one-way delay are discretized into one of nine congestion states, the
//! previous epoch's (state, action) pair is credited with a reward, and a new
//! action is chosen epsilon-greedily. Actions map onto window sizes either
//! linearly or through a lookup table.
//!
//! ## Lifecycle
//!
//! | Phase | Entered on | Epoch boundary does |
//! |-------|-----------|---------------------|
//! | `Init` | construction | nothing |
//! | `Warm` | first RTT sample | choose an action, no update |
//! | `Active` | first boundary in `Warm` | update, then choose |
//!
//! ## Bootstrapping
//!
//! By default the TD target draws a fresh epsilon-greedy action for the next
//! state and discards it after reading its value. [`BootstrapMode::OnPolicy`]
//! uses the action actually taken instead, and [`BootstrapMode::Greedy`] the
//! maximum over the next state's row.

mod engine;
mod policy;
mod reward;
mod table;

#[cfg(test)]
mod tests;

pub use engine::{BootstrapMode, RlEngine, RlEngineConfig};
pub use policy::{ActionMapping, LearningConfig, LearningPhase, LearningPolicy, PreferredAction};
pub use reward::{RewardFunction, ScoreTable};
pub use table::ActionValueTable;
