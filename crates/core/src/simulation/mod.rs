//! Deterministic time and link simulation.
//!
//! - **TimeSource**: the clock the controller reads ([`RealTime`] or [`VirtualTime`])
//! - **LinkSimulator**: a single bottleneck with a FIFO queue, propagation delay
//!   and seeded random loss
//! - **SimulatedFlow**: a sender loop driving a controller over the link in
//!   one-millisecond steps
//!
//! Everything here is single-threaded and seeded, so a run is reproducible
//! from its configuration and seed alone:
//!
//! ```
//! use datagram_cc::config::Preset;
//! use datagram_cc::simulation::{LinkConfig, SimulatedFlow};
//!
//! let link = LinkConfig::new(400.0, 15, 40);
//! let mut flow = SimulatedFlow::new(&Preset::Aimd.config(), link, 0x1234).unwrap();
//! let summary = flow.run_for(2_000);
//! assert!(summary.throughput_pps > 0.0);
//! ```

mod flow;
mod link;
mod time;

pub use flow::{FlowSummary, SimulatedFlow};
pub use link::{AckArrival, LinkConfig, LinkSimulator, LinkStats};
pub use time::{RealTime, TimeSource, VirtualTime};
