//! A single sender flow driven over a [`LinkSimulator`] in virtual time.

use std::fmt;

use tracing::{debug, info};

use crate::config::ControllerConfig;
use crate::control::{ControllerFacade, ControllerStats};
use crate::error::ConfigError;

use super::link::{LinkConfig, LinkSimulator, LinkStats};
use super::time::{TimeSource, VirtualTime};

/// Result of a simulated run.
#[derive(Debug, Clone)]
pub struct FlowSummary {
    pub duration_ms: u64,
    /// Acks received per second of simulated time.
    pub throughput_pps: f64,
    /// Mean of the raw RTT samples seen by the sender.
    pub mean_rtt_ms: f64,
    pub mean_one_way_delay_ms: f64,
    pub final_window: u32,
    pub link: LinkStats,
    pub controller: ControllerStats,
}

impl fmt::Display for FlowSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "duration:        {} ms", self.duration_ms)?;
        writeln!(f, "throughput:      {:.1} pkt/s", self.throughput_pps)?;
        writeln!(f, "mean rtt:        {:.1} ms", self.mean_rtt_ms)?;
        writeln!(f, "mean delay:      {:.1} ms", self.mean_one_way_delay_ms)?;
        writeln!(f, "final window:    {}", self.final_window)?;
        writeln!(
            f,
            "link:            offered={} delivered={} queue-drops={} random-drops={}",
            self.link.offered, self.link.delivered, self.link.queue_drops, self.link.random_drops
        )?;
        write!(f, "controller:      {}", self.controller)
    }
}

/// Sender loop plus link, stepped one millisecond at a time.
///
/// Each step delivers the acks that have arrived, lets the controller poll for
/// timeouts and epoch boundaries, then sends while fewer than `window_size`
/// datagrams are outstanding.
pub struct SimulatedFlow {
    time: VirtualTime,
    controller: ControllerFacade<VirtualTime>,
    link: LinkSimulator,
    next_seq: u64,
    acked: u64,
    rtt_total_ms: u64,
    elapsed_ms: u64,
}

impl SimulatedFlow {
    /// The controller inherits `seed` when its configuration carries none.
    pub fn new(
        config: &ControllerConfig,
        link: LinkConfig,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        let time = VirtualTime::new();
        let controller = match config.seed {
            Some(_) => config.build_with_time_source(time.clone())?,
            None => config
                .clone()
                .with_seed(seed)
                .build_with_time_source(time.clone())?,
        };
        Ok(Self {
            time,
            controller,
            link: LinkSimulator::new(link, seed),
            next_seq: 0,
            acked: 0,
            rtt_total_ms: 0,
            elapsed_ms: 0,
        })
    }

    pub fn controller(&self) -> &ControllerFacade<VirtualTime> {
        &self.controller
    }

    pub fn link(&self) -> &LinkSimulator {
        &self.link
    }

    pub fn now_ms(&self) -> u64 {
        self.time.now_ms()
    }

    pub fn step(&mut self) {
        let now = self.time.now_ms();
        for ack in self.link.poll_acks(now) {
            self.acked += 1;
            self.rtt_total_ms += ack.ack_recv_ts.saturating_sub(ack.send_ts);
            self.controller.on_ack_received(
                ack.sequence_number,
                ack.send_ts,
                ack.recv_ts,
                ack.ack_recv_ts,
            );
        }
        self.controller.on_tick();

        while self.controller.outstanding() < self.controller.window_size() as usize {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.controller.on_datagram_sent(seq, now);
            self.link.send(seq, now);
        }

        self.time.advance_ms(1);
        self.elapsed_ms += 1;
    }

    /// Step for `duration_ms` more milliseconds and summarize the whole run.
    pub fn run_for(&mut self, duration_ms: u64) -> FlowSummary {
        debug!(duration_ms, start_ms = self.time.now_ms(), "running flow");
        for _ in 0..duration_ms {
            self.step();
        }
        let summary = self.summary();
        info!(
            throughput_pps = summary.throughput_pps,
            mean_rtt_ms = summary.mean_rtt_ms,
            final_window = summary.final_window,
            "flow finished"
        );
        summary
    }

    pub fn summary(&self) -> FlowSummary {
        let throughput_pps = if self.elapsed_ms == 0 {
            0.0
        } else {
            self.acked as f64 * 1000.0 / self.elapsed_ms as f64
        };
        let mean_rtt_ms = if self.acked == 0 {
            0.0
        } else {
            self.rtt_total_ms as f64 / self.acked as f64
        };
        FlowSummary {
            duration_ms: self.elapsed_ms,
            throughput_pps,
            mean_rtt_ms,
            mean_one_way_delay_ms: self.link.stats().average_one_way_delay_ms(),
            final_window: self.controller.window_size(),
            link: self.link.stats().clone(),
            controller: self.controller.stats(),
        }
    }
}
