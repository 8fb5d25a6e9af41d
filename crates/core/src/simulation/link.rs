//! Single-bottleneck link model with deterministic delivery.
//!
//! Datagrams enter a FIFO queue drained at a fixed service rate, then cross a
//! fixed one-way propagation delay. The receiver acks immediately and the ack
//! crosses the same delay back. Random loss is drawn from a seeded RNG, so a
//! given seed and send pattern always produce the same ack stream.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

/// Link parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConfig {
    /// Bottleneck service rate in datagrams per second.
    pub rate_pps: f64,
    /// One-way propagation delay in milliseconds.
    pub one_way_delay_ms: u64,
    /// Datagrams the bottleneck queue can hold, including the one in service.
    pub queue_capacity: usize,
    /// Probability of losing a datagram before it reaches the queue.
    pub loss_rate: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            rate_pps: 500.0,
            one_way_delay_ms: 20,
            queue_capacity: 100,
            loss_rate: 0.0,
        }
    }
}

impl LinkConfig {
    pub fn new(rate_pps: f64, one_way_delay_ms: u64, queue_capacity: usize) -> Self {
        Self {
            rate_pps,
            one_way_delay_ms,
            queue_capacity,
            loss_rate: 0.0,
        }
    }

    pub fn with_loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate;
        self
    }

    /// Round-trip time of an empty link.
    pub fn base_rtt_ms(&self) -> u64 {
        2 * self.one_way_delay_ms
    }

    fn service_time_ms(&self) -> f64 {
        1000.0 / self.rate_pps.max(f64::MIN_POSITIVE)
    }
}

/// An acknowledgement arriving back at the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckArrival {
    pub sequence_number: u64,
    /// Sender clock.
    pub send_ts: u64,
    /// Receiver clock (shared with the sender in this model).
    pub recv_ts: u64,
    /// Sender clock.
    pub ack_recv_ts: u64,
}

/// Counters kept by the link.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LinkStats {
    pub offered: u64,
    pub delivered: u64,
    /// Dropped because the bottleneck queue was full.
    pub queue_drops: u64,
    /// Dropped by random loss.
    pub random_drops: u64,
    /// Sum of `recv_ts - send_ts` over delivered datagrams.
    pub total_one_way_delay_ms: u64,
}

impl LinkStats {
    pub fn average_one_way_delay_ms(&self) -> f64 {
        if self.delivered == 0 {
            0.0
        } else {
            self.total_one_way_delay_ms as f64 / self.delivered as f64
        }
    }
}

/// The bottleneck link.
#[derive(Debug)]
pub struct LinkSimulator {
    config: LinkConfig,
    rng: SmallRng,
    /// Departure times (ms, fractional) of datagrams still in the queue.
    departures: VecDeque<f64>,
    /// Pending acks ordered by arrival time.
    acks: BinaryHeap<Reverse<(u64, u64, u64, u64)>>,
    stats: LinkStats,
}

impl LinkSimulator {
    pub fn new(config: LinkConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
            departures: VecDeque::new(),
            acks: BinaryHeap::new(),
            stats: LinkStats::default(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Datagrams queued at the bottleneck at `now_ms`.
    pub fn queue_len(&mut self, now_ms: u64) -> usize {
        self.drain_departed(now_ms);
        self.departures.len()
    }

    fn drain_departed(&mut self, now_ms: u64) {
        let now = now_ms as f64;
        while self.departures.front().is_some_and(|d| *d <= now) {
            self.departures.pop_front();
        }
    }

    /// Offer a datagram to the link. Returns false if it was dropped.
    pub fn send(&mut self, sequence_number: u64, now_ms: u64) -> bool {
        self.stats.offered += 1;
        if self.config.loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.loss_rate {
            self.stats.random_drops += 1;
            trace!(sequence_number, now_ms, "random loss");
            return false;
        }

        self.drain_departed(now_ms);
        if self.departures.len() >= self.config.queue_capacity {
            self.stats.queue_drops += 1;
            trace!(sequence_number, now_ms, "queue overflow");
            return false;
        }

        let start = self
            .departures
            .back()
            .copied()
            .unwrap_or(0.0)
            .max(now_ms as f64);
        let departure = start + self.config.service_time_ms();
        self.departures.push_back(departure);

        let recv_ts = departure.ceil() as u64 + self.config.one_way_delay_ms;
        let ack_recv_ts = recv_ts + self.config.one_way_delay_ms;
        self.acks
            .push(Reverse((ack_recv_ts, sequence_number, now_ms, recv_ts)));
        self.stats.delivered += 1;
        self.stats.total_one_way_delay_ms += recv_ts.saturating_sub(now_ms);
        true
    }

    /// Remove and return every ack that has arrived by `now_ms`, oldest first.
    pub fn poll_acks(&mut self, now_ms: u64) -> Vec<AckArrival> {
        let mut arrived = Vec::new();
        while let Some(Reverse((ack_recv_ts, ..))) = self.acks.peek() {
            if *ack_recv_ts > now_ms {
                break;
            }
            let Some(Reverse((ack_recv_ts, sequence_number, send_ts, recv_ts))) = self.acks.pop()
            else {
                break;
            };
            arrived.push(AckArrival {
                sequence_number,
                send_ts,
                recv_ts,
                ack_recv_ts,
            });
        }
        arrived
    }

    /// Arrival time of the next pending ack.
    pub fn next_ack_time(&self) -> Option<u64> {
        self.acks.peek().map(|Reverse((at, ..))| *at)
    }
}
