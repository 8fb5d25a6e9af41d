//! Discretization of smoothed throughput and delay into a 3x3 congestion grid.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of discrete congestion states (3 throughput buckets x 3 delay buckets).
pub const NUM_CONGESTION_STATES: usize = 9;

/// A signal level after discretization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Bucket {
    Low = 0,
    Med = 1,
    High = 2,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Low, Bucket::Med, Bucket::High];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Convert from an index, returning None for values outside `0..3`.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Low),
            1 => Some(Self::Med),
            2 => Some(Self::High),
            _ => None,
        }
    }
}

/// A discrete congestion state: `(throughput bucket, delay bucket)`.
///
/// Maps bijectively onto `0..NUM_CONGESTION_STATES` via
/// `throughput * 3 + delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CongestionState {
    pub throughput: Bucket,
    pub delay: Bucket,
}

impl CongestionState {
    pub fn new(throughput: Bucket, delay: Bucket) -> Self {
        Self { throughput, delay }
    }

    pub fn index(self) -> usize {
        state_index(self.throughput, self.delay)
    }

    /// Inverse of [`CongestionState::index`].
    pub fn from_index(index: usize) -> Option<Self> {
        if index >= NUM_CONGESTION_STATES {
            return None;
        }
        Some(Self {
            throughput: Bucket::from_index(index / 3)?,
            delay: Bucket::from_index(index % 3)?,
        })
    }
}

/// Fixed bijection from a bucket pair onto a state index.
pub fn state_index(throughput: Bucket, delay: Bucket) -> usize {
    throughput.index() * 3 + delay.index()
}

/// Two ascending cut points: `x < low` is LOW, `x < high` is MED, else HIGH.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

impl Thresholds {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn bucket(&self, value: f64) -> Bucket {
        if value < self.low {
            Bucket::Low
        } else if value < self.high {
            Bucket::Med
        } else {
            Bucket::High
        }
    }

    fn validate(&self, signal: &'static str) -> Result<(), ConfigError> {
        if !self.low.is_finite() || !self.high.is_finite() || self.low > self.high {
            return Err(ConfigError::InvalidThresholds {
                signal,
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}

/// Maps smoothed signals onto [`CongestionState`]s using per-preset thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StateMapper {
    /// Throughput cut points in packets/sec.
    pub throughput: Thresholds,
    /// One-way delay cut points in milliseconds.
    pub delay: Thresholds,
}

impl StateMapper {
    pub fn new(throughput: Thresholds, delay: Thresholds) -> Self {
        Self { throughput, delay }
    }

    pub fn discretize_throughput(&self, packets_per_sec: f64) -> Bucket {
        self.throughput.bucket(packets_per_sec)
    }

    pub fn discretize_delay(&self, delay_ms: f64) -> Bucket {
        self.delay.bucket(delay_ms)
    }

    pub fn state(&self, packets_per_sec: f64, delay_ms: f64) -> CongestionState {
        CongestionState::new(
            self.discretize_throughput(packets_per_sec),
            self.discretize_delay(delay_ms),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.throughput.validate("throughput")?;
        self.delay.validate("delay")
    }
}
