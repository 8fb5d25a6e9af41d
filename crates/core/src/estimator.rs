//! Exponentially weighted moving average over a stream of scalar samples.
//!
//! Used for both the RTT (milliseconds) and throughput (packets/sec) signals.

use crate::error::ConfigError;

/// An EWMA estimate.
///
/// The first sample is taken verbatim; each later sample is blended as
/// `alpha * sample + (1 - alpha) * previous`. Reading the estimate before any
/// sample arrived yields `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ewma {
    alpha: f64,
    value: f64,
    has_value: bool,
}

impl Ewma {
    /// Create an empty estimate. `alpha` must be in `(0, 1]`.
    pub fn new(alpha: f64) -> Result<Self, ConfigError> {
        if !(alpha.is_finite() && alpha > 0.0 && alpha <= 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "ewma.alpha",
                value: alpha,
            });
        }
        Ok(Self {
            alpha,
            value: 0.0,
            has_value: false,
        })
    }

    /// Feed a sample and return the new smoothed value.
    pub fn update(&mut self, sample: f64) -> f64 {
        self.value = if self.has_value {
            self.alpha * sample + (1.0 - self.alpha) * self.value
        } else {
            sample
        };
        self.has_value = true;
        self.value
    }

    /// The smoothed value, or `None` before the first sample.
    pub fn get(&self) -> Option<f64> {
        self.has_value.then_some(self.value)
    }

    pub fn has_value(&self) -> bool {
        self.has_value
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}
