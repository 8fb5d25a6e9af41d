use std::collections::HashMap;

use tracing::trace;

/// Default multiplier applied to `elapsed / timeout` when grading a timeout.
pub const DEFAULT_SEVERITY_SCALER: f64 = 1.5;

/// This struct is responsible for tracking datagrams that have been sent but not yet
/// acknowledged, and for declaring them lost once they outlive the retransmission timeout.
///
/// The caller reports sends with `on_send` and acks with `on_ack`, and polls
/// `purge_timeouts` on every ack or tick. Retransmitting the payload is the caller's
/// job: a repeated `on_send` for the same sequence number simply restarts its clock.
#[derive(Debug, Clone)]
pub struct OutstandingPacketTracker {
    /// Send timestamp (ms) of every datagram still in flight
    send_times: HashMap<u64, u64>,

    severity_scaler: f64,
}

impl Default for OutstandingPacketTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SEVERITY_SCALER)
    }
}

impl OutstandingPacketTracker {
    pub fn new(severity_scaler: f64) -> Self {
        Self {
            send_times: HashMap::new(),
            severity_scaler,
        }
    }

    pub fn on_send(&mut self, sequence_number: u64, send_time_ms: u64) {
        if let Some(previous) = self.send_times.insert(sequence_number, send_time_ms) {
            trace!(
                sequence_number,
                previous,
                send_time_ms,
                "resend overwrote outstanding entry"
            );
        }
    }

    /// Resolve an ack into an RTT sample in milliseconds.
    ///
    /// Returns `None` for a duplicate or unknown sequence number; in that case the
    /// caller must not touch any estimator or policy.
    pub fn on_ack(&mut self, sequence_number: u64, now_ms: u64) -> Option<u64> {
        let sent_at = self.send_times.remove(&sequence_number)?;
        Some(now_ms.saturating_sub(sent_at))
    }

    /// Drop every entry older than `timeout_ms` and return the worst severity seen.
    ///
    /// Severity is `(elapsed / timeout_ms) * severity_scaler`. A single value is
    /// returned no matter how many entries expired, so a burst of simultaneous
    /// timeouts maps onto exactly one window decrease.
    pub fn purge_timeouts(&mut self, now_ms: u64, timeout_ms: u64) -> Option<f64> {
        let timeout = timeout_ms.max(1) as f64;
        let scaler = self.severity_scaler;
        let mut worst: Option<f64> = None;
        let mut expired = 0usize;

        self.send_times.retain(|_, sent_at| {
            let elapsed = now_ms.saturating_sub(*sent_at);
            if elapsed <= timeout_ms {
                return true;
            }
            let ratio = (elapsed as f64 / timeout) * scaler;
            worst = Some(worst.map_or(ratio, |w: f64| w.max(ratio)));
            expired += 1;
            false
        });

        if let Some(severity) = worst {
            trace!(expired, severity, now_ms, "purged timed-out datagrams");
        }
        worst
    }

    pub fn len(&self) -> usize {
        self.send_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.send_times.is_empty()
    }

    /// Send time of the longest-outstanding datagram.
    pub fn oldest_send_time(&self) -> Option<u64> {
        self.send_times.values().copied().min()
    }

    pub fn severity_scaler(&self) -> f64 {
        self.severity_scaler
    }
}
