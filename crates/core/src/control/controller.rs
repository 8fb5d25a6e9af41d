//! The controller facade called by the sender loop.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::{debug, info, trace};

use crate::config::{ControllerConfig, PolicyConfig, TimeoutConfig};
use crate::error::ConfigError;
use crate::estimator::Ewma;
use crate::simulation::{RealTime, TimeSource};

use super::aimd::AimdPolicy;
use super::delay::DelayPolicy;
use super::learning::LearningPolicy;
use super::pid::PidPolicy;
use super::policy::{DecisionPolicy, Policy, PolicyEvent, Signals, WindowUpdate};
use super::stats::ControllerStats;
use super::tracker::OutstandingPacketTracker;

/// Mutable window bookkeeping owned by one controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowState {
    /// Fractional window; always within `[min_window, max_window]`.
    pub cwnd: f64,
    /// Acks resolved since the current epoch started.
    pub epoch_packet_count: u64,
    pub epoch_start_ms: u64,
}

/// Last sender-clock timestamp reported by the caller, and the controller's
/// own clock reading at that moment.
#[derive(Debug, Clone, Copy)]
struct SenderClock {
    reported_ms: u64,
    observed_at_ms: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    sent: u64,
    acks: u64,
    ignored_acks: u64,
    timeout_events: u64,
    increases: u64,
    decreases: u64,
    epochs: u64,
}

/// Window and retransmission-timeout decisions for one flow.
///
/// The sender loop reports every send and ack and reads back
/// [`window_size`](Self::window_size) and [`timeout_ms`](Self::timeout_ms).
/// Nothing runs in the background: timeouts and epoch boundaries are noticed
/// when the loop calls in, either with an ack or through
/// [`on_tick`](Self::on_tick).
///
/// ## Type Parameter
///
/// `T` is the clock used for epoch boundaries and cool-downs. RTT samples and
/// timeout purges use the caller's timestamps, which may come from any
/// monotonic millisecond clock: between calls the sender clock is extrapolated
/// with `T`. Use `VirtualTime` for deterministic tests.
pub struct ControllerFacade<T: TimeSource = RealTime> {
    time_source: T,
    window: WindowState,
    peak_cwnd: f64,
    min_window: f64,
    max_window: f64,
    epoch_ms: u64,
    timeout: TimeoutConfig,
    rtt: Ewma,
    throughput: Ewma,
    tracker: OutstandingPacketTracker,
    policy: Policy,
    sender_clock: Option<SenderClock>,
    counters: Counters,
}

impl<T: TimeSource> ControllerFacade<T> {
    pub fn new(config: &ControllerConfig, time_source: T) -> Result<Self, ConfigError> {
        config.validate()?;

        let policy = match &config.policy {
            PolicyConfig::Aimd(c) => Policy::Aimd(AimdPolicy::new(*c)),
            PolicyConfig::Delay(c) => Policy::Delay(DelayPolicy::new(c.clone())),
            PolicyConfig::Pid(c) => Policy::Pid(PidPolicy::new(*c)),
            PolicyConfig::Learning(c) => {
                let rng = match config.seed {
                    Some(seed) => SmallRng::seed_from_u64(seed),
                    None => SmallRng::from_entropy(),
                };
                Policy::Learning(LearningPolicy::new(c.clone(), rng)?)
            }
        };

        let now_ms = time_source.now_ms();
        info!(
            policy = %policy.kind(),
            initial_window = config.start_window(),
            min_window = config.min_window,
            max_window = config.max_window,
            epoch_ms = config.epoch_ms,
            seed = ?config.seed,
            "congestion controller created"
        );

        Ok(Self {
            time_source,
            window: WindowState {
                cwnd: config.start_window(),
                epoch_packet_count: 0,
                epoch_start_ms: now_ms,
            },
            peak_cwnd: config.start_window(),
            min_window: config.min_window,
            max_window: config.max_window,
            epoch_ms: config.epoch_ms,
            timeout: config.timeout,
            rtt: Ewma::new(config.rtt_alpha)?,
            throughput: Ewma::new(config.throughput_alpha)?,
            tracker: OutstandingPacketTracker::new(config.severity_scaler),
            policy,
            sender_clock: None,
            counters: Counters::default(),
        })
    }

    /// Number of datagrams the sender may have outstanding: `floor(cwnd)`,
    /// never below the minimum window.
    pub fn window_size(&self) -> u32 {
        self.window.cwnd.floor().max(self.min_window.ceil()) as u32
    }

    /// Retransmission timeout the sender loop should wait before giving up on
    /// an ack.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout.timeout_ms(self.rtt.get())
    }

    pub fn on_datagram_sent(&mut self, sequence_number: u64, send_time_ms: u64) {
        let now_ms = self.time_source.now_ms();
        self.observe_sender_time(send_time_ms, now_ms);
        self.tracker.on_send(sequence_number, send_time_ms);
        self.counters.sent += 1;
        trace!(sequence_number, send_time_ms, "datagram sent");
    }

    /// Process an acknowledgement.
    ///
    /// `send_ts` and `ack_recv_ts` are on the sender's clock, `recv_ts` on the
    /// receiver's. Duplicate and unknown acks leave every estimate untouched.
    pub fn on_ack_received(
        &mut self,
        sequence_number: u64,
        send_ts: u64,
        recv_ts: u64,
        ack_recv_ts: u64,
    ) {
        let now_ms = self.time_source.now_ms();
        self.observe_sender_time(ack_recv_ts, now_ms);

        let Some(rtt) = self.tracker.on_ack(sequence_number, ack_recv_ts) else {
            self.counters.ignored_acks += 1;
            trace!(sequence_number, "ignoring duplicate or unknown ack");
            return;
        };
        self.counters.acks += 1;
        trace!(sequence_number, send_ts, recv_ts, ack_recv_ts, rtt, "ack");

        let rtt_ms = rtt as f64;
        let baseline_rtt_ms = self.rtt.get();
        self.rtt.update(rtt_ms);
        self.window.epoch_packet_count += 1;

        self.apply(
            PolicyEvent::Ack {
                rtt_ms,
                transit_ms: ack_recv_ts.saturating_sub(send_ts) as f64,
                baseline_rtt_ms,
            },
            now_ms,
        );
        self.poll(now_ms);
    }

    /// Check for timed-out datagrams and epoch boundaries without an ack.
    pub fn on_tick(&mut self) {
        let now_ms = self.time_source.now_ms();
        self.poll(now_ms);
    }

    /// Current sender-clock time: the latest reported timestamp plus the time
    /// `T` has advanced since. Before any report the two clocks coincide.
    fn sender_now_ms(&self, now_ms: u64) -> u64 {
        match self.sender_clock {
            Some(clock) => clock
                .reported_ms
                .saturating_add(now_ms.saturating_sub(clock.observed_at_ms)),
            None => now_ms,
        }
    }

    fn observe_sender_time(&mut self, sender_ms: u64, now_ms: u64) {
        let reported_ms = sender_ms.max(self.sender_now_ms(now_ms));
        self.sender_clock = Some(SenderClock {
            reported_ms,
            observed_at_ms: now_ms,
        });
    }

    fn poll(&mut self, now_ms: u64) {
        let sender_now_ms = self.sender_now_ms(now_ms);
        if let Some(severity) = self.tracker.purge_timeouts(sender_now_ms, self.timeout_ms()) {
            self.counters.timeout_events += 1;
            debug!(severity, outstanding = self.tracker.len(), "datagrams timed out");
            self.apply(PolicyEvent::Timeout { severity }, now_ms);
        }

        let elapsed_ms = now_ms.saturating_sub(self.window.epoch_start_ms);
        if elapsed_ms >= self.epoch_ms {
            let sample = self.window.epoch_packet_count as f64 * 1000.0 / elapsed_ms as f64;
            let smoothed = self.throughput.update(sample);
            trace!(
                packets = self.window.epoch_packet_count,
                sample,
                smoothed,
                "epoch boundary"
            );
            self.window.epoch_packet_count = 0;
            self.window.epoch_start_ms = now_ms;
            self.counters.epochs += 1;
            self.apply(PolicyEvent::EpochBoundary, now_ms);
        }
    }

    fn signals(&self, now_ms: u64) -> Signals {
        Signals {
            now_ms,
            cwnd: self.window.cwnd,
            min_window: self.min_window,
            max_window: self.max_window,
            timeout_ms: self.timeout_ms(),
            smoothed_rtt_ms: self.rtt.get(),
            smoothed_throughput: self.throughput.get(),
        }
    }

    fn apply(&mut self, event: PolicyEvent, now_ms: u64) {
        let signals = self.signals(now_ms);
        let WindowUpdate::Resize { cwnd, reason } = self.policy.decide(&event, &signals) else {
            return;
        };
        if !cwnd.is_finite() {
            debug!(?reason, "policy produced a non-finite window, ignoring");
            return;
        }

        let previous = self.window.cwnd;
        let next = cwnd.clamp(self.min_window, self.max_window);
        if next > previous {
            self.counters.increases += 1;
        } else if next < previous {
            self.counters.decreases += 1;
        }
        self.peak_cwnd = self.peak_cwnd.max(next);
        self.window.cwnd = next;

        if reason.is_decrease() || matches!(event, PolicyEvent::EpochBoundary) {
            debug!(?reason, from = previous, to = next, "window updated");
        } else {
            trace!(?reason, from = previous, to = next, "window updated");
        }
    }

    pub fn stats(&self) -> ControllerStats {
        let learning = self.policy.as_learning();
        ControllerStats {
            policy: self.policy.kind(),
            cwnd: self.window.cwnd,
            window: self.window_size(),
            peak_cwnd: self.peak_cwnd,
            smoothed_rtt_ms: self.rtt.get(),
            smoothed_throughput: self.throughput.get(),
            timeout_ms: self.timeout_ms(),
            outstanding: self.tracker.len(),
            datagrams_sent: self.counters.sent,
            acks: self.counters.acks,
            ignored_acks: self.counters.ignored_acks,
            timeout_events: self.counters.timeout_events,
            total_increases: self.counters.increases,
            total_decreases: self.counters.decreases,
            epochs: self.counters.epochs,
            learning_phase: learning.map(LearningPolicy::phase),
            last_action: learning.and_then(|p| p.last_pair()).map(|(_, action)| action),
        }
    }

    pub fn window_state(&self) -> &WindowState {
        &self.window
    }

    pub fn cwnd(&self) -> f64 {
        self.window.cwnd
    }

    pub fn smoothed_rtt_ms(&self) -> Option<f64> {
        self.rtt.get()
    }

    pub fn smoothed_throughput(&self) -> Option<f64> {
        self.throughput.get()
    }

    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut Policy {
        &mut self.policy
    }

    pub fn time_source(&self) -> &T {
        &self.time_source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;
    use crate::control::{AimdConfig, DelayConfig, PidConfig, UpdateReason};
    use crate::simulation::VirtualTime;

    fn aimd_controller(config: AimdConfig) -> (ControllerFacade<VirtualTime>, VirtualTime) {
        let time = VirtualTime::new();
        let config = ControllerConfig::new(PolicyConfig::Aimd(config));
        (config.build_with_time_source(time.clone()).unwrap(), time)
    }

    /// Send `seq` now and ack it `rtt` ms later.
    fn round_trip(
        controller: &mut ControllerFacade<VirtualTime>,
        time: &VirtualTime,
        seq: u64,
        rtt: u64,
    ) {
        let sent = time.now_ms();
        controller.on_datagram_sent(seq, sent);
        time.advance_ms(rtt);
        let now = time.now_ms();
        controller.on_ack_received(seq, sent, sent + rtt / 2, now);
    }

    #[test]
    fn test_initial_state() {
        let (controller, _) = aimd_controller(AimdConfig::default());
        assert_eq!(controller.window_size(), 1);
        assert_eq!(controller.timeout_ms(), 100);
        assert_eq!(controller.smoothed_rtt_ms(), None);
        assert_eq!(controller.outstanding(), 0);
    }

    #[test]
    fn test_fast_acks_grow_window() {
        let (mut controller, time) = aimd_controller(AimdConfig::default());
        let mut previous = controller.cwnd();
        for seq in 0..5 {
            round_trip(&mut controller, &time, seq, 10);
            assert!(controller.cwnd() > previous);
            previous = controller.cwnd();
        }
        assert_eq!(controller.smoothed_rtt_ms(), Some(10.0));
        assert_eq!(controller.stats().total_increases, 5);
    }

    #[test]
    fn test_unknown_ack_is_ignored() {
        let (mut controller, time) = aimd_controller(AimdConfig::default());
        round_trip(&mut controller, &time, 1, 20);
        let before = controller.cwnd();
        controller.on_ack_received(1, 0, 10, time.now_ms());
        controller.on_ack_received(42, 0, 10, time.now_ms());
        assert_eq!(controller.cwnd(), before);
        assert_eq!(controller.smoothed_rtt_ms(), Some(20.0));
        let stats = controller.stats();
        assert_eq!(stats.acks, 1);
        assert_eq!(stats.ignored_acks, 2);
    }

    #[test]
    fn test_timeout_purge_causes_one_decrease() {
        let (mut controller, time) = aimd_controller(AimdConfig::default());
        for seq in 0..40 {
            round_trip(&mut controller, &time, seq, 10);
        }
        let before = controller.cwnd();
        // Three datagrams go unanswered.
        for seq in 100..103 {
            controller.on_datagram_sent(seq, time.now_ms());
        }
        time.advance_ms(250);
        controller.on_tick();
        let stats = controller.stats();
        assert_eq!(stats.timeout_events, 1);
        assert_eq!(stats.outstanding, 0);
        // Severity 3.75 is ignored unless the policy scales by it.
        assert!((controller.cwnd() - before / 2.0).abs() < 1e-9);
        let aimd = controller.policy().as_aimd().unwrap();
        assert_eq!(aimd.gain(), AimdConfig::default().increase_gain);
    }

    #[test]
    fn test_severity_scaled_timeout() {
        let (mut controller, time) = aimd_controller(AimdConfig {
            scale_by_severity: true,
            ..AimdConfig::default()
        });
        for seq in 0..40 {
            round_trip(&mut controller, &time, seq, 10);
        }
        let before = controller.cwnd();
        controller.on_datagram_sent(100, time.now_ms());
        time.advance_ms(250);
        controller.on_tick();
        // 250 / 100 * 1.5
        assert!((controller.cwnd() - before / 3.75).abs() < 1e-9);
    }

    #[test]
    fn test_timeouts_follow_sender_clock() {
        // The sender stamps datagrams with its own clock, far ahead of `T`.
        const OFFSET: u64 = 1_000_000;
        let (mut controller, time) = aimd_controller(AimdConfig::default());
        let sender_now = |time: &VirtualTime| OFFSET + time.now_ms();

        controller.on_datagram_sent(1, sender_now(&time));
        time.advance_ms(5_000);
        let sent = sender_now(&time);
        controller.on_datagram_sent(2, sent);
        time.advance_ms(10);
        controller.on_ack_received(2, sent, sent + 5, sender_now(&time));

        let stats = controller.stats();
        assert_eq!(stats.timeout_events, 1);
        assert_eq!(stats.outstanding, 0);
        assert_eq!(controller.smoothed_rtt_ms(), Some(10.0));

        // Without any ack the tick extrapolates the sender clock.
        controller.on_datagram_sent(3, sender_now(&time));
        time.advance_ms(150);
        controller.on_tick();
        assert_eq!(controller.stats().timeout_events, 2);
        assert_eq!(controller.outstanding(), 0);
    }

    #[test]
    fn test_window_clamped_to_bounds() {
        let time = VirtualTime::new();
        let config = ControllerConfig::new(PolicyConfig::Aimd(AimdConfig {
            increase_gain: 50.0,
            ..AimdConfig::default()
        }))
        .with_window_bounds(2.0, 8.0);
        let mut controller = config.build_with_time_source(time.clone()).unwrap();
        assert_eq!(controller.window_size(), 2);
        for seq in 0..20 {
            round_trip(&mut controller, &time, seq, 5);
        }
        assert_eq!(controller.cwnd(), 8.0);
        assert_eq!(controller.window_size(), 8);
    }

    #[test]
    fn test_epoch_throughput_sample() {
        let (mut controller, time) = aimd_controller(AimdConfig::default());
        // 10 acks inside the first 100ms epoch, boundary crossed by the tick.
        for seq in 0..10 {
            round_trip(&mut controller, &time, seq, 9);
        }
        time.advance_ms(10);
        controller.on_tick();
        assert_eq!(controller.stats().epochs, 1);
        assert_eq!(controller.smoothed_throughput(), Some(100.0));
        assert_eq!(controller.window_state().epoch_packet_count, 0);
    }

    #[test]
    fn test_epoch_sample_after_stall_uses_elapsed_time() {
        let (mut controller, time) = aimd_controller(AimdConfig::default());
        for seq in 0..5 {
            round_trip(&mut controller, &time, seq, 10);
        }
        // Nothing calls in until 250ms: one boundary covering the whole stall.
        time.advance_ms(200);
        controller.on_tick();
        assert_eq!(controller.stats().epochs, 1);
        assert_eq!(controller.smoothed_throughput(), Some(20.0));
    }

    #[test]
    fn test_delay_policy_waits_for_estimate() {
        let time = VirtualTime::new();
        let config = ControllerConfig::new(PolicyConfig::Delay(DelayConfig::default()));
        let mut controller = config.build_with_time_source(time.clone()).unwrap();
        controller.on_datagram_sent(1, 0);
        time.advance_ms(150);
        controller.on_tick();
        // Timed out before any RTT sample: no decrease, entry purged.
        assert_eq!(controller.cwnd(), 1.0);
        assert_eq!(controller.outstanding(), 0);
    }

    #[test]
    fn test_pid_tracks_target() {
        let time = VirtualTime::new();
        let config = ControllerConfig::new(PolicyConfig::Pid(PidConfig {
            kp: 0.01,
            ..PidConfig::default()
        }))
        .with_initial_window(10.0);
        let mut controller = config.build_with_time_source(time.clone()).unwrap();
        round_trip(&mut controller, &time, 1, 30);
        // error 50 -> +0.5
        assert!((controller.cwnd() - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_learning_preset_acts_on_epochs() {
        let time = VirtualTime::new();
        let mut config = Preset::QLearning.config().with_seed(1);
        if let PolicyConfig::Learning(learning) = &mut config.policy {
            learning.engine.epsilon = 0.0;
        }
        let mut controller = config.build_with_time_source(time.clone()).unwrap();
        let stats = controller.stats();
        assert_eq!(
            stats.learning_phase,
            Some(crate::control::LearningPhase::Init)
        );

        // Window only moves on epoch boundaries.
        round_trip(&mut controller, &time, 0, 40);
        assert_eq!(controller.cwnd(), 1.0);
        time.advance_ms(60);
        controller.on_tick();

        // LOW throughput, 20ms one-way delay: seeded action 7.
        let stats = controller.stats();
        assert_eq!(stats.last_action, Some(7));
        assert_eq!(
            stats.learning_phase,
            Some(crate::control::LearningPhase::Active)
        );
        assert!((controller.cwnd() - 30.0 * 7.0 / 9.0).abs() < 1e-9);
        assert_eq!(controller.window_size(), 23);
    }

    #[test]
    fn test_reason_classification() {
        assert!(UpdateReason::Outage.is_decrease());
        assert!(!UpdateReason::Action(3).is_decrease());
    }
}
