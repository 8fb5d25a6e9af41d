use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::control::policy::{DecisionPolicy, PolicyEvent, Signals, UpdateReason, WindowUpdate};
use crate::control::state_mapper::{Bucket, CongestionState};
use crate::error::{ConfigError, EngineError};

use super::*;

// ============================================================================
// Engine
// ============================================================================

fn engine(config: RlEngineConfig, seed: u64) -> RlEngine {
    RlEngine::new(config, SmallRng::seed_from_u64(seed)).unwrap()
}

#[test]
fn test_zero_dimensions_rejected() {
    for (num_states, num_actions) in [(0, 9), (9, 0), (0, 0)] {
        let config = RlEngineConfig {
            num_states,
            num_actions,
            ..RlEngineConfig::default()
        };
        assert_eq!(
            RlEngine::with_seed(config, 1).unwrap_err(),
            EngineError::InvalidDimensions {
                num_states,
                num_actions
            }
        );
    }
}

#[test]
fn test_out_of_range_parameters_rejected() {
    let bad = [
        RlEngineConfig {
            alpha: 0.0,
            ..RlEngineConfig::default()
        },
        RlEngineConfig {
            alpha: 1.5,
            ..RlEngineConfig::default()
        },
        RlEngineConfig {
            epsilon: -0.1,
            ..RlEngineConfig::default()
        },
        RlEngineConfig {
            gamma: f64::NAN,
            ..RlEngineConfig::default()
        },
    ];
    for config in bad {
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidParameter { .. })
        ));
    }
}

#[test]
fn test_prefer_action_zeroes_row() {
    let mut engine = engine(RlEngineConfig::default(), 7);
    engine.prefer_action(0, 5, 3.0).unwrap();
    engine.prefer_action(0, 3, 900.0).unwrap();
    assert_eq!(engine.act_greedily(0), 3);
    for action in 0..engine.num_actions() {
        let expected = if action == 3 { 900.0 } else { 0.0 };
        assert_eq!(engine.value(0, action), expected);
    }
    // Other rows untouched.
    assert!(engine.row(1).iter().all(|v| *v == 0.0));
}

#[test]
fn test_prefer_action_out_of_range() {
    let mut engine = engine(RlEngineConfig::default(), 7);
    assert!(matches!(
        engine.prefer_action(0, 9, 1.0),
        Err(EngineError::InvalidPreference { action: 9, .. })
    ));
    assert!(matches!(
        engine.prefer_action(9, 0, 1.0),
        Err(EngineError::InvalidPreference { state: 9, .. })
    ));
}

#[test]
fn test_zero_epsilon_is_greedy() {
    let config = RlEngineConfig {
        epsilon: 0.0,
        ..RlEngineConfig::default()
    };
    let mut engine = engine(config, 42);
    engine.prefer_action(4, 6, 1.0).unwrap();
    for _ in 0..1_000 {
        assert_eq!(engine.act_eps_greedily(4), engine.act_greedily(4));
        assert_eq!(engine.act_eps_greedily(4), 6);
    }
}

#[test]
fn test_full_epsilon_explores_every_action() {
    let config = RlEngineConfig {
        epsilon: 1.0,
        ..RlEngineConfig::default()
    };
    let mut engine = engine(config, 3);
    let mut seen = [false; 9];
    for _ in 0..2_000 {
        seen[engine.act_eps_greedily(0)] = true;
    }
    assert!(seen.iter().all(|s| *s));
}

#[test]
fn test_alpha_one_gamma_zero_stores_reward() {
    let config = RlEngineConfig {
        alpha: 1.0,
        gamma: 0.0,
        ..RlEngineConfig::default()
    };
    let mut engine = engine(config, 11);
    engine.prefer_action(2, 1, 500.0).unwrap();
    engine.update_with_reward(0, 4, 2, 17.5);
    assert_eq!(engine.value(0, 4), 17.5);
    engine.update_with_reward(0, 4, 2, -3.0);
    assert_eq!(engine.value(0, 4), -3.0);
}

#[test]
fn test_greedy_bootstrap_uses_row_max() {
    let config = RlEngineConfig {
        alpha: 1.0,
        gamma: 0.5,
        epsilon: 1.0,
        bootstrap: BootstrapMode::Greedy,
        ..RlEngineConfig::default()
    };
    let mut engine = engine(config, 5);
    engine.prefer_action(1, 2, 10.0).unwrap();
    // Even with full exploration the target reads the best next value.
    engine.update_with_reward(0, 0, 1, 1.0);
    assert_eq!(engine.value(0, 0), 6.0);
}

#[test]
fn test_on_policy_update_uses_given_next_action() {
    let config = RlEngineConfig {
        alpha: 0.5,
        gamma: 1.0,
        ..RlEngineConfig::default()
    };
    let mut engine = engine(config, 5);
    engine.prefer_action(1, 2, 10.0).unwrap();
    engine.update_on_policy(0, 0, 2.0, 1, 3);
    // target = 2 + 1 * Q[1][3] = 2
    assert_eq!(engine.value(0, 0), 1.0);
    engine.update_on_policy(0, 0, 2.0, 1, 2);
    // target = 2 + 10 = 12; 1 + 0.5 * (12 - 1)
    assert_eq!(engine.value(0, 0), 6.5);
}

#[test]
fn test_same_seed_same_choices() {
    let config = RlEngineConfig {
        epsilon: 0.5,
        ..RlEngineConfig::default()
    };
    let mut a = engine(config, 99);
    let mut b = engine(config, 99);
    let picks_a: Vec<_> = (0..200).map(|_| a.act_eps_greedily(0)).collect();
    let picks_b: Vec<_> = (0..200).map(|_| b.act_eps_greedily(0)).collect();
    assert_eq!(picks_a, picks_b);
}

#[test]
fn test_set_epsilon_validates() {
    let mut engine = engine(RlEngineConfig::default(), 1);
    engine.set_epsilon(0.0).unwrap();
    assert_eq!(engine.epsilon(), 0.0);
    assert!(engine.set_epsilon(2.0).is_err());
    assert_eq!(engine.epsilon(), 0.0);
}

/// A single-state bandit where only action 7 pays. After enough epochs the
/// greedy choice must settle on it.
#[test]
fn test_converges_to_paying_action() {
    let config = RlEngineConfig {
        num_states: 1,
        num_actions: 9,
        alpha: 0.4,
        epsilon: 0.05,
        gamma: 0.9,
        verbose: false,
        bootstrap: BootstrapMode::Resampled,
    };
    let mut engine = engine(config, 0x5eed);
    for _ in 0..10_000 {
        let action = engine.act_eps_greedily(0);
        let reward = if action == 7 { 1.0 } else { 0.0 };
        engine.update_with_reward(0, action, 0, reward);
    }
    assert_eq!(engine.act_greedily(0), 7);
    assert!(engine.row(0).iter().all(|v| v.is_finite()));
}

// ============================================================================
// Deterministic harness for the learning policy
// ============================================================================

/// Drives a [`LearningPolicy`] with synthetic signals, one epoch at a time.
struct LearningHarness {
    policy: LearningPolicy,
    now_ms: u64,
    epoch_ms: u64,
    cwnd: f64,
}

impl LearningHarness {
    fn new(config: LearningConfig, seed: u64) -> Self {
        Self {
            policy: LearningPolicy::new(config, SmallRng::seed_from_u64(seed)).unwrap(),
            now_ms: 0,
            epoch_ms: 100,
            cwnd: 1.0,
        }
    }

    fn signals(&self, rtt_ms: Option<f64>, throughput: Option<f64>) -> Signals {
        Signals {
            now_ms: self.now_ms,
            cwnd: self.cwnd,
            min_window: 1.0,
            max_window: 64.0,
            timeout_ms: 100,
            smoothed_rtt_ms: rtt_ms,
            smoothed_throughput: throughput,
        }
    }

    fn ack(&mut self, rtt_ms: f64) -> WindowUpdate {
        let signals = self.signals(Some(rtt_ms), None);
        self.policy.decide(
            &PolicyEvent::Ack {
                rtt_ms,
                transit_ms: rtt_ms,
                baseline_rtt_ms: None,
            },
            &signals,
        )
    }

    /// Advance one epoch and deliver the boundary with the given smoothed
    /// signals. Applies any resize to the harness window.
    fn epoch(&mut self, rtt_ms: Option<f64>, throughput: Option<f64>) -> WindowUpdate {
        self.now_ms += self.epoch_ms;
        let signals = self.signals(rtt_ms, throughput);
        let update = self.policy.decide(&PolicyEvent::EpochBoundary, &signals);
        if let WindowUpdate::Resize { cwnd, .. } = update {
            self.cwnd = cwnd;
        }
        update
    }
}

fn greedy_config() -> LearningConfig {
    let mut config = LearningConfig::default();
    config.engine.epsilon = 0.0;
    config
}

#[test]
fn test_phase_transitions() {
    let mut harness = LearningHarness::new(greedy_config(), 1);
    assert_eq!(harness.policy.phase(), LearningPhase::Init);

    // Boundary before any RTT sample: ignored.
    assert_eq!(harness.epoch(None, Some(100.0)), WindowUpdate::Unchanged);
    assert_eq!(harness.policy.phase(), LearningPhase::Init);

    assert_eq!(harness.ack(40.0), WindowUpdate::Unchanged);
    assert_eq!(harness.policy.phase(), LearningPhase::Warm);

    // First boundary: action chosen, nothing learned.
    let before = harness.policy.engine().table().clone();
    let update = harness.epoch(Some(40.0), Some(100.0));
    assert!(matches!(update, WindowUpdate::Resize { .. }));
    assert_eq!(harness.policy.phase(), LearningPhase::Active);
    assert_eq!(harness.policy.engine().table(), &before);
    assert_eq!(harness.policy.last_reward(), None);

    // Second boundary: the previous pair is credited.
    harness.epoch(Some(40.0), Some(100.0));
    assert_ne!(harness.policy.engine().table(), &before);
    assert!(harness.policy.last_reward().is_some());
    assert_eq!(harness.policy.epochs(), 2);
}

#[test]
fn test_seeded_preferences_drive_first_action() {
    let mut harness = LearningHarness::new(greedy_config(), 1);
    harness.ack(40.0);
    // tp 100 pps -> LOW, delay 40/2 = 20ms -> LOW: preferred action 7
    let update = harness.epoch(Some(40.0), Some(100.0));
    let low_low = CongestionState::new(Bucket::Low, Bucket::Low).index();
    assert_eq!(harness.policy.last_pair(), Some((low_low, 7)));
    // Linear mapping: 30 * 7 / 9
    assert_eq!(
        update,
        WindowUpdate::resize(30.0 * 7.0 / 9.0, UpdateReason::Action(7))
    );
}

#[test]
fn test_delay_is_halved_before_mapping() {
    let mut harness = LearningHarness::new(greedy_config(), 1);
    harness.ack(300.0);
    // RTT 300 -> delay 150 (MED), throughput 600 -> HIGH: preferred action 2
    harness.epoch(Some(300.0), Some(600.0));
    let high_med = CongestionState::new(Bucket::High, Bucket::Med).index();
    assert_eq!(harness.policy.last_pair(), Some((high_med, 2)));
}

#[test]
fn test_timeouts_do_not_move_window() {
    let mut harness = LearningHarness::new(greedy_config(), 1);
    harness.ack(40.0);
    harness.epoch(Some(40.0), Some(100.0));
    let signals = harness.signals(Some(40.0), Some(100.0));
    assert_eq!(
        harness
            .policy
            .decide(&PolicyEvent::Timeout { severity: 5.0 }, &signals),
        WindowUpdate::Unchanged
    );
}

#[test]
fn test_action_zero_floors_to_min_window() {
    let mapping = ActionMapping::Linear { max_window: 30.0 };
    assert_eq!(mapping.window_for(0, 9, 1.0), 1.0);
    assert_eq!(mapping.window_for(9, 9, 1.0), 30.0);
}

#[test]
fn test_lookup_mapping() {
    let config = LearningConfig::sarsa();
    assert_eq!(config.mapping.window_for(0, 11, 1.0), 1.0);
    assert_eq!(config.mapping.window_for(10, 11, 1.0), 40.0);
}

#[test]
fn test_sarsa_preset_learns_on_policy() {
    let mut config = LearningConfig::sarsa();
    config.engine.epsilon = 0.0;
    let mut harness = LearningHarness::new(config, 1);
    harness.ack(40.0);
    harness.epoch(Some(40.0), Some(100.0));
    let (state, action) = harness.policy.last_pair().unwrap();
    assert_eq!(action, 8);
    // Same state again: reward 5 (LOW, LOW), bootstrap from Q[s][8] = 10.
    harness.epoch(Some(40.0), Some(100.0));
    let expected = 10.0 + 0.4 * (5.0 + 0.9 * 10.0 - 10.0);
    assert!((harness.policy.engine().value(state, action) - expected).abs() < 1e-9);
}

#[test]
fn test_power_reward_preset() {
    let mut config = LearningConfig::power();
    config.engine.epsilon = 0.0;
    let mut harness = LearningHarness::new(config, 1);
    harness.ack(50.0);
    harness.epoch(Some(50.0), Some(250.0));
    harness.epoch(Some(50.0), Some(250.0));
    assert_eq!(harness.policy.last_reward(), Some(5.0));
}

#[test]
fn test_presets_validate() {
    LearningConfig::default().validate().unwrap();
    LearningConfig::sarsa().validate().unwrap();
    LearningConfig::power().validate().unwrap();
}

#[test]
fn test_lookup_length_must_match_actions() {
    let mut config = LearningConfig::sarsa();
    config.engine.num_actions = 9;
    config.preferred_actions.clear();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidParameter {
            name: "learning.mapping.windows",
            ..
        })
    ));
}

#[test]
fn test_preference_outside_table_rejected() {
    let mut config = LearningConfig::default();
    config.preferred_actions.push(PreferredAction {
        state: 0,
        action: 9,
    });
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Engine(EngineError::InvalidPreference { .. }))
    ));
}
