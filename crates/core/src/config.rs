//! Controller configuration, named presets and logger setup.
//!
//! A [`ControllerConfig`] is fixed at construction. It can be written by hand,
//! loaded from TOML, or taken from one of the [`Preset`]s:
//!
//! ```toml
//! min-window = 1.0
//! max-window = 40.0
//! seed = 7
//!
//! [policy]
//! kind = "pid"
//! desired-rtt-ms = 60.0
//!
//! [timeout]
//! base-ms = 1000
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::control::{
    AimdConfig, ControllerFacade, DelayConfig, LearningConfig, PidConfig, PolicyKind, SpikeConfig,
    DEFAULT_SEVERITY_SCALER,
};
use crate::error::ConfigError;
use crate::simulation::{RealTime, TimeSource};

/// Environment variable consulted by [`ControllerConfig::from_env`].
pub const PRESET_ENV: &str = "DATAGRAM_CC_PRESET";

/// Policy selection plus its parameters. Tagged by `kind` in serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PolicyConfig {
    Aimd(AimdConfig),
    Delay(DelayConfig),
    Pid(PidConfig),
    Learning(LearningConfig),
}

impl PolicyConfig {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::Aimd(_) => PolicyKind::Aimd,
            Self::Delay(_) => PolicyKind::Delay,
            Self::Pid(_) => PolicyKind::Pid,
            Self::Learning(_) => PolicyKind::Learning,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Aimd(config) => config.validate(),
            Self::Delay(config) => config.validate(),
            Self::Pid(config) => config.validate(),
            Self::Learning(config) => config.validate(),
        }
    }
}

/// Retransmission timeout reported to the sender loop.
///
/// Fixed at `base_ms` unless `rtt_multiplier` is set, in which case it tracks
/// `smoothed_rtt * rtt_multiplier` within `[base_ms, max_ms]` once an RTT
/// estimate exists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TimeoutConfig {
    pub base_ms: u64,
    pub rtt_multiplier: Option<f64>,
    pub max_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::fixed(100)
    }
}

impl TimeoutConfig {
    pub fn fixed(base_ms: u64) -> Self {
        Self {
            base_ms,
            rtt_multiplier: None,
            max_ms: base_ms,
        }
    }

    pub fn timeout_ms(&self, smoothed_rtt_ms: Option<f64>) -> u64 {
        match (self.rtt_multiplier, smoothed_rtt_ms) {
            (Some(multiplier), Some(rtt)) => {
                let scaled = (rtt * multiplier).ceil();
                (scaled as u64).clamp(self.base_ms, self.max_ms)
            }
            _ => self.base_ms,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_ms == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "timeout.base-ms",
                value: 0.0,
            });
        }
        if self.max_ms < self.base_ms {
            return Err(ConfigError::InvalidParameter {
                name: "timeout.max-ms",
                value: self.max_ms as f64,
            });
        }
        if let Some(multiplier) = self.rtt_multiplier {
            if !(multiplier.is_finite() && multiplier > 0.0) {
                return Err(ConfigError::InvalidParameter {
                    name: "timeout.rtt-multiplier",
                    value: multiplier,
                });
            }
        }
        Ok(())
    }
}

/// Full controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ControllerConfig {
    pub policy: PolicyConfig,
    /// Window at construction, in datagrams. Starts at `min_window` when unset.
    pub initial_window: Option<f64>,
    pub min_window: f64,
    pub max_window: f64,
    /// EWMA weight of each new RTT sample.
    pub rtt_alpha: f64,
    /// EWMA weight of each new per-epoch throughput sample.
    pub throughput_alpha: f64,
    /// Length of one measurement epoch.
    pub epoch_ms: u64,
    pub timeout: TimeoutConfig,
    /// Multiplier in the timeout severity `elapsed / timeout * scaler`.
    pub severity_scaler: f64,
    /// Seed for the policy's random source. Entropy when absent.
    pub seed: Option<u64>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Preset::QLearning.config()
    }
}

impl ControllerConfig {
    /// Configuration with shared defaults around the given policy.
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            policy,
            initial_window: None,
            min_window: 1.0,
            max_window: 64.0,
            rtt_alpha: 0.1,
            throughput_alpha: 0.7,
            epoch_ms: 100,
            timeout: TimeoutConfig::default(),
            severity_scaler: DEFAULT_SEVERITY_SCALER,
            seed: None,
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// The preset named by `DATAGRAM_CC_PRESET`, or the default configuration
    /// when the variable is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(PRESET_ENV) {
            Ok(name) => Ok(name.parse::<Preset>()?.config()),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_window_bounds(mut self, min_window: f64, max_window: f64) -> Self {
        self.min_window = min_window;
        self.max_window = max_window;
        self.initial_window = self
            .initial_window
            .map(|w| w.clamp(min_window, max_window.max(min_window)));
        self
    }

    pub fn with_initial_window(mut self, initial_window: f64) -> Self {
        self.initial_window = Some(initial_window);
        self
    }

    /// The window a controller built from this configuration starts at.
    pub fn start_window(&self) -> f64 {
        self.initial_window.unwrap_or(self.min_window)
    }

    pub fn with_timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let initial = self.start_window();
        let bounds_ok = [self.min_window, initial, self.max_window]
            .iter()
            .all(|w| w.is_finite())
            && self.min_window >= 1.0
            && self.min_window <= initial
            && initial <= self.max_window;
        if !bounds_ok {
            return Err(ConfigError::InvalidWindowBounds {
                min: self.min_window,
                initial,
                max: self.max_window,
            });
        }
        for (name, alpha) in [
            ("rtt-alpha", self.rtt_alpha),
            ("throughput-alpha", self.throughput_alpha),
        ] {
            if !(alpha.is_finite() && alpha > 0.0 && alpha <= 1.0) {
                return Err(ConfigError::InvalidParameter { name, value: alpha });
            }
        }
        if self.epoch_ms == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "epoch-ms",
                value: 0.0,
            });
        }
        if !(self.severity_scaler.is_finite() && self.severity_scaler > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "severity-scaler",
                value: self.severity_scaler,
            });
        }
        self.timeout.validate()?;
        self.policy.validate()
    }

    /// Build a controller on the wall clock.
    pub fn build(&self) -> Result<ControllerFacade<RealTime>, ConfigError> {
        self.build_with_time_source(RealTime::new())
    }

    /// Build a controller on a caller-supplied clock, e.g. `VirtualTime` in
    /// tests and simulations.
    pub fn build_with_time_source<T: TimeSource>(
        &self,
        time_source: T,
    ) -> Result<ControllerFacade<T>, ConfigError> {
        ControllerFacade::new(self, time_source)
    }
}

/// Named, tuned configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// AIMD with gain creep, 200ms decrease cool-down, delay-spike reaction
    /// and severity-scaled timeout cuts.
    Aimd,
    /// Plain AIMD: fixed gain 1.5, window times 0.8 on loss, no cool-down.
    AimdClassic,
    /// Smoothed-RTT threshold at 100ms.
    Delay,
    /// Graded response to smoothed RTT bands.
    DelayBanded,
    /// Proportional control toward an 80ms RTT, window capped at 40.
    Pid,
    /// Seeded 9-action learner with a linear window mapping.
    QLearning,
    /// Seeded 11-action on-policy learner with a window ladder up to 40.
    Sarsa,
    /// Unseeded 11-action learner rewarded by throughput over RTT.
    Power,
}

impl Preset {
    pub const ALL: [Preset; 8] = [
        Preset::Aimd,
        Preset::AimdClassic,
        Preset::Delay,
        Preset::DelayBanded,
        Preset::Pid,
        Preset::QLearning,
        Preset::Sarsa,
        Preset::Power,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Aimd => "aimd",
            Preset::AimdClassic => "aimd-classic",
            Preset::Delay => "delay",
            Preset::DelayBanded => "delay-banded",
            Preset::Pid => "pid",
            Preset::QLearning => "qlearning",
            Preset::Sarsa => "sarsa",
            Preset::Power => "power",
        }
    }

    pub fn config(self) -> ControllerConfig {
        match self {
            Preset::Aimd => ControllerConfig {
                rtt_alpha: 0.3,
                ..ControllerConfig::new(PolicyConfig::Aimd(AimdConfig {
                    spike: Some(SpikeConfig::default()),
                    scale_by_severity: true,
                    ..AimdConfig::default()
                }))
            },
            Preset::AimdClassic => ControllerConfig::new(PolicyConfig::Aimd(AimdConfig {
                increase_gain: 1.5,
                gain_step: 0.0,
                decrease_factor: 1.25,
                cool_down_ms: 0,
                spike: None,
                scale_by_severity: false,
            })),
            Preset::Delay => ControllerConfig {
                timeout: TimeoutConfig::fixed(1_000),
                ..ControllerConfig::new(PolicyConfig::Delay(DelayConfig::default()))
            },
            Preset::DelayBanded => ControllerConfig {
                timeout: TimeoutConfig::fixed(1_000),
                ..ControllerConfig::new(PolicyConfig::Delay(DelayConfig::banded()))
            },
            Preset::Pid => ControllerConfig {
                max_window: 40.0,
                timeout: TimeoutConfig::fixed(1_000),
                ..ControllerConfig::new(PolicyConfig::Pid(PidConfig::default()))
            },
            Preset::QLearning => {
                ControllerConfig::new(PolicyConfig::Learning(LearningConfig::default()))
            }
            Preset::Sarsa => ControllerConfig::new(PolicyConfig::Learning(LearningConfig::sarsa())),
            Preset::Power => ControllerConfig {
                epoch_ms: 50,
                throughput_alpha: 0.1,
                ..ControllerConfig::new(PolicyConfig::Learning(LearningConfig::power()))
            },
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Preset::ALL
            .into_iter()
            .find(|preset| preset.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownPreset(s.to_string()))
    }
}

/// Install the global tracing subscriber once. Later calls are no-ops.
pub fn set_logger(level: Option<tracing::level_filters::LevelFilter>) {
    #[cfg(feature = "trace")]
    {
        use std::sync::atomic::{AtomicBool, Ordering};

        static LOGGER_SET: AtomicBool = AtomicBool::new(false);
        if LOGGER_SET
            .compare_exchange(false, true, Ordering::Release, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        if let Err(err) = crate::logging::tracer::init_tracer(level) {
            eprintln!("failed tracing initialization: {err}");
        }
    }
    #[cfg(not(feature = "trace"))]
    {
        let _ = level;
    }
}
