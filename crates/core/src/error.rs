use thiserror::Error;

/// Errors raised while constructing the reinforcement-learning engine.
///
/// These are programmer errors: they are reported once, at construction time,
/// and never from the decision path.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid table dimensions: {num_states} states x {num_actions} actions")]
    InvalidDimensions {
        num_states: usize,
        num_actions: usize,
    },

    #[error("invalid engine parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("preferred action ({state}, {action}) is outside the {num_states}x{num_actions} table")]
    InvalidPreference {
        state: usize,
        action: usize,
        num_states: usize,
        num_actions: usize,
    },
}

/// Errors raised while loading or validating controller configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("window bounds must satisfy 1 <= min ({min}) <= initial ({initial}) <= max ({max})")]
    InvalidWindowBounds { min: f64, initial: f64, max: f64 },

    #[error("{signal} thresholds must be finite and ascending, got [{low}, {high}]")]
    InvalidThresholds {
        signal: &'static str,
        low: f64,
        high: f64,
    },

    #[error("unknown preset: {0}")]
    UnknownPreset(String),

    #[error("configuration parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("configuration io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}
