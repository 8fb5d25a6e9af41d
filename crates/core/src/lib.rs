/// Controller configuration, named presets and logger installation.
pub mod config;

/// Window decisions: the controller facade, its decision policies and the
/// signals they consume.
pub mod control;

/// Construction-time error types.
pub mod error;

/// Smoothing of RTT and throughput samples.
pub mod estimator;

/// Tracing subscriber setup. Only used through [`config::set_logger`].
mod logging;

/// Clock abstraction plus a deterministic link and flow simulator.
pub mod simulation;

pub use config::{ControllerConfig, PolicyConfig, Preset, TimeoutConfig};
pub use control::{ControllerFacade, ControllerStats, Policy, PolicyKind, WindowState};
pub use error::{ConfigError, EngineError};
pub use estimator::Ewma;
