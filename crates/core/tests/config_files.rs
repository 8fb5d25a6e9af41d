use std::io::Write;

use datagram_cc::config::{ControllerConfig, PolicyConfig, Preset, PRESET_ENV};
use datagram_cc::control::{ActionMapping, PolicyKind};
use datagram_cc::error::ConfigError;
use datagram_cc::simulation::VirtualTime;
use testresult::TestResult;

const LEARNING_TOML: &str = r#"
min-window = 2.0
max-window = 48.0
epoch-ms = 80
seed = 42

[timeout]
base-ms = 200
rtt-multiplier = 3.0
max-ms = 2000

[policy]
kind = "learning"
delay-divisor = 2.0

[policy.mapping]
type = "linear"
max-window = 48.0

[policy.engine]
alpha = 0.3
epsilon = 0.1
"#;

#[test]
fn load_learning_config_from_file() -> TestResult {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(LEARNING_TOML.as_bytes())?;

    let config = ControllerConfig::load(file.path())?;
    assert_eq!(config.seed, Some(42));
    assert_eq!(config.epoch_ms, 80);
    assert_eq!(config.timeout.timeout_ms(Some(100.0)), 300);
    assert_eq!(config.timeout.timeout_ms(None), 200);

    let PolicyConfig::Learning(learning) = &config.policy else {
        panic!("expected a learning policy, got {:?}", config.policy.kind());
    };
    assert_eq!(learning.engine.alpha, 0.3);
    assert_eq!(
        learning.mapping,
        ActionMapping::Linear { max_window: 48.0 }
    );

    let controller = config.build_with_time_source(VirtualTime::new())?;
    assert_eq!(controller.policy().kind(), PolicyKind::Learning);
    assert_eq!(controller.window_size(), 2);
    Ok(())
}

#[test]
fn preset_written_to_disk_loads_back() -> TestResult {
    let dir = tempfile::tempdir()?;
    for preset in Preset::ALL {
        let path = dir.path().join(format!("{preset}.toml"));
        std::fs::write(&path, preset.config().to_toml_string()?)?;
        let loaded = ControllerConfig::load(&path)?;
        assert_eq!(loaded, preset.config(), "{preset}");
    }
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ControllerConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)), "{err}");
}

#[test]
fn invalid_values_are_rejected_on_load() -> TestResult {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(b"min-window = 10.0\nmax-window = 5.0\n")?;
    let err = ControllerConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidWindowBounds { .. }), "{err}");
    Ok(())
}

#[test]
fn preset_from_environment() -> TestResult {
    std::env::set_var(PRESET_ENV, "delay_banded");
    let config = ControllerConfig::from_env();
    std::env::remove_var(PRESET_ENV);
    assert_eq!(config?, Preset::DelayBanded.config());
    Ok(())
}
