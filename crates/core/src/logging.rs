//! Tracing subscriber setup for binaries and tests.
//!
//! Library code only emits `tracing` events; installing a subscriber is left to
//! the embedding program, which may call [`crate::config::set_logger`].
//!
//! Environment:
//! - `RUST_LOG`: standard `EnvFilter` directives.
//! - `DATAGRAM_CC_LOG_FORMAT=json`: one JSON object per event.
//! - `DATAGRAM_CC_LOG_TO_STDERR`: write to stderr instead of stdout.
//! - `DATAGRAM_CC_DISABLE_LOGS`: install nothing.

#[cfg(feature = "trace")]
pub(crate) mod tracer {
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::{layer::SubscriberExt, Layer, Registry};

    pub const LOG_FORMAT_ENV: &str = "DATAGRAM_CC_LOG_FORMAT";
    pub const LOG_TO_STDERR_ENV: &str = "DATAGRAM_CC_LOG_TO_STDERR";
    pub const DISABLE_LOGS_ENV: &str = "DATAGRAM_CC_DISABLE_LOGS";

    pub fn init_tracer(level: Option<LevelFilter>) -> anyhow::Result<()> {
        if std::env::var(DISABLE_LOGS_ENV).is_ok() {
            return Ok(());
        }

        let default_filter = if cfg!(any(test, debug_assertions)) {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        let filter_layer = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(level.unwrap_or(default_filter).into())
            .from_env_lossy();

        let json = std::env::var(LOG_FORMAT_ENV)
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let to_stderr = std::env::var(LOG_TO_STDERR_ENV).is_ok();

        let fmt_layer = match (json, to_stderr) {
            (true, true) => tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .boxed(),
            (true, false) => tracing_subscriber::fmt::layer().json().boxed(),
            (false, to_stderr) => {
                let layer = tracing_subscriber::fmt::layer().with_level(true);
                let layer = if cfg!(any(test, debug_assertions)) {
                    layer.with_file(true).with_line_number(true)
                } else {
                    layer
                };
                if to_stderr {
                    layer.with_writer(std::io::stderr).boxed()
                } else {
                    layer.boxed()
                }
            }
        };

        let subscriber = Registry::default().with(fmt_layer.with_filter(filter_layer));
        tracing::subscriber::set_global_default(subscriber)?;
        Ok(())
    }
}
