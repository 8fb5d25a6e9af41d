use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use datagram_cc::config::{set_logger, ControllerConfig, Preset};
use datagram_cc::simulation::{LinkConfig, SimulatedFlow};
use tracing::level_filters::LevelFilter;

/// Run a congestion controller against a simulated bottleneck link.
#[derive(Parser, Debug)]
#[command(name = "ccsim", version, about)]
struct Args {
    /// Named preset to run. Ignored when --config is given.
    #[arg(long, env = "DATAGRAM_CC_PRESET", default_value = "qlearning")]
    preset: Preset,

    /// TOML controller configuration.
    #[arg(long, env = "DATAGRAM_CC_CONFIG")]
    config: Option<PathBuf>,

    /// Simulated time to run for.
    #[arg(long, default_value_t = 10_000)]
    duration_ms: u64,

    /// Bottleneck service rate in packets per second.
    #[arg(long, default_value_t = 500.0)]
    rate_pps: f64,

    /// One-way propagation delay.
    #[arg(long, default_value_t = 20)]
    delay_ms: u64,

    /// Bottleneck queue capacity in packets.
    #[arg(long, default_value_t = 100)]
    queue: usize,

    /// Random loss probability.
    #[arg(long, default_value_t = 0.0)]
    loss: f64,

    /// Seed for the link and, unless the configuration sets one, the controller.
    #[arg(long, env = "DATAGRAM_CC_SEED", default_value_t = 0)]
    seed: u64,

    /// Log level; RUST_LOG takes precedence.
    #[arg(long)]
    log_level: Option<LevelFilter>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    set_logger(args.log_level);

    let config = match &args.config {
        Some(path) => ControllerConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => args.preset.config(),
    };
    if !(args.rate_pps.is_finite() && args.rate_pps > 0.0) {
        anyhow::bail!("--rate-pps must be positive, got {}", args.rate_pps);
    }
    if !(0.0..1.0).contains(&args.loss) {
        anyhow::bail!("--loss must be in [0, 1), got {}", args.loss);
    }

    let link = LinkConfig::new(args.rate_pps, args.delay_ms, args.queue).with_loss_rate(args.loss);
    let mut flow =
        SimulatedFlow::new(&config, link, args.seed).context("building the controller")?;
    let summary = flow.run_for(args.duration_ms);

    match &args.config {
        Some(path) => println!("config:          {}", path.display()),
        None => println!("preset:          {}", args.preset),
    }
    println!(
        "link:            {} pkt/s, {} ms one-way, queue {}, loss {}",
        args.rate_pps, args.delay_ms, args.queue, args.loss
    );
    println!("{summary}");
    Ok(())
}
