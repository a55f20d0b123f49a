//! Simulated race between a START and a FINISH unit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use sprintgate_core::{Clock, GateConfig, Role, State, SystemClock};
use sprintgate_detect::DistanceSource;
use sprintgate_node::peripherals::{render_time, ConsoleDisplay, FixedBattery, LogIndicator, SimButton};
use sprintgate_node::{Bench, Peripherals, RadioMedium, SprintScene, Unit};

/// Slack after the expected arrival before a race counts as lost.
const RACE_GRACE_MS: u32 = 5_000;

#[derive(Debug, Serialize)]
struct RaceReport {
    measured_ms: u32,
    display: String,
    sprint_ms: u32,
    seed: u64,
    lockstep: bool,
}

#[derive(Parser, Debug)]
#[command(name = "sprintgate")]
#[command(about = "Two-unit wireless timing gate, simulated", long_about = None)]
struct Cli {
    /// JSON configuration for one unit; the other unit mirrors it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Role of the unit the configuration describes
    #[arg(short, long)]
    role: Option<Role>,

    /// Seed for sensor noise and link loss
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Probability that a radio frame is lost
    #[arg(long, default_value_t = 0.0)]
    loss: f64,

    /// Simulated sprint duration
    #[arg(long, default_value_t = 4_000)]
    sprint_ms: u32,

    /// Step both units deterministically instead of running threads
    #[arg(long)]
    lockstep: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => GateConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GateConfig::default(),
    };
    if let Some(role) = cli.role {
        config.role = role;
    }
    config.validate()?;

    if !(0.0..=1.0).contains(&cli.loss) {
        bail!("--loss must be between 0 and 1, got {}", cli.loss);
    }

    let scene = SprintScene {
        sprint_ms: cli.sprint_ms,
        seed: cli.seed,
        ..SprintScene::default()
    };
    let deadline = scene.arrive_at_ms() + RACE_GRACE_MS;

    let measured = if cli.lockstep {
        let mut bench = Bench::sprint(&config, &scene, cli.loss)?;
        bench.race(deadline)
    } else {
        race_threaded(&config, &scene, cli.loss, deadline)?
    };

    match measured {
        Some(ms) => {
            let report = RaceReport {
                measured_ms: ms,
                display: render_time(ms),
                sprint_ms: scene.sprint_ms,
                seed: scene.seed,
                lockstep: cli.lockstep,
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "measured {} ({} ms, sprint {} ms)",
                    report.display, report.measured_ms, report.sprint_ms
                );
            }
            Ok(())
        }
        None => bail!("no finish within {deadline} ms"),
    }
}

fn race_threaded(
    config: &GateConfig,
    scene: &SprintScene,
    loss: f64,
    deadline_ms: u32,
) -> Result<Option<u32>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let medium = RadioMedium::new(scene.seed, loss);
    let (start_config, finish_config) = config.pair();

    let start = Unit::new(start_config.clone(), clock.clone())?;
    let finish = Unit::new(finish_config.clone(), clock.clone())?;
    medium.register(start_config.address, start.inbox());
    medium.register(finish_config.address, finish.inbox());

    let peripherals = |cfg: &GateConfig, source: Box<dyn DistanceSource>| Peripherals {
        source,
        transport: Box::new(medium.link(cfg.address, cfg.peer)),
        display: Box::new(ConsoleDisplay::new(cfg.role.to_string())),
        indicator: Box::new(LogIndicator::new(cfg.role.to_string())),
        battery: Box::new(FixedBattery(87)),
        button: Box::new(SimButton::new()),
    };
    let start = start.spawn(peripherals(
        &start_config,
        Box::new(scene.start_source(clock.clone())),
    ))?;
    let finish = finish.spawn(peripherals(
        &finish_config,
        Box::new(scene.finish_source(clock.clone())),
    ))?;

    let remaining = deadline_ms.saturating_sub(clock.now_ms());
    let result = start
        .wait_for(Duration::from_millis(u64::from(remaining)), |s| {
            s.state == State::Finish
        })
        .map(|s| s.measured_time);

    start.shutdown()?;
    finish.shutdown()?;
    Ok(result)
}
