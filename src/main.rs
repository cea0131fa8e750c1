use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use intersection_sim::config::SimConfig;
use intersection_sim::engine::{SimulationEngine, TickHook};
use intersection_sim::simulation::{Direction, SimWorld};
use intersection_sim::sink::JsonLinesEventSink;

#[derive(Parser)]
#[command(name = "intersection_sim")]
#[command(about = "Four-way signalized intersection simulation")]
struct Cli {
    /// Run headless on the simulated clock only (default)
    #[arg(long, conflicts_with = "realtime")]
    headless: bool,

    /// Drive the simulation from the wall-clock tick loop
    #[arg(long)]
    realtime: bool,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of simulation ticks to run in headless mode
    #[arg(long, default_value = "600")]
    ticks: u32,

    /// Time delta per tick in seconds (overrides the config file)
    #[arg(long)]
    delta: Option<f32>,

    /// Wall-clock seconds to run in realtime mode
    #[arg(long, default_value = "10")]
    duration: u64,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Disable emergency signal preemption
    #[arg(long)]
    no_priority: bool,

    /// Approach an ambulance is dispatched on partway through the run
    #[arg(long, default_value = "north")]
    ambulance: Direction,

    /// Append simulation events to this JSON Lines file (realtime mode)
    #[arg(long)]
    event_log: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,intersection_sim=info"),
    )
    .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if cli.realtime && !cli.headless {
        let runtime = tokio::runtime::Runtime::new().context("Failed to build tokio runtime")?;
        runtime.block_on(run_realtime(config, &cli))
    } else {
        run_headless(config, &cli);
        Ok(())
    }
}

fn load_config(cli: &Cli) -> Result<SimConfig> {
    let mut config = match &cli.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if let Some(delta) = cli.delta {
        config.clock.delta_secs = delta;
    }
    if cli.seed.is_some() {
        config.engine.seed = cli.seed;
    }
    if cli.no_priority {
        config.engine.emergency_priority = false;
    }
    config.validate().context("Invalid command-line overrides")?;
    Ok(config)
}

/// Run the simulation in headless mode (no wall clock)
fn run_headless(config: SimConfig, cli: &Cli) {
    let delta = config.clock.delta_secs;
    let ticks = cli.ticks;
    info!("Running intersection simulation in headless mode...");
    info!("Ticks: {ticks}, Delta: {delta}s");

    // Calculate how many ticks equal 1 second of simulation time
    let ticks_per_second = (1.0 / delta).ceil().max(1.0) as u32;
    let ambulance_tick = ticks / 3;

    let mut world = SimWorld::with_config(config);
    world.seed_initial();
    world.start();

    println!("Initial state:");
    world.print_summary();
    println!();

    let mut tick = 0;
    while tick < ticks {
        let ticks_to_run = ticks_per_second.min(ticks - tick);

        for _ in 0..ticks_to_run {
            if tick == ambulance_tick {
                world.add_ambulance_to(cli.ambulance);
            }
            tick += 1;
            if let Some(phase) = world.tick(delta).phase_change {
                info!("[{:.1}s] Signals now {phase}", world.time);
            }
        }

        let stats = world.stats();
        info!(
            "[{:.1}s] {} | vehicles={} stopped={} waiting={} exited={} emergency={}",
            world.time,
            world.signal_phase(),
            stats.active_vehicles,
            stats.stopped_vehicles,
            stats.waiting_vehicles,
            stats.total_exited,
            world.emergency_active()
        );
    }

    world.stop();
    println!("=== Final State ===");
    world.print_summary();
    world.stats().log_completion();
}

/// Run the simulation on the wall-clock tick loop
async fn run_realtime(config: SimConfig, cli: &Cli) -> Result<()> {
    let mut hooks: Vec<Arc<dyn TickHook>> = Vec::new();
    if let Some(path) = &cli.event_log {
        hooks.push(Arc::new(JsonLinesEventSink::create(path)?));
        info!("Writing events to {}", path.display());
    }

    let mut world = SimWorld::with_config(config);
    world.seed_initial();
    let engine = SimulationEngine::launch_with_hooks(world, hooks);
    engine.start().await;

    let duration = Duration::from_secs(cli.duration);
    let mut updates = engine.subscribe();
    let ambulance_at = tokio::time::Instant::now() + duration / 3;
    let finish = tokio::time::sleep(duration);
    tokio::pin!(finish);
    let mut ambulance_sent = false;
    let mut last_logged = 0.0_f32;

    loop {
        tokio::select! {
            _ = &mut finish => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.time - last_logged >= 1.0 {
                    last_logged = snapshot.time;
                    info!(
                        "[{:.1}s] {} | vehicles={} emergency={}",
                        snapshot.time,
                        snapshot.signal_phase,
                        snapshot.vehicles.len(),
                        snapshot.emergency_active
                    );
                }
            }
        }

        if !ambulance_sent && tokio::time::Instant::now() >= ambulance_at {
            engine.add_ambulance(cli.ambulance.as_str()).await?;
            ambulance_sent = true;
        }
    }

    engine.stop().await;
    let stats = engine.stats().await;
    engine.shutdown().await?;
    stats.log_completion();
    Ok(())
}
