//! Factory simulator binary
//!
//! Runs the multi-line factory simulation. The message-bus bridge is
//! external; by default published payloads are traced, and `--no-mqtt`
//! drops them entirely. `--menu` starts a small console thread for
//! poking at the running simulation.

use clap::Parser;
use crossbeam_channel::{unbounded, Receiver};
use factory_simulator_core_rs::publisher::BusPublisher;
use factory_simulator_core_rs::{FactoryConfig, FactoryEngine, NoopPublisher};
use std::io::BufRead;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Parser)]
#[command(name = "factory-sim", about = "Multi-line factory simulator")]
struct Cli {
    /// Enable the interactive console thread (no effect on the core)
    #[arg(long)]
    menu: bool,

    /// Run with bus publish/subscribe no-oped
    #[arg(long)]
    no_mqtt: bool,

    /// RNG seed (same seed = same run)
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Simulated duration in seconds
    #[arg(long, default_value_t = 3600.0)]
    duration: f64,

    /// Number of production lines
    #[arg(long, default_value_t = 3)]
    lines: usize,

    /// Wall-clock pacing: 1.0 = real time, 0 = as fast as possible
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
}

/// Publisher that traces every payload; stands in for the bus bridge
struct TracePublisher;

impl BusPublisher for TracePublisher {
    fn publish(&mut self, topic: &str, payload: String) {
        debug!(topic, %payload, "publish");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = FactoryConfig {
        rng_seed: cli.seed,
        duration_seconds: cli.duration,
        num_lines: cli.lines,
        ..FactoryConfig::default()
    };

    let mut engine = match FactoryEngine::new(config) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("failed to start: {}", err);
            std::process::exit(1);
        }
    };

    if cli.no_mqtt {
        engine.set_publisher(Box::new(NoopPublisher));
        info!("bus publishing disabled (--no-mqtt)");
    } else {
        engine.set_publisher(Box::new(TracePublisher));
    }

    info!(
        seed = cli.seed,
        duration = cli.duration,
        lines = cli.lines,
        topic_root = engine.topics().root(),
        "simulation starting"
    );

    let menu_rx = cli.menu.then(spawn_menu_thread);

    let tick_sleep = if cli.speed > 0.0 {
        Some(Duration::from_secs_f64(
            engine.config().tick_seconds / cli.speed,
        ))
    } else {
        None
    };

    while !engine.is_finished() {
        let result = engine.tick();
        if result.faults_injected > 0 || result.products_delivered > 0 {
            debug!(
                time = result.time,
                delivered = result.products_delivered,
                faults = result.faults_injected,
                "tick"
            );
        }

        if let Some(rx) = &menu_rx {
            if handle_menu(rx, &engine) {
                warn!("quit requested from console");
                break;
            }
        }

        if let Some(sleep) = tick_sleep {
            std::thread::sleep(sleep);
        }
    }

    let score = engine.score();
    info!(
        total_score = format!("{:.1}", score.total_score),
        production = format!("{:.1}", score.production_efficiency_score),
        quality_cost = format!("{:.1}", score.quality_cost_score),
        agv = format!("{:.1}", score.agv_efficiency_score),
        "final score"
    );
}

/// Console thread: forwards stdin lines to the main loop
fn spawn_menu_thread() -> Receiver<String> {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for input in stdin.lock().lines() {
            let Ok(input) = input else { break };
            if tx.send(input).is_err() {
                break;
            }
        }
    });
    rx
}

/// Handle pending console commands; returns true on quit
fn handle_menu(rx: &Receiver<String>, engine: &FactoryEngine) -> bool {
    for input in rx.try_iter() {
        match input.trim() {
            "kpi" => {
                if let Ok(json) = serde_json::to_string_pretty(&engine.kpi_snapshot()) {
                    println!("{}", json);
                }
            }
            "score" => {
                let score = engine.score();
                println!(
                    "total {:.1} (production {:.1}, quality/cost {:.1}, agv {:.1})",
                    score.total_score,
                    score.production_efficiency_score,
                    score.quality_cost_score,
                    score.agv_efficiency_score
                );
            }
            "status" => {
                for idx in 0..engine.num_lines() {
                    if let Some(line) = engine.line(idx) {
                        println!(
                            "{}: raw {} finished {} scrapped {} orders {}",
                            line.name(),
                            line.raw_material().len(),
                            line.finished_goods().len(),
                            line.scrapped().len(),
                            line.orders().len()
                        );
                    }
                }
            }
            "quit" | "exit" => return true,
            "" => {}
            other => println!("unknown command '{}' (kpi | score | status | quit)", other),
        }
    }
    false
}
