//! # NTRC Tracer Binary
//!
//! Runs the push-buffer tracer against the simulated FIFO and exposes the
//! `ntrc!` command set on stdin. Each command line prints one
//! `<status>- <message>` response line.
//!
//! # Usage
//!
//! ```bash
//! # Defaults, simulated producer at 4 words per tick
//! echo -e "ntrc!attach\nntrc!wait_stable_pb\nntrc!dma_addrs" | ntrc
//!
//! # Config file, verbose JSON logs
//! ntrc --config /etc/ntrc/ntrc.toml -v --json
//! ```

use clap::Parser;
use crossbeam_channel::{bounded, select, unbounded};
use ntrc_common::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
use ntrc_common::consts::DEFAULT_CONFIG_PATH;
use ntrc_common::tracer::config::TracerConfig;
use ntrc_common::tracer::state::TracerState;
use ntrc_tracer::{CommandProcessor, SimulatedFifo, Tracer, format_notification};
use serde::Deserialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// NTRC - push-buffer tracer state machine
#[derive(Parser, Debug)]
#[command(name = "ntrc")]
#[command(version)]
#[command(about = "Push-buffer tracer state machine driven by ntrc! commands on stdin")]
#[command(long_about = None)]
struct Args {
    /// Path to ntrc.toml. Falls back to /etc/ntrc/ntrc.toml, then built-in defaults.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    /// Command words the simulated producer submits per poll tick
    #[arg(long, default_value_t = 4)]
    producer_rate: u32,
}

/// Contents of `ntrc.toml`.
#[derive(Debug, Default, Deserialize)]
struct NtrcConfig {
    #[serde(default)]
    shared: SharedConfig,
    #[serde(default)]
    tracer: TracerConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("ntrc failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logging must be up before any config error is returned.
    let config = load_config(&args);
    let level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, level);

    let config = config?;
    config.shared.validate()?;

    info!(
        "{} v{} starting...",
        config.shared.service_name,
        env!("CARGO_PKG_VERSION")
    );

    let sim = Arc::new(SimulatedFifo::default());
    let tracer = Arc::new(Tracer::initialize(
        sim.clone(),
        config.tracer.clone(),
        Some(Box::new(|state: TracerState| {
            info!("{}", format_notification(state));
        })),
    )?);

    // Setup signal handler.
    let (stop_tx, stop_rx) = bounded::<()>(1);
    {
        let tracer = Arc::clone(&tracer);
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            tracer.destroy();
            let _ = stop_tx.try_send(());
        })?;
    }

    let producing = Arc::new(AtomicBool::new(true));
    let producer = {
        let sim = Arc::clone(&sim);
        let tracer = Arc::clone(&tracer);
        let producing = Arc::clone(&producing);
        let rate = args.producer_rate;
        let tick = config.tracer.poll_interval();
        std::thread::Builder::new()
            .name("ntrc-producer".to_string())
            .spawn(move || {
                while producing.load(Ordering::Relaxed) {
                    if rate > 0 && tracer.state() == TracerState::Idle {
                        sim.submit(rate);
                    }
                    std::thread::sleep(tick);
                }
            })?
    };

    let (line_tx, line_rx) = unbounded::<String>();
    std::thread::Builder::new()
        .name("ntrc-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) if line.trim().is_empty() => {}
                    Ok(line) => {
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        })?;

    let processor = CommandProcessor::new(&tracer);
    loop {
        select! {
            recv(line_rx) -> line => match line {
                Ok(line) => println!("{}", processor.process(&line)),
                Err(_) => {
                    info!("Command input closed");
                    break;
                }
            },
            recv(stop_rx) -> _ => break,
        }
    }

    tracer.destroy();
    producing.store(false, Ordering::Relaxed);
    tracer.join()?;
    if producer.join().is_err() {
        error!("Producer thread panicked");
    }

    info!("ntrc shutdown complete (state {})", tracer.state());
    Ok(())
}

/// Load `--config`, else the well-known path if present, else defaults.
fn load_config(args: &Args) -> Result<NtrcConfig, ConfigError> {
    match &args.config {
        Some(path) => NtrcConfig::load(path),
        None => Ok(NtrcConfig::load_if_exists(Path::new(DEFAULT_CONFIG_PATH))?
            .unwrap_or_default()),
    }
}

/// Setup tracing subscriber based on CLI arguments and configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        configured
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    // stdout carries command responses only.
    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
