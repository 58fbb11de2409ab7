//! Derby car daemon
//!
//! Wires the command ingestion context to the dispatch loop:
//! - with the `zenoh-integration` feature, command envelopes arrive on a
//!   Zenoh subscription and telemetry is published back over Zenoh; stdin
//!   becomes an interactive control surface ('q' + Enter quits) unless
//!   `--non-interactive` is given
//! - without it, newline-delimited JSON envelopes are read from stdin and
//!   telemetry snapshots are printed to stdout
//!
//! The physical motor/sensor binding is an injected capability; this binary
//! links the simulated car so the daemon runs end to end without hardware.

use anyhow::{Context, Result};
use clap::Parser;
use derbyd::{
    ingest_payload, CarConfig, CommandBatch, Dispatcher, EnvelopeValidator, ModeState,
    SimulatedCar, SimulatedImageStore, TelemetryPublisher, TelemetryReporter,
    COMMAND_CHANNEL_CAPACITY,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Bounded wait for the outbound transport before the dispatch loop starts
const TRANSPORT_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Wheel circumference of the drive wheels (mm)
const WHEEL_CIRCUMFERENCE_MM: f64 = 208.92;

/// Simulated encoder travel per sensor poll (degrees)
const SIM_STEP_DEGREES: f64 = 25.0;

#[derive(Parser)]
#[command(name = "derbyd")]
#[command(about = "Derby car daemon - remote-command drive controller")]
#[command(version)]
struct Args {
    /// Disable the interactive control surface
    #[arg(long)]
    non_interactive: bool,

    /// Pretty-print telemetry snapshots (stdout transport only)
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Derby Car Daemon");
    info!("{}", "=".repeat(50));

    // Startup validation pass: a missing parameter is fatal before any loop
    let config = CarConfig::from_env().context("Configuration validation failed")?;
    info!("Project: {}", config.project);
    info!("Car: {} (ball color {})", config.car_id, config.car_color);
    info!("Image bucket: {}", config.camera_bucket);
    info!(
        "Image resolution: {}x{}",
        config.horizontal_resolution, config.vertical_resolution
    );
    info!("Barrier dampening: {} mm", config.barrier_dampening_mm);

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_handler(shutdown.clone());

    let (publisher, batches_rx) = connect_transport(&config, &args).await?;

    let reporter = TelemetryReporter::new(
        &config.car_id,
        publisher,
        Box::new(SimulatedImageStore::new(&config.camera_bucket)),
    );
    reporter
        .wait_ready(TRANSPORT_READY_TIMEOUT)
        .await
        .context("Outbound transport did not become ready")?;
    info!("Outbound transport ready");

    if !args.non_interactive {
        spawn_interactive_surface(shutdown.clone());
    }

    let mut dispatcher = Dispatcher::new(
        batches_rx,
        ModeState::new(&config.car_color),
        SimulatedCar::new(WHEEL_CIRCUMFERENCE_MM, SIM_STEP_DEGREES),
        reporter,
        config.barrier_dampening_mm,
        shutdown,
    );

    dispatcher.run().await?;

    info!("Shutdown complete");
    Ok(())
}

/// Set up the command source and telemetry publisher (Zenoh build)
#[cfg(feature = "zenoh-integration")]
async fn connect_transport(
    config: &CarConfig,
    _args: &Args,
) -> Result<(Box<dyn TelemetryPublisher>, mpsc::Receiver<CommandBatch>)> {
    use derbyd::zenoh_transport::{command_topic, telemetry_topic};
    use derbyd::{ZenohCommandSource, ZenohTelemetry};

    info!("Opening Zenoh session");
    let session = Arc::new(
        zenoh::open(zenoh::Config::default())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open Zenoh session: {}", e))?,
    );

    let publisher = ZenohTelemetry::new(
        session.clone(),
        &telemetry_topic(&config.device_id, &config.sensor_topic),
    )
    .await?;
    let source = ZenohCommandSource::new(session, &command_topic(&config.device_id)).await?;

    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    tokio::spawn(run_zenoh_ingestion(source, tx));

    Ok((Box::new(publisher), rx))
}

#[cfg(feature = "zenoh-integration")]
async fn run_zenoh_ingestion(source: derbyd::ZenohCommandSource, tx: mpsc::Sender<CommandBatch>) {
    let mut validator = EnvelopeValidator::new();

    loop {
        match source.recv().await {
            Ok(payload) => {
                if let Err(e) = ingest_payload(&mut validator, &payload, &tx).await {
                    error!("Failed to ingest envelope: {}", e);
                    if tx.is_closed() {
                        break;
                    }
                }
            }
            Err(e) => {
                error!("Command subscription error: {}", e);
                break;
            }
        }
    }
}

/// Set up the command source and telemetry publisher (stdin/stdout build)
#[cfg(not(feature = "zenoh-integration"))]
async fn connect_transport(
    _config: &CarConfig,
    args: &Args,
) -> Result<(Box<dyn TelemetryPublisher>, mpsc::Receiver<CommandBatch>)> {
    use derbyd::ConsoleTelemetry;

    let publisher: Box<dyn TelemetryPublisher> = if args.pretty {
        Box::new(ConsoleTelemetry::pretty())
    } else {
        Box::new(ConsoleTelemetry::new())
    };

    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    tokio::spawn(run_stdin_ingestion(tx));
    info!("Reading command envelopes from stdin; telemetry goes to stdout");

    Ok((publisher, rx))
}

#[cfg(not(feature = "zenoh-integration"))]
async fn run_stdin_ingestion(tx: mpsc::Sender<CommandBatch>) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let mut validator = EnvelopeValidator::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                // Skip empty lines and comment lines
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Err(e) = ingest_payload(&mut validator, line.as_bytes(), &tx).await {
                    error!("Failed to ingest envelope: {}", e);
                    if tx.is_closed() {
                        break;
                    }
                }
            }
            Ok(None) => {
                info!("End of input reached");
                break;
            }
            Err(e) => {
                error!("Failed to read from stdin: {}", e);
                break;
            }
        }
    }
}

/// Interactive control surface: 'q' + Enter requests shutdown
///
/// Only wired when stdin is not already the envelope source.
#[cfg(feature = "zenoh-integration")]
fn spawn_interactive_surface(shutdown: Arc<AtomicBool>) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        info!("Interactive mode: type 'q' + Enter to quit");
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim() == "q" {
                info!("Quit requested from the console");
                shutdown.store(true, Ordering::Relaxed);
                break;
            }
        }
    });
}

#[cfg(not(feature = "zenoh-integration"))]
fn spawn_interactive_surface(_shutdown: Arc<AtomicBool>) {
    // stdin carries the command envelopes in this build
}

fn spawn_signal_handler(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        shutdown.store(true, Ordering::Relaxed);
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
