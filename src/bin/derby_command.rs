//! Derby command client
//!
//! Builds a command envelope and publishes it to a car's command topic over
//! Zenoh. Useful for manual driving and end-to-end checks without the cloud
//! controller.

use clap::{Parser, Subcommand};

#[cfg(feature = "zenoh-integration")]
use {
    anyhow::Result,
    chrono::Utc,
    derbyd::zenoh_transport::command_topic,
    serde_json::json,
    tracing::info,
};

#[derive(Parser)]
#[command(name = "derby-command")]
#[command(about = "Send command envelopes to a derby car")]
#[command(version)]
struct Args {
    /// Target device identity (defaults to IOT_CORE_DEVICE_ID)
    #[arg(long)]
    device: Option<String>,

    /// Operating mode carried by the envelope
    #[arg(long, default_value = "manual")]
    mode: String,

    /// Telemetry cadence carried by the envelope (onDemand | continuous)
    #[arg(long, default_value = "onDemand")]
    sensor_rate: String,

    /// Mark a ball as captured in this envelope
    #[arg(long)]
    ball_captured: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive forward by the given distance in millimeters
    Forward { mm: i64 },
    /// Drive backward by the given distance in millimeters
    Backward { mm: i64 },
    /// Turn right by the given angle in degrees
    TurnRight { degrees: i64 },
    /// Turn left by the given angle in degrees
    TurnLeft { degrees: i64 },
    /// Set the active ball color (Red | Yellow | Green | Blue)
    SetColor { color: String },
    /// Set the actuation speed
    SetSpeed { speed: i64 },
    /// Move the gripper (open | close)
    Gripper { position: String },
    /// Request one telemetry snapshot
    RequestTelemetry,
}

#[cfg(feature = "zenoh-integration")]
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let device = args
        .device
        .clone()
        .or_else(|| std::env::var("IOT_CORE_DEVICE_ID").ok())
        .ok_or_else(|| anyhow::anyhow!("No device given; set --device or IOT_CORE_DEVICE_ID"))?;

    let action = match &args.command {
        Commands::Forward { mm } => json!({ "driveForwardMm": mm }),
        Commands::Backward { mm } => json!({ "driveBackwardMm": mm }),
        Commands::TurnRight { degrees } => json!({ "turnRight": degrees }),
        Commands::TurnLeft { degrees } => json!({ "turnLeft": degrees }),
        Commands::SetColor { color } => json!({ "setColor": color }),
        Commands::SetSpeed { speed } => json!({ "setSpeed": speed }),
        Commands::Gripper { position } => json!({ "gripperPosition": position }),
        Commands::RequestTelemetry => json!({ "sendSensorMessage": "true" }),
    };

    let mut envelope = json!({
        "cloudTimestampMs": Utc::now().timestamp_millis(),
        "mode": args.mode,
        "sensorRate": args.sensor_rate,
        "actions": [action],
    });
    if args.ball_captured {
        envelope["ballCaptured"] = json!(true);
    }

    let session = zenoh::open(zenoh::Config::default())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open Zenoh session: {}", e))?;

    let topic = command_topic(&device);
    info!("Publishing to '{}': {}", topic, envelope);
    session
        .put(topic, serde_json::to_vec(&envelope)?)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to publish command envelope: {}", e))?;

    session
        .close()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to close Zenoh session: {}", e))?;
    Ok(())
}

#[cfg(not(feature = "zenoh-integration"))]
fn main() {
    eprintln!("derby_command requires the zenoh-integration feature");
    eprintln!("Build with: cargo build --bin derby_command --features zenoh-integration");
    std::process::exit(1);
}
