//! derbyd - remote-command drive controller for a derby car
//!
//! This library ingests asynchronously-arriving command envelopes from a
//! pub/sub transport, validates and serializes them into a strictly ordered
//! action queue, executes each action as a blocking motion or configuration
//! primitive (with an obstacle-triggered early abort during forward motion),
//! and reports sensor/image telemetry once the queue drains.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use derbyd::{
//!     ConsoleTelemetry, Dispatcher, EnvelopeValidator, ModeState, SimulatedCar,
//!     SimulatedImageStore, TelemetryReporter, ingest_payload,
//! };
//! use std::sync::{Arc, atomic::AtomicBool};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (tx, rx) = tokio::sync::mpsc::channel(derbyd::COMMAND_CHANNEL_CAPACITY);
//!
//!     let reporter = TelemetryReporter::new(
//!         "car-7",
//!         Box::new(ConsoleTelemetry::new()),
//!         Box::new(SimulatedImageStore::new("derby-images")),
//!     );
//!     let mut dispatcher = Dispatcher::new(
//!         rx,
//!         ModeState::new("Blue"),
//!         SimulatedCar::new(208.92, 25.0),
//!         reporter,
//!         50,
//!         Arc::new(AtomicBool::new(false)),
//!     );
//!
//!     let mut validator = EnvelopeValidator::new();
//!     let envelope = br#"{"cloudTimestampMs":1,"mode":"manual","sensorRate":"onDemand",
//!                         "actions":[{"driveForwardMm":500}]}"#;
//!     ingest_payload(&mut validator, envelope, &tx).await?;
//!     drop(tx);
//!
//!     dispatcher.run().await
//! }
//! ```
//!
//! # Architecture
//!
//! - **EnvelopeValidator**: decodes and validates inbound command envelopes
//! - **Dispatcher**: the control loop draining the FIFO action queue
//! - **drive**: bounded motion primitive with obstacle abort
//! - **ModeState**: operating mode, cadence and run-time counters
//! - **TelemetryReporter**: sensor/image snapshot capture and publishing
//! - **CarHardware / ImageStore**: injected capability boundaries

pub mod camera;
pub mod config;
pub mod dispatch;
pub mod drive;
pub mod envelope;
pub mod error;
pub mod hardware;
pub mod state;
pub mod telemetry;
pub mod zenoh_transport;

// High-level exports for easy usage
pub use config::CarConfig;
pub use dispatch::{DispatchTiming, Dispatcher, COMMAND_CHANNEL_CAPACITY};
pub use drive::{drive, DriveOutcome, DEFAULT_POLL_INTERVAL};
pub use envelope::{
    ingest_payload, Action, CommandBatch, CommandEnvelope, EnvelopeValidator, IngestOutcome,
    Rejection,
};
pub use error::{CarError, Result};
pub use state::{ball_indicator, CarMode, ModeState, SensorRate};

// Capability boundary exports
pub use camera::{image_file_name, ImageStore, ImageUpload, SimulatedImageStore};
pub use hardware::{CarHardware, GripperPosition, LedColor, SimulatedCar, Wheel};
pub use telemetry::{
    CarStateReport, ConsoleTelemetry, NoOpTelemetry, SensorReport, TelemetryPublisher,
    TelemetryReporter, TelemetrySnapshot,
};

#[cfg(feature = "zenoh-integration")]
pub use zenoh_transport::{ZenohCommandSource, ZenohTelemetry};
