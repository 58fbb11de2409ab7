//! Telemetry snapshot and publishing
//!
//! Wire types for outbound device telemetry, a trait-based publisher
//! interface so the core is not coupled to any transport mechanism, and the
//! reporter that gathers live sensor state into a fresh snapshot per report.

use crate::camera::ImageStore;
use crate::hardware::{CarHardware, LedColor};
use crate::state::ModeState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Brief pause before taking a photo to prevent blurry images
const PHOTO_SETTLE: Duration = Duration::from_millis(100);

/// Car state section of a telemetry snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarStateReport {
    pub color: String,
    pub battery_left: f64,
    pub balls_collected: u32,
    /// Present (and true) only on the first report after an obstacle abort
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obstacle_found: Option<bool>,
}

/// Sensor section of a telemetry snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReport {
    /// Null when the distance sensor had no measurement
    pub front_laser_distance_mm: Option<f64>,
    pub front_camera_image_path: String,
    #[serde(rename = "frontCameraImagePathGCS")]
    pub front_camera_image_path_gcs: String,
}

/// One outbound telemetry message
///
/// Constructed fresh per report and never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub timestamp_ms: i64,
    pub car_id: String,
    pub car_state: CarStateReport,
    pub sensors: SensorReport,
}

/// Trait for publishing telemetry snapshots
///
/// Allows the core to run against any telemetry backend without being
/// coupled to a specific transport mechanism.
#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    /// Publish one snapshot; failures propagate to the caller unretried
    async fn publish(&self, snapshot: &TelemetrySnapshot) -> Result<()>;

    /// Resolves once the underlying transport is ready to publish
    async fn wait_ready(&self) -> Result<()> {
        Ok(())
    }
}

/// No-operation telemetry publisher
///
/// Discards all snapshots. Used when no telemetry is desired.
#[derive(Debug, Clone)]
pub struct NoOpTelemetry;

#[async_trait]
impl TelemetryPublisher for NoOpTelemetry {
    async fn publish(&self, _snapshot: &TelemetrySnapshot) -> Result<()> {
        Ok(())
    }
}

/// Console telemetry publisher for debugging
///
/// Prints every snapshot to stdout in JSON form.
#[derive(Debug, Clone)]
pub struct ConsoleTelemetry {
    pub pretty_print: bool,
}

impl ConsoleTelemetry {
    pub fn new() -> Self {
        Self {
            pretty_print: false,
        }
    }

    pub fn pretty() -> Self {
        Self { pretty_print: true }
    }
}

impl Default for ConsoleTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryPublisher for ConsoleTelemetry {
    async fn publish(&self, snapshot: &TelemetrySnapshot) -> Result<()> {
        if self.pretty_print {
            println!("{}", serde_json::to_string_pretty(snapshot)?);
        } else {
            println!("{}", serde_json::to_string(snapshot)?);
        }
        Ok(())
    }
}

/// Builds and publishes telemetry snapshots
///
/// The dispatch loop invokes this only when the action queue is drained; the
/// reporter itself never checks cadence.
pub struct TelemetryReporter {
    car_id: String,
    publisher: Box<dyn TelemetryPublisher>,
    images: Box<dyn ImageStore>,
}

impl TelemetryReporter {
    pub fn new(
        car_id: &str,
        publisher: Box<dyn TelemetryPublisher>,
        images: Box<dyn ImageStore>,
    ) -> Self {
        Self {
            car_id: car_id.to_string(),
            publisher,
            images,
        }
    }

    /// Read live sensors, capture and upload an image, publish one snapshot
    ///
    /// Consumes the one-shot obstacle flag and clears the pending-send flag
    /// after a successful publish. Capture and publish failures propagate.
    pub async fn capture_and_publish(
        &mut self,
        hw: &mut dyn CarHardware,
        state: &mut ModeState,
    ) -> Result<()> {
        let battery = hw.read_battery_voltage()?;
        let distance = hw.read_distance_mm()?;
        debug!("Telemetry read: battery={}V distance={:?}mm", battery, distance);

        hw.set_status_indicator(LedColor::Yellow)?;
        sleep(PHOTO_SETTLE).await;

        let local_path = self
            .images
            .capture()
            .await
            .context("Failed to capture camera image")?;
        let upload = self
            .images
            .upload(&local_path)
            .await
            .context("Failed to upload camera image")?;

        let snapshot = TelemetrySnapshot {
            timestamp_ms: Utc::now().timestamp_millis(),
            car_id: self.car_id.clone(),
            car_state: CarStateReport {
                color: state.active_color.clone(),
                battery_left: battery,
                balls_collected: state.balls_collected,
                obstacle_found: state.take_obstacle().then_some(true),
            },
            sensors: SensorReport {
                front_laser_distance_mm: distance,
                front_camera_image_path: upload.public_url,
                front_camera_image_path_gcs: upload.storage_uri,
            },
        };

        self.publisher
            .publish(&snapshot)
            .await
            .context("Failed to publish telemetry snapshot")?;

        state.send_next_message = false;
        hw.set_status_indicator(LedColor::Green)?;
        Ok(())
    }

    /// Bounded wait for the publisher's transport to come up
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.publisher.wait_ready())
            .await
            .map_err(|_| anyhow::anyhow!("Transport not ready within {:?}", timeout))?
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every published snapshot for inspection by tests
    #[derive(Clone, Default)]
    pub struct RecordingTelemetry {
        pub published: Arc<Mutex<Vec<TelemetrySnapshot>>>,
    }

    #[async_trait]
    impl TelemetryPublisher for RecordingTelemetry {
        async fn publish(&self, snapshot: &TelemetrySnapshot) -> Result<()> {
            self.published.lock().unwrap().push(snapshot.clone());
            Ok(())
        }
    }

    /// Fails every publish, for fatal-path tests
    pub struct FailingTelemetry;

    #[async_trait]
    impl TelemetryPublisher for FailingTelemetry {
        async fn publish(&self, _snapshot: &TelemetrySnapshot) -> Result<()> {
            Err(anyhow::anyhow!("broker connection lost"))
        }
    }
}
