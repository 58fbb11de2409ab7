//! Action dispatch loop
//!
//! Single consumer of the validated command stream. Each iteration drains
//! newly arrived command batches into the FIFO action queue, executes exactly
//! one action as a blocking primitive, and only once the queue is empty
//! evaluates the telemetry gate. That strict priority guarantees commands are
//! never delayed behind a telemetry cycle and telemetry never observes a
//! half-applied command batch.

use crate::drive::{drive, DriveOutcome};
use crate::envelope::{Action, CommandBatch};
use crate::hardware::{CarHardware, GripperPosition};
use crate::state::{ball_indicator, ModeState};
use crate::telemetry::TelemetryReporter;
use anyhow::Result;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Capacity of the channel between the ingestion context and the loop
pub const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Timing knobs for the loop and its blocking primitives
///
/// Injectable so the poll interval and settle delays are testable in
/// isolation from real hardware timing.
#[derive(Debug, Clone)]
pub struct DispatchTiming {
    /// Distance-sensor poll interval inside a motion
    pub poll_interval: Duration,
    /// Bounded wait for the next command batch when there is nothing to do
    pub idle_wait: Duration,
    /// Settle delay after a turn, preventing overlapping commands
    pub turn_settle: Duration,
    /// Settle delay after closing the gripper
    pub gripper_settle: Duration,
}

impl Default for DispatchTiming {
    fn default() -> Self {
        Self {
            poll_interval: crate::drive::DEFAULT_POLL_INTERVAL,
            idle_wait: Duration::from_secs(2),
            turn_settle: Duration::from_millis(500),
            gripper_settle: Duration::from_millis(300),
        }
    }
}

/// The control loop: action queue, mode state and telemetry gate
pub struct Dispatcher<H: CarHardware> {
    batches: mpsc::Receiver<CommandBatch>,
    queue: VecDeque<Action>,
    state: ModeState,
    hw: H,
    reporter: TelemetryReporter,
    dampening_mm: i64,
    timing: DispatchTiming,
    startup_timestamp_ms: i64,
    sequence_in_progress: bool,
    shutdown: Arc<AtomicBool>,
}

impl<H: CarHardware> Dispatcher<H> {
    pub fn new(
        batches: mpsc::Receiver<CommandBatch>,
        state: ModeState,
        hw: H,
        reporter: TelemetryReporter,
        dampening_mm: i64,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            batches,
            queue: VecDeque::new(),
            state,
            hw,
            reporter,
            dampening_mm,
            timing: DispatchTiming::default(),
            startup_timestamp_ms: Utc::now().timestamp_millis(),
            sequence_in_progress: false,
            shutdown,
        }
    }

    /// Replace the default timing knobs
    pub fn with_timing(mut self, timing: DispatchTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn state(&self) -> &ModeState {
        &self.state
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn queued_actions(&self) -> usize {
        self.queue.len()
    }

    /// Run until shutdown is signaled or the command channel closes
    ///
    /// Recoverable conditions never interrupt the loop; hardware, capture
    /// and publish failures propagate and terminate the run.
    pub async fn run(&mut self) -> Result<()> {
        info!("Dispatch loop running");

        while !self.shutdown.load(Ordering::Relaxed) {
            self.absorb_pending_batches()?;

            if let Some(action) = self.queue.pop_front() {
                self.sequence_in_progress = true;
                self.execute_action(&action).await?;
                info!("Completed action '{}'", action.kind);

                if self.queue.is_empty() {
                    self.sequence_in_progress = false;
                    debug!("No more actions in the queue");
                }
            } else if self.state.telemetry_due() && !self.sequence_in_progress {
                self.reporter
                    .capture_and_publish(&mut self.hw, &mut self.state)
                    .await?;
            } else {
                match tokio::time::timeout(self.timing.idle_wait, self.batches.recv()).await {
                    Ok(Some(batch)) => self.apply_batch(batch)?,
                    Ok(None) => {
                        info!("Command channel closed, stopping dispatch loop");
                        break;
                    }
                    Err(_) => {} // bounded idle wait elapsed, re-check
                }
            }
        }

        Ok(())
    }

    /// Drain every batch already sitting in the channel
    fn absorb_pending_batches(&mut self) -> Result<()> {
        while let Ok(batch) = self.batches.try_recv() {
            self.apply_batch(batch)?;
        }
        Ok(())
    }

    /// Apply one accepted envelope: mode/cadence deltas first, then enqueue
    ///
    /// Deltas apply even when the batch carries no actions.
    fn apply_batch(&mut self, batch: CommandBatch) -> Result<()> {
        if batch.mode != self.state.mode {
            info!("Mode changed to {:?}", batch.mode);
            self.state.mode = batch.mode;
            if let Some(color) = batch.mode.indicator() {
                self.hw.set_mode_indicator(color)?;
            }
        }
        self.state.sensor_rate = batch.sensor_rate;

        if batch.ball_captured {
            self.state.balls_collected += 1;
            info!("Ball captured, {} collected so far", self.state.balls_collected);
        }

        debug!(
            "Enqueueing {} action(s) from envelope ts={}",
            batch.actions.len(),
            batch.timestamp_ms
        );
        self.queue.extend(batch.actions);
        Ok(())
    }

    /// Execute exactly one action
    ///
    /// Unrecognized kinds and malformed values are logged and skipped; the
    /// queue always advances.
    async fn execute_action(&mut self, action: &Action) -> Result<()> {
        if action.timestamp_ms < self.startup_timestamp_ms {
            info!(
                "Skipping pre-startup action '{}' from ts={}",
                action.kind, action.timestamp_ms
            );
            return Ok(());
        }

        match action.kind.as_str() {
            "driveForwardMm" => {
                let Some(distance) = action.value_i64() else {
                    warn!("driveForwardMm with non-numeric value {}", action.value);
                    return Ok(());
                };
                info!("Drive forward {} mm", distance);
                let outcome =
                    drive(&mut self.hw, distance, self.dampening_mm, self.timing.poll_interval)
                        .await?;
                if outcome == DriveOutcome::ObstacleFound {
                    self.state.obstacle_found = true;
                }
            }
            "driveBackwardMm" => {
                let Some(distance) = action.value_i64() else {
                    warn!("driveBackwardMm with non-numeric value {}", action.value);
                    return Ok(());
                };
                info!("Drive backward {} mm", distance);
                drive(
                    &mut self.hw,
                    -distance.abs(),
                    self.dampening_mm,
                    self.timing.poll_interval,
                )
                .await?;
            }
            "turnRight" => {
                let Some(degrees) = action.value_i64() else {
                    warn!("turnRight with non-numeric value {}", action.value);
                    return Ok(());
                };
                info!("Turn right by {} degrees", degrees);
                self.hw.turn_degrees(degrees as f64)?;
                sleep(self.timing.turn_settle).await;
            }
            "turnLeft" => {
                let Some(degrees) = action.value_i64() else {
                    warn!("turnLeft with non-numeric value {}", action.value);
                    return Ok(());
                };
                info!("Turn left by {} degrees", degrees);
                self.hw.turn_degrees(-(degrees as f64))?;
                sleep(self.timing.turn_settle).await;
            }
            "setColor" => {
                let Some(color) = action.value_str() else {
                    warn!("setColor with non-string value {}", action.value);
                    return Ok(());
                };
                info!("Set color to {}, collection counter reset", color);
                match ball_indicator(color) {
                    Some(led) => self.hw.set_ball_indicator(led)?,
                    None => warn!("Invalid ball color '{}' received", color),
                }
                self.state.set_color(color);
            }
            "setSpeed" => {
                let Some(speed) = action.value_i64() else {
                    warn!("setSpeed with non-numeric value {}", action.value);
                    return Ok(());
                };
                info!("Set speed to {}", speed);
                self.hw.set_speed(speed)?;
            }
            "gripperPosition" => match action.value_str() {
                Some("open") => {
                    info!("Open gripper");
                    self.hw.actuate_gripper(GripperPosition::Open)?;
                }
                Some("close") => {
                    info!("Close gripper");
                    self.hw.actuate_gripper(GripperPosition::Close)?;
                    sleep(self.timing.gripper_settle).await;
                }
                other => {
                    warn!("gripperPosition with unsupported value {:?}", other);
                }
            },
            "sendSensorMessage" => {
                let requested = matches!(
                    (&action.value, action.value_str()),
                    (serde_json::Value::Bool(true), _) | (_, Some("true"))
                );
                if requested {
                    self.state.send_next_message = true;
                } else {
                    warn!("sendSensorMessage with value {}, ignored", action.value);
                }
            }
            other => {
                warn!("Received invalid action '{}'", other);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SimulatedImageStore;
    use crate::hardware::{LedColor, SimulatedCar};
    use crate::state::{CarMode, SensorRate};
    use crate::telemetry::testing::RecordingTelemetry;
    use crate::telemetry::TelemetrySnapshot;
    use serde_json::json;
    use std::sync::Mutex;

    const DAMPENING_MM: i64 = 50;

    fn fast_timing() -> DispatchTiming {
        DispatchTiming {
            poll_interval: Duration::from_millis(1),
            idle_wait: Duration::from_millis(20),
            turn_settle: Duration::from_millis(1),
            gripper_settle: Duration::from_millis(1),
        }
    }

    struct Rig {
        tx: mpsc::Sender<CommandBatch>,
        dispatcher: Dispatcher<SimulatedCar>,
        published: Arc<Mutex<Vec<TelemetrySnapshot>>>,
    }

    fn rig(hw: SimulatedCar) -> Rig {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let recorder = RecordingTelemetry::default();
        let published = recorder.published.clone();
        let reporter = TelemetryReporter::new(
            "car-7",
            Box::new(recorder),
            Box::new(SimulatedImageStore::new("derby-images")),
        );
        let dispatcher = Dispatcher::new(
            rx,
            ModeState::new("Blue"),
            hw,
            reporter,
            DAMPENING_MM,
            Arc::new(AtomicBool::new(false)),
        )
        .with_timing(fast_timing());

        Rig {
            tx,
            dispatcher,
            published,
        }
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn action(ts: i64, kind: &str, value: serde_json::Value) -> Action {
        Action {
            timestamp_ms: ts,
            kind: kind.to_string(),
            value,
        }
    }

    fn batch(ts: i64, actions: Vec<Action>) -> CommandBatch {
        CommandBatch {
            timestamp_ms: ts,
            mode: CarMode::Automatic,
            sensor_rate: SensorRate::OnDemand,
            ball_captured: false,
            actions,
        }
    }

    #[tokio::test]
    async fn actions_run_fifo_across_envelopes() {
        let mut rig = rig(SimulatedCar::new(360.0, 1000.0));
        let ts = now_ms();

        rig.tx
            .send(batch(
                ts,
                vec![
                    action(ts, "turnRight", json!(10)),
                    action(ts, "turnLeft", json!(20)),
                ],
            ))
            .await
            .unwrap();
        rig.tx
            .send(batch(ts + 1, vec![action(ts + 1, "turnRight", json!(30))]))
            .await
            .unwrap();
        drop(rig.tx);

        rig.dispatcher.run().await.unwrap();

        assert_eq!(rig.dispatcher.hardware().turns, vec![10.0, -20.0, 30.0]);
        assert_eq!(rig.dispatcher.queued_actions(), 0);
    }

    #[tokio::test]
    async fn clear_forward_drive_reaches_target_without_telemetry() {
        // Sensor never reads below the threshold: one action, target
        // reached, nothing collected, nothing published
        let mut rig = rig(SimulatedCar::new(360.0, 250.0));
        let ts = now_ms();

        rig.tx
            .send(batch(ts, vec![action(ts, "driveForwardMm", json!(500))]))
            .await
            .unwrap();
        drop(rig.tx);

        rig.dispatcher.run().await.unwrap();

        let hw = rig.dispatcher.hardware();
        assert_eq!(hw.commanded_targets, vec![(500.0, 500.0)]);
        assert_eq!(hw.encoders(), (500.0, 500.0));
        assert!(!rig.dispatcher.state().obstacle_found);
        assert_eq!(rig.dispatcher.state().balls_collected, 0);
        assert!(rig.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn obstacle_abort_reports_once_then_clears() {
        let mut hw = SimulatedCar::new(360.0, 100.0);
        hw.script_distances([Some(2000.0), Some(40.0)]);
        let mut rig = rig(hw);
        let ts = now_ms();

        // The follow-up request arrives only after the first report is out
        let tx = rig.tx.clone();
        drop(rig.tx);
        let sender = tokio::spawn(async move {
            tx.send(batch(
                ts,
                vec![
                    action(ts, "driveForwardMm", json!(500)),
                    action(ts, "sendSensorMessage", json!("true")),
                ],
            ))
            .await
            .unwrap();
            sleep(Duration::from_millis(500)).await;
            tx.send(batch(
                ts + 1,
                vec![action(ts + 1, "sendSensorMessage", json!(true))],
            ))
            .await
            .unwrap();
        });

        rig.dispatcher.run().await.unwrap();
        sender.await.unwrap();

        let published = rig.published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].car_state.obstacle_found, Some(true));
        assert_eq!(published[1].car_state.obstacle_found, None);
        assert!(!rig.dispatcher.state().obstacle_found);
        assert!(!rig.dispatcher.state().send_next_message);
    }

    #[tokio::test]
    async fn telemetry_waits_for_the_queue_to_drain() {
        // The send request comes first in the batch; the report must still
        // happen after the turn because the queue drains first
        let mut rig = rig(SimulatedCar::new(360.0, 1000.0));
        let ts = now_ms();

        rig.tx
            .send(batch(
                ts,
                vec![
                    action(ts, "sendSensorMessage", json!(true)),
                    action(ts, "turnRight", json!(15)),
                ],
            ))
            .await
            .unwrap();
        drop(rig.tx);

        rig.dispatcher.run().await.unwrap();

        assert_eq!(rig.dispatcher.hardware().turns, vec![15.0]);
        assert_eq!(rig.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn continuous_rate_streams_reports() {
        let mut rig = rig(SimulatedCar::new(360.0, 1000.0));
        let ts = now_ms();

        let mut continuous = batch(ts, Vec::new());
        continuous.sensor_rate = SensorRate::Continuous;
        rig.tx.send(continuous).await.unwrap();

        // Keep the channel open; the loop should stream until cut off
        let _ = tokio::time::timeout(Duration::from_millis(400), rig.dispatcher.run()).await;

        assert!(rig.published.lock().unwrap().len() >= 2);
        assert!(!rig.dispatcher.state().send_next_message);
    }

    #[tokio::test]
    async fn pre_startup_actions_are_skipped_but_consumed() {
        let mut rig = rig(SimulatedCar::new(360.0, 1000.0));

        // Timestamp far before process start
        rig.tx
            .send(batch(50, vec![action(50, "turnRight", json!(30))]))
            .await
            .unwrap();
        drop(rig.tx);

        rig.dispatcher.run().await.unwrap();

        assert!(rig.dispatcher.hardware().turns.is_empty());
        assert_eq!(rig.dispatcher.queued_actions(), 0);
        // The envelope-level mode delta still applied
        assert_eq!(rig.dispatcher.state().mode, CarMode::Automatic);
    }

    #[tokio::test]
    async fn unrecognized_action_is_skipped_and_the_queue_advances() {
        let mut rig = rig(SimulatedCar::new(360.0, 1000.0));
        let ts = now_ms();

        rig.tx
            .send(batch(
                ts,
                vec![
                    action(ts, "flyToMoon", json!(1)),
                    action(ts, "turnRight", json!(15)),
                ],
            ))
            .await
            .unwrap();
        drop(rig.tx);

        rig.dispatcher.run().await.unwrap();

        assert_eq!(rig.dispatcher.hardware().turns, vec![15.0]);
    }

    #[tokio::test]
    async fn configuration_actions_mutate_state_and_hardware() {
        let mut rig = rig(SimulatedCar::new(360.0, 1000.0));
        let ts = now_ms();

        let mut first = batch(ts, vec![action(ts, "setSpeed", json!(420))]);
        first.ball_captured = true;
        rig.tx.send(first).await.unwrap();
        rig.tx
            .send(batch(
                ts + 1,
                vec![
                    action(ts + 1, "gripperPosition", json!("open")),
                    action(ts + 1, "gripperPosition", json!("close")),
                    action(ts + 1, "setColor", json!("Red")),
                ],
            ))
            .await
            .unwrap();
        drop(rig.tx);

        rig.dispatcher.run().await.unwrap();

        let hw = rig.dispatcher.hardware();
        assert_eq!(hw.speed, 420);
        assert_eq!(
            hw.gripper_moves,
            vec![GripperPosition::Open, GripperPosition::Close]
        );
        assert_eq!(hw.ball_indicator, Some(LedColor::Red));
        assert_eq!(hw.mode_indicator, Some(LedColor::Green));

        let state = rig.dispatcher.state();
        assert_eq!(state.active_color, "Red");
        // setColor reset the counter after the earlier ball capture
        assert_eq!(state.balls_collected, 0);
    }

    #[tokio::test]
    async fn shutdown_flag_stops_the_loop() {
        let (_tx, rx) = mpsc::channel(1);
        let recorder = RecordingTelemetry::default();
        let reporter = TelemetryReporter::new(
            "car-7",
            Box::new(recorder),
            Box::new(SimulatedImageStore::new("derby-images")),
        );
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut dispatcher = Dispatcher::new(
            rx,
            ModeState::new("Blue"),
            SimulatedCar::new(360.0, 1000.0),
            reporter,
            DAMPENING_MM,
            shutdown.clone(),
        )
        .with_timing(fast_timing());

        shutdown.store(true, Ordering::Relaxed);
        tokio::time::timeout(Duration::from_millis(100), dispatcher.run())
            .await
            .expect("loop must exit promptly once shutdown is set")
            .unwrap();
    }
}
