//! Bounded drive primitive with obstacle abort
//!
//! Converts a signed distance request into symmetric wheel-rotation targets,
//! commands both drive wheels, then polls the distance sensor on a fixed
//! short interval until the targets are reached. A non-null reading at or
//! below the dampening threshold halts the car early, but only when the
//! requested distance itself exceeds that threshold; short moves run to
//! completion regardless of what the sensor reports.
//!
//! The primitive blocks for the whole motion. Nothing else is dispatched
//! while it runs, and the only way it ends early is the abort rule itself.

use crate::hardware::{CarHardware, LedColor, Wheel};
use crate::Result;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

/// Fixed interval between distance-sensor polls during a motion
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a bounded motion ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// The wheel-rotation targets were reached
    Completed,
    /// A blocking obstacle stopped the car before the requested distance
    ObstacleFound,
}

/// Drive the car `distance_mm` millimeters (negative = backward)
///
/// A `None` distance reading never triggers the abort; it means the sensor
/// had no measurement this tick, not that the path is blocked.
pub async fn drive(
    hw: &mut dyn CarHardware,
    distance_mm: i64,
    dampening_mm: i64,
    poll_interval: Duration,
) -> Result<DriveOutcome> {
    let wheel_turn_degrees = (distance_mm as f64 / hw.wheel_circumference_mm()) * 360.0;

    let target_left = hw.motor_encoder(Wheel::Left)? + wheel_turn_degrees;
    let target_right = hw.motor_encoder(Wheel::Right)? + wheel_turn_degrees;

    hw.set_status_indicator(LedColor::Red)?;
    hw.drive_to(target_left, target_right)?;

    let mut outcome = DriveOutcome::Completed;
    while !hw.target_reached(target_left, target_right)? {
        if let Some(distance) = hw.read_distance_mm()? {
            if distance <= dampening_mm as f64 && distance_mm > dampening_mm {
                info!(
                    "Obstacle at {}mm, stopping before requested distance",
                    distance
                );
                // Halt by re-commanding both wheels to where they are now
                let halt_left = hw.motor_encoder(Wheel::Left)?;
                let halt_right = hw.motor_encoder(Wheel::Right)?;
                hw.drive_to(halt_left, halt_right)?;
                outcome = DriveOutcome::ObstacleFound;
                break;
            }
        }

        sleep(poll_interval).await;
    }

    hw.set_status_indicator(LedColor::Green)?;
    Ok(outcome)
}
