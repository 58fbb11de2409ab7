//! Hardware capability interface
//!
//! Narrow trait consumed by the drive primitive and the configuration
//! actions. The concrete binding (motor controller, distance sensor, LEDs,
//! gripper servo) is injected at startup, so every motion and telemetry path
//! can run against the simulated car below.

use crate::Result;
use std::collections::VecDeque;

/// Indicator colors used by the status, mode and ball LEDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Yellow,
    Green,
    Red,
    Blue,
}

impl LedColor {
    /// RGB triple for bindings that drive raw LED channels
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            LedColor::Yellow => (255, 255, 0),
            LedColor::Green => (0, 255, 0),
            LedColor::Red => (255, 0, 0),
            LedColor::Blue => (0, 0, 255),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripperPosition {
    Open,
    Close,
}

/// Capability interface for the physical car
///
/// Encoder positions and targets are wheel rotations in degrees. Distance
/// reads may return `None` when the sensor has no measurement this tick;
/// callers treat that as "no obstruction signal", not as an error.
pub trait CarHardware: Send {
    fn wheel_circumference_mm(&self) -> f64;

    /// Current encoder position of one drive wheel
    fn motor_encoder(&mut self, wheel: Wheel) -> Result<f64>;

    /// Command both drive wheels toward absolute encoder targets
    fn drive_to(&mut self, target_left: f64, target_right: f64) -> Result<()>;

    /// Whether both wheels have reached the given encoder targets
    fn target_reached(&mut self, target_left: f64, target_right: f64) -> Result<bool>;

    fn read_distance_mm(&mut self) -> Result<Option<f64>>;

    fn read_battery_voltage(&mut self) -> Result<f64>;

    fn set_status_indicator(&mut self, color: LedColor) -> Result<()>;

    fn set_mode_indicator(&mut self, color: LedColor) -> Result<()>;

    fn set_ball_indicator(&mut self, color: LedColor) -> Result<()>;

    /// Actuation speed in encoder degrees per second
    fn set_speed(&mut self, degrees_per_second: i64) -> Result<()>;

    /// Rotate in place; positive degrees turn right
    fn turn_degrees(&mut self, degrees: f64) -> Result<()>;

    fn actuate_gripper(&mut self, position: GripperPosition) -> Result<()>;
}

/// Encoder tolerance for the simulated car, in degrees
const SIM_ENCODER_TOLERANCE: f64 = 0.5;

/// Simulated car for tests and hardware-free runs
///
/// Each `target_reached` poll advances both encoders toward the queried
/// targets by at most `step_degrees`, so a motion completes over a number of
/// polls the test controls. Distance readings are scripted: reads pop from
/// the front of the script and fall back to `default_distance_mm` once the
/// script is exhausted.
pub struct SimulatedCar {
    wheel_circumference_mm: f64,
    step_degrees: f64,
    encoder_left: f64,
    encoder_right: f64,
    distance_script: VecDeque<Option<f64>>,
    default_distance_mm: Option<f64>,
    battery_voltage: f64,
    pub commanded_targets: Vec<(f64, f64)>,
    pub speed: i64,
    pub turns: Vec<f64>,
    pub gripper_moves: Vec<GripperPosition>,
    pub status_indicator: Option<LedColor>,
    pub mode_indicator: Option<LedColor>,
    pub ball_indicator: Option<LedColor>,
}

impl SimulatedCar {
    pub fn new(wheel_circumference_mm: f64, step_degrees: f64) -> Self {
        Self {
            wheel_circumference_mm,
            step_degrees,
            encoder_left: 0.0,
            encoder_right: 0.0,
            distance_script: VecDeque::new(),
            default_distance_mm: Some(8190.0),
            battery_voltage: 9.6,
            commanded_targets: Vec::new(),
            speed: 300,
            turns: Vec::new(),
            gripper_moves: Vec::new(),
            status_indicator: None,
            mode_indicator: None,
            ball_indicator: None,
        }
    }

    /// Queue distance readings returned by successive sensor reads
    pub fn script_distances<I>(&mut self, readings: I)
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        self.distance_script.extend(readings);
    }

    /// Distance returned once the script is exhausted
    pub fn set_default_distance(&mut self, distance_mm: Option<f64>) {
        self.default_distance_mm = distance_mm;
    }

    pub fn set_battery_voltage(&mut self, volts: f64) {
        self.battery_voltage = volts;
    }

    pub fn encoders(&self) -> (f64, f64) {
        (self.encoder_left, self.encoder_right)
    }

    fn step_toward(position: f64, target: f64, step: f64) -> f64 {
        let delta = target - position;
        if delta.abs() <= step {
            target
        } else {
            position + step * delta.signum()
        }
    }
}

impl CarHardware for SimulatedCar {
    fn wheel_circumference_mm(&self) -> f64 {
        self.wheel_circumference_mm
    }

    fn motor_encoder(&mut self, wheel: Wheel) -> Result<f64> {
        Ok(match wheel {
            Wheel::Left => self.encoder_left,
            Wheel::Right => self.encoder_right,
        })
    }

    fn drive_to(&mut self, target_left: f64, target_right: f64) -> Result<()> {
        self.commanded_targets.push((target_left, target_right));
        Ok(())
    }

    fn target_reached(&mut self, target_left: f64, target_right: f64) -> Result<bool> {
        self.encoder_left = Self::step_toward(self.encoder_left, target_left, self.step_degrees);
        self.encoder_right =
            Self::step_toward(self.encoder_right, target_right, self.step_degrees);

        Ok((self.encoder_left - target_left).abs() <= SIM_ENCODER_TOLERANCE
            && (self.encoder_right - target_right).abs() <= SIM_ENCODER_TOLERANCE)
    }

    fn read_distance_mm(&mut self) -> Result<Option<f64>> {
        Ok(self
            .distance_script
            .pop_front()
            .unwrap_or(self.default_distance_mm))
    }

    fn read_battery_voltage(&mut self) -> Result<f64> {
        Ok(self.battery_voltage)
    }

    fn set_status_indicator(&mut self, color: LedColor) -> Result<()> {
        self.status_indicator = Some(color);
        Ok(())
    }

    fn set_mode_indicator(&mut self, color: LedColor) -> Result<()> {
        self.mode_indicator = Some(color);
        Ok(())
    }

    fn set_ball_indicator(&mut self, color: LedColor) -> Result<()> {
        self.ball_indicator = Some(color);
        Ok(())
    }

    fn set_speed(&mut self, degrees_per_second: i64) -> Result<()> {
        self.speed = degrees_per_second;
        Ok(())
    }

    fn turn_degrees(&mut self, degrees: f64) -> Result<()> {
        self.turns.push(degrees);
        Ok(())
    }

    fn actuate_gripper(&mut self, position: GripperPosition) -> Result<()> {
        self.gripper_moves.push(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_motion_advances_per_poll() {
        // 360mm circumference: 1mm of travel is 1 degree of wheel rotation
        let mut car = SimulatedCar::new(360.0, 100.0);

        assert!(!car.target_reached(250.0, 250.0).unwrap());
        assert_eq!(car.encoders(), (100.0, 100.0));
        assert!(!car.target_reached(250.0, 250.0).unwrap());
        assert!(car.target_reached(250.0, 250.0).unwrap());
        assert_eq!(car.encoders(), (250.0, 250.0));
    }

    #[test]
    fn scripted_distances_pop_in_order_then_fall_back() {
        let mut car = SimulatedCar::new(360.0, 100.0);
        car.script_distances([Some(120.0), None]);

        assert_eq!(car.read_distance_mm().unwrap(), Some(120.0));
        assert_eq!(car.read_distance_mm().unwrap(), None);
        assert_eq!(car.read_distance_mm().unwrap(), Some(8190.0));
    }
}
