//! Run-time mode state for the car
//!
//! Holds the operating mode, telemetry cadence, active ball color and the
//! run-time counters mutated by specific action types. A single instance
//! lives for the whole process and is owned by the dispatch loop.

use crate::hardware::LedColor;

/// Operating regime assigned by the most recent accepted command envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarMode {
    Undefined,
    Automatic,
    Manual,
    Debug,
}

impl CarMode {
    /// Parse the wire string; anything unknown maps to `Undefined`
    pub fn from_wire(value: &str) -> Self {
        match value {
            "automatic" => CarMode::Automatic,
            "manual" => CarMode::Manual,
            "debug" => CarMode::Debug,
            _ => CarMode::Undefined,
        }
    }

    /// Mode indicator color, if the mode has one
    pub fn indicator(self) -> Option<LedColor> {
        match self {
            CarMode::Automatic => Some(LedColor::Green),
            CarMode::Manual => Some(LedColor::Blue),
            CarMode::Debug => Some(LedColor::Red),
            CarMode::Undefined => None,
        }
    }
}

/// Telemetry cadence: explicit request vs always-on streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorRate {
    Undefined,
    OnDemand,
    Continuous,
}

impl SensorRate {
    /// Parse the wire string; anything unknown maps to `Undefined`
    pub fn from_wire(value: &str) -> Self {
        match value {
            "onDemand" => SensorRate::OnDemand,
            "continuous" => SensorRate::Continuous,
            _ => SensorRate::Undefined,
        }
    }
}

/// Ball indicator color for an active color name, if recognized
pub fn ball_indicator(color: &str) -> Option<LedColor> {
    match color {
        "Red" => Some(LedColor::Red),
        "Yellow" => Some(LedColor::Yellow),
        "Green" => Some(LedColor::Green),
        "Blue" => Some(LedColor::Blue),
        _ => None,
    }
}

/// Process-lifetime mode state, mutated only by the dispatch loop
#[derive(Debug)]
pub struct ModeState {
    pub mode: CarMode,
    pub sensor_rate: SensorRate,
    pub active_color: String,
    pub balls_collected: u32,
    /// One telemetry snapshot has been requested and not yet sent
    pub send_next_message: bool,
    /// One-shot flag set by an obstacle-aborted forward drive, consumed by
    /// the next telemetry snapshot
    pub obstacle_found: bool,
}

impl ModeState {
    pub fn new(initial_color: &str) -> Self {
        Self {
            mode: CarMode::Undefined,
            sensor_rate: SensorRate::Undefined,
            active_color: initial_color.to_string(),
            balls_collected: 0,
            send_next_message: false,
            obstacle_found: false,
        }
    }

    /// Apply a `setColor` action: a color change starts a new collection round
    pub fn set_color(&mut self, color: &str) {
        self.active_color = color.to_string();
        self.balls_collected = 0;
    }

    /// Consume the one-shot obstacle flag
    pub fn take_obstacle(&mut self) -> bool {
        std::mem::replace(&mut self.obstacle_found, false)
    }

    /// Whether the telemetry gate should fire once the queue is drained
    pub fn telemetry_due(&self) -> bool {
        self.sensor_rate == SensorRate::Continuous || self.send_next_message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_modes_parse_and_unknown_is_undefined() {
        assert_eq!(CarMode::from_wire("automatic"), CarMode::Automatic);
        assert_eq!(CarMode::from_wire("manual"), CarMode::Manual);
        assert_eq!(CarMode::from_wire("debug"), CarMode::Debug);
        assert_eq!(CarMode::from_wire("race"), CarMode::Undefined);

        assert_eq!(SensorRate::from_wire("onDemand"), SensorRate::OnDemand);
        assert_eq!(SensorRate::from_wire("continuous"), SensorRate::Continuous);
        assert_eq!(SensorRate::from_wire("hourly"), SensorRate::Undefined);
    }

    #[test]
    fn set_color_always_resets_collection_counter() {
        let mut state = ModeState::new("Blue");
        state.balls_collected = 4;

        state.set_color("Red");
        assert_eq!(state.active_color, "Red");
        assert_eq!(state.balls_collected, 0);

        // Resets even when the color does not change
        state.balls_collected = 2;
        state.set_color("Red");
        assert_eq!(state.balls_collected, 0);
    }

    #[test]
    fn obstacle_flag_is_one_shot() {
        let mut state = ModeState::new("Blue");
        state.obstacle_found = true;

        assert!(state.take_obstacle());
        assert!(!state.take_obstacle());
    }

    #[test]
    fn telemetry_due_on_continuous_or_pending_request() {
        let mut state = ModeState::new("Blue");
        assert!(!state.telemetry_due());

        state.send_next_message = true;
        assert!(state.telemetry_due());

        state.send_next_message = false;
        state.sensor_rate = SensorRate::Continuous;
        assert!(state.telemetry_due());
    }

    #[test]
    fn mode_indicator_mapping() {
        assert_eq!(CarMode::Automatic.indicator(), Some(LedColor::Green));
        assert_eq!(CarMode::Manual.indicator(), Some(LedColor::Blue));
        assert_eq!(CarMode::Debug.indicator(), Some(LedColor::Red));
        assert_eq!(CarMode::Undefined.indicator(), None);
    }
}
