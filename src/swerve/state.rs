// Value types shared by the control core

use serde::{Deserialize, Serialize};

use super::angle::angle_modulus;

/// Speed (m/s) and heading (rad) of one wheel, measured or commanded
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelState {
    pub speed: f64,
    pub heading: f64,
}

impl WheelState {
    pub fn new(speed: f64, heading: f64) -> Self {
        Self { speed, heading }
    }

    /// The same state with its heading wrapped into [-π, π)
    pub fn normalized(self) -> Self {
        Self {
            speed: self.speed,
            heading: angle_modulus(self.heading),
        }
    }

    /// Velocity vector (x, y) the wheel contact patch moves along
    pub fn velocity_vector(&self) -> (f64, f64) {
        (
            self.speed * self.heading.cos(),
            self.speed * self.heading.sin(),
        )
    }
}

/// Distance (m) and heading (rad) of one wheel, used for pose integration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelPosition {
    pub distance: f64,
    pub heading: f64,
}

/// Raw readings from the actuator port, once per control tick.
///
/// Drive quantities are in drive motor rotations, steer quantities in
/// radians at the wheel. `steer_heading` is continuous (not wrapped) so the
/// drive/steer coupling can be removed from the drive reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleMeasurement {
    pub drive_rotations: f64,
    pub drive_rotations_per_s: f64,
    pub steer_heading: f64,
    pub steer_velocity: f64,
    pub all_components_connected: bool,
}

impl Default for ModuleMeasurement {
    fn default() -> Self {
        Self {
            drive_rotations: 0.0,
            drive_rotations_per_s: 0.0,
            steer_heading: 0.0,
            steer_velocity: 0.0,
            all_components_connected: true,
        }
    }
}

/// One high-rate odometry reading, in the same units as [`ModuleMeasurement`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OdometrySample {
    pub drive_rotations: f64,
    pub steer_heading: f64,
}

/// How a commanded speed reaches the drive motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    /// Velocity setpoint tracked by the motor controller
    #[default]
    ClosedLoop,
    /// Voltage proportional to the requested speed
    OpenLoop,
}

impl DriveMode {
    pub fn from_closed_loop(closed_loop: bool) -> Self {
        if closed_loop {
            DriveMode::ClosedLoop
        } else {
            DriveMode::OpenLoop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_normalized_wraps_heading() {
        let state = WheelState::new(1.0, 3.0 * PI / 2.0).normalized();
        assert_eq!(state.speed, 1.0);
        assert!((state.heading - (-PI / 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_velocity_vector() {
        let (x, y) = WheelState::new(2.0, PI / 2.0).velocity_vector();
        assert!(x.abs() < 1e-9);
        assert!((y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_drive_mode_from_flag() {
        assert_eq!(DriveMode::from_closed_loop(true), DriveMode::ClosedLoop);
        assert_eq!(DriveMode::from_closed_loop(false), DriveMode::OpenLoop);
    }
}
