// Target state tracking and convergence checks

use tracing::trace;

use super::angle::{angle_modulus, is_angle_near, is_near};
use super::optimizer::optimize;
use super::skew::reduce_skew;
use super::{DriveMode, ModuleError, WheelState, ensure_finite};
use crate::config::ModuleConfig;
use crate::motor::ActuatorPort;

/// Convergence thresholds for one module
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub speed_mps: f64,
    pub angle_rad: f64,
    /// Steer angular speed (rad/s) the wheel must be under to count as settled
    pub angle_velocity_deadband: f64,
}

impl From<&ModuleConfig> for Tolerances {
    fn from(config: &ModuleConfig) -> Self {
        Self {
            speed_mps: config.speed_tolerance_mps,
            angle_rad: config.angle_tolerance_rad,
            angle_velocity_deadband: config.angle_velocity_deadband_rad_per_s,
        }
    }
}

/// Holds the commanded wheel state and the drive mode used to apply it.
///
/// Every target stored here has been through [`optimize`], and every drive
/// command issued from it has been through [`reduce_skew`].
#[derive(Debug, Clone)]
pub struct TargetStateTracker {
    target: WheelState,
    drive_mode: DriveMode,
    tolerances: Tolerances,
    max_drive_speed_mps: f64,
    nominal_voltage: f64,
}

impl TargetStateTracker {
    pub fn new(config: &ModuleConfig) -> Self {
        Self {
            target: WheelState::default(),
            drive_mode: DriveMode::from_closed_loop(config.closed_loop_drive),
            tolerances: Tolerances::from(config),
            max_drive_speed_mps: config.max_drive_speed_mps,
            nominal_voltage: config.nominal_voltage,
        }
    }

    pub fn target(&self) -> WheelState {
        self.target
    }

    pub fn drive_mode(&self) -> DriveMode {
        self.drive_mode
    }

    /// Takes effect on the next [`set_target_state`](Self::set_target_state)
    pub fn set_drive_mode(&mut self, mode: DriveMode) {
        self.drive_mode = mode;
    }

    /// Point the wheel at `heading` with zero drive speed
    pub fn point_to_angle<P: ActuatorPort + ?Sized>(
        &mut self,
        port: &mut P,
        heading: f64,
        optimize_state: bool,
        current_heading: f64,
    ) -> Result<(), ModuleError> {
        let heading = angle_modulus(ensure_finite("heading", heading)?);
        let state = WheelState::new(0.0, heading);
        self.target = if optimize_state {
            optimize(state, current_heading)
        } else {
            state
        };
        port.set_steer_target(self.target.heading);
        Ok(())
    }

    /// Optimize `state` against the current heading, steer to it, and drive
    /// at the skew-reduced speed through the active drive mode
    pub fn set_target_state<P: ActuatorPort + ?Sized>(
        &mut self,
        port: &mut P,
        state: WheelState,
        current_heading: f64,
    ) -> Result<(), ModuleError> {
        let speed = ensure_finite("speed", state.speed)?;
        let heading = ensure_finite("heading", state.heading)?;

        self.target = optimize(WheelState::new(speed, heading), current_heading);
        port.set_steer_target(self.target.heading);

        let drive_speed = reduce_skew(self.target.speed, self.target.heading, current_heading);
        trace!(
            "Target {:?} from heading {:.3}, drive {:.3} m/s ({:?})",
            self.target, current_heading, drive_speed, self.drive_mode
        );
        match self.drive_mode {
            DriveMode::ClosedLoop => port.set_drive_velocity(drive_speed),
            DriveMode::OpenLoop => port.set_drive_voltage(self.open_loop_voltage(drive_speed)),
        }
        Ok(())
    }

    /// Voltage proxy for a speed, saturating at the nominal voltage
    pub fn open_loop_voltage(&self, speed_mps: f64) -> f64 {
        (speed_mps / self.max_drive_speed_mps).clamp(-1.0, 1.0) * self.nominal_voltage
    }

    pub fn is_at_target_state(&self, measured: WheelState, steer_velocity: f64) -> bool {
        self.is_at_angle(self.target.heading, measured.heading, steer_velocity)
            && self.is_at_velocity(self.target.speed, measured.speed)
    }

    /// False while the steer motor is still turning, otherwise a wrap-aware
    /// heading comparison
    pub fn is_at_angle(&self, target: f64, measured: f64, steer_velocity: f64) -> bool {
        let is_stopping = steer_velocity.abs() <= self.tolerances.angle_velocity_deadband;
        if !is_stopping {
            return false;
        }
        is_angle_near(target, measured, self.tolerances.angle_rad)
    }

    pub fn is_at_velocity(&self, target: f64, measured: f64) -> bool {
        is_near(target, measured, self.tolerances.speed_mps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::{DriveCommand, ReplayModuleIo};

    fn deg(d: f64) -> f64 {
        d.to_radians()
    }

    fn tracker() -> TargetStateTracker {
        TargetStateTracker::new(&ModuleConfig::default())
    }

    #[test]
    fn test_spinning_wheel_not_at_angle() {
        let t = tracker();
        assert!(!t.is_at_angle(0.0, 0.0, 10.0));
        assert!(!t.is_at_angle(0.0, 0.0, -10.0));
        assert!(t.is_at_angle(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_at_angle_across_wrap() {
        let t = tracker();
        assert!(t.is_at_angle(deg(179.0), deg(-179.0), 0.0));
        assert!(!t.is_at_angle(deg(179.0), deg(170.0), 0.0));
    }

    #[test]
    fn test_at_velocity() {
        let t = tracker();
        assert!(t.is_at_velocity(1.0, 1.02));
        assert!(!t.is_at_velocity(1.0, 1.2));
        assert!(!t.is_at_velocity(1.0, -1.0));
    }

    #[test]
    fn test_set_target_state_closed_loop() {
        let mut t = tracker();
        let mut port = ReplayModuleIo::new();
        t.set_target_state(&mut port, WheelState::new(2.0, deg(90.0)), deg(-170.0))
            .unwrap();

        // Flipped: 100 degrees the short way
        assert!((t.target().speed + 2.0).abs() < 1e-9);
        assert!((t.target().heading - deg(-90.0)).abs() < 1e-9);
        assert!((port.steer_target().unwrap() - deg(-90.0)).abs() < 1e-9);

        // 80 degrees of remaining error: -2 * cos(80 deg)
        match port.drive_command() {
            Some(DriveCommand::Velocity(v)) => {
                assert!((v - (-2.0 * deg(80.0).cos())).abs() < 1e-9)
            }
            other => panic!("expected velocity command, got {:?}", other),
        }
    }

    #[test]
    fn test_set_target_state_open_loop() {
        let mut t = tracker();
        t.set_drive_mode(DriveMode::OpenLoop);
        let mut port = ReplayModuleIo::new();
        t.set_target_state(&mut port, WheelState::new(2.25, 0.0), 0.0)
            .unwrap();

        // Half of max speed -> half of nominal voltage
        match port.drive_command() {
            Some(DriveCommand::Voltage(v)) => assert!((v - 6.0).abs() < 1e-9),
            other => panic!("expected voltage command, got {:?}", other),
        }
    }

    #[test]
    fn test_open_loop_voltage_saturates() {
        let t = tracker();
        assert!((t.open_loop_voltage(100.0) - 12.0).abs() < 1e-9);
        assert!((t.open_loop_voltage(-100.0) + 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_point_to_angle() {
        let mut t = tracker();
        let mut port = ReplayModuleIo::new();

        t.point_to_angle(&mut port, deg(170.0), false, 0.0).unwrap();
        assert_eq!(t.target().speed, 0.0);
        assert!((t.target().heading - deg(170.0)).abs() < 1e-9);
        assert!(port.drive_command().is_none());

        t.point_to_angle(&mut port, deg(170.0), true, 0.0).unwrap();
        assert!((t.target().heading - deg(-10.0)).abs() < 1e-9);
        assert!((port.steer_target().unwrap() - deg(-10.0)).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_target_rejected() {
        let mut t = tracker();
        let mut port = ReplayModuleIo::new();
        t.set_target_state(&mut port, WheelState::new(1.0, 0.5), 0.0)
            .unwrap();

        let err = t
            .set_target_state(&mut port, WheelState::new(f64::NAN, 0.0), 0.0)
            .unwrap_err();
        assert!(matches!(err, ModuleError::NonFiniteTarget { what: "speed", .. }));

        let err = t
            .point_to_angle(&mut port, f64::INFINITY, true, 0.0)
            .unwrap_err();
        assert!(matches!(err, ModuleError::NonFiniteTarget { what: "heading", .. }));

        // Previous target untouched
        assert_eq!(t.target(), WheelState::new(1.0, 0.5));
        assert!((port.steer_target().unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_at_target_state() {
        let mut t = tracker();
        let mut port = ReplayModuleIo::new();
        t.set_target_state(&mut port, WheelState::new(1.0, deg(30.0)), deg(30.0))
            .unwrap();

        assert!(t.is_at_target_state(WheelState::new(1.0, deg(31.0)), 0.0));
        assert!(!t.is_at_target_state(WheelState::new(0.5, deg(30.0)), 0.0));
        assert!(!t.is_at_target_state(WheelState::new(1.0, deg(30.0)), 1.0));
    }
}
