// Replay IO: no hardware, commands are only recorded
//
// Measurements come from whatever was last injected (log playback) and
// default to a stationary, connected module.

use tracing::trace;

use super::port::{ActuatorPort, DriveCommand, OdometrySource};
use crate::swerve::ModuleMeasurement;

#[derive(Debug, Default)]
pub struct ReplayModuleIo {
    measurement: ModuleMeasurement,
    steer_target: Option<f64>,
    steer_voltage: Option<f64>,
    drive_command: Option<DriveCommand>,
    brake: Option<bool>,
    steer_resets: u32,
    stops: u32,
}

impl ReplayModuleIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measurement returned from the next `measurement()` calls
    pub fn inject_measurement(&mut self, measurement: ModuleMeasurement) {
        self.measurement = measurement;
    }

    pub fn steer_target(&self) -> Option<f64> {
        self.steer_target
    }

    pub fn steer_voltage(&self) -> Option<f64> {
        self.steer_voltage
    }

    pub fn drive_command(&self) -> Option<DriveCommand> {
        self.drive_command
    }

    pub fn brake(&self) -> Option<bool> {
        self.brake
    }

    pub fn steer_resets(&self) -> u32 {
        self.steer_resets
    }

    pub fn stops(&self) -> u32 {
        self.stops
    }
}

impl ActuatorPort for ReplayModuleIo {
    fn measurement(&mut self) -> ModuleMeasurement {
        self.measurement
    }

    fn set_steer_target(&mut self, heading: f64) {
        trace!("replay: steer target {:.3}", heading);
        self.steer_voltage = None;
        self.steer_target = Some(heading);
    }

    fn set_drive_voltage(&mut self, volts: f64) {
        trace!("replay: drive voltage {:.3}", volts);
        self.drive_command = Some(DriveCommand::Voltage(volts));
    }

    fn set_drive_velocity(&mut self, speed_mps: f64) {
        trace!("replay: drive velocity {:.3}", speed_mps);
        self.drive_command = Some(DriveCommand::Velocity(speed_mps));
    }

    fn set_steer_voltage(&mut self, volts: f64) {
        self.steer_target = None;
        self.steer_voltage = Some(volts);
    }

    fn set_brake_mode(&mut self, brake: bool) {
        self.brake = Some(brake);
    }

    fn reset_steer_reference(&mut self) {
        self.steer_resets += 1;
    }

    fn stop(&mut self) {
        self.stops += 1;
        self.drive_command = None;
        self.steer_voltage = None;
        self.steer_target = None;
    }

    fn odometry_source(&self) -> Option<Box<dyn OdometrySource>> {
        None
    }
}
