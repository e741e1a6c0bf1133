// Actuator capability consumed by the module controller

use tracing::info;

use super::hardware::HardwareModuleIo;
use super::replay::ReplayModuleIo;
use crate::config::{IoKind, ModuleConfig};
use crate::swerve::{ModuleError, ModuleMeasurement, OdometrySample};

/// Drive and steer actuators of one module, plus their sensors.
///
/// Implementations never fail outward: bus errors are reported through
/// `all_components_connected` on the next measurement.
pub trait ActuatorPort {
    /// Latest readings, once per control tick
    fn measurement(&mut self) -> ModuleMeasurement;

    /// Steer to a heading in radians
    fn set_steer_target(&mut self, heading: f64);

    fn set_drive_voltage(&mut self, volts: f64);

    /// Closed-loop wheel speed in m/s
    fn set_drive_velocity(&mut self, speed_mps: f64);

    fn set_steer_voltage(&mut self, volts: f64);

    /// Hold position when idle (`true`) or let the wheel coast
    fn set_brake_mode(&mut self, brake: bool);

    /// Re-seed the steer reference from the absolute encoder
    fn reset_steer_reference(&mut self);

    /// Zero all actuator output
    fn stop(&mut self);

    /// High-rate sampler for the odometry thread, if this port has one
    fn odometry_source(&self) -> Option<Box<dyn OdometrySource>>;
}

/// Produces odometry samples from a thread other than the control loop
pub trait OdometrySource: Send {
    fn sample(&mut self) -> Option<OdometrySample>;
}

/// Last drive command seen by a port
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveCommand {
    Velocity(f64),
    Voltage(f64),
}

/// Port selected at startup from [`ModuleConfig::io`]
pub enum ModuleIo {
    Hardware(HardwareModuleIo),
    Replay(ReplayModuleIo),
}

impl ModuleIo {
    pub fn from_config(config: &ModuleConfig) -> Result<Self, ModuleError> {
        config.validate()?;
        match config.io {
            IoKind::Hardware => Ok(ModuleIo::Hardware(HardwareModuleIo::open(config)?)),
            IoKind::Replay => {
                info!("Module {} running on replay IO", config.name);
                Ok(ModuleIo::Replay(ReplayModuleIo::new()))
            }
        }
    }

    fn port(&mut self) -> &mut dyn ActuatorPort {
        match self {
            ModuleIo::Hardware(io) => io as &mut dyn ActuatorPort,
            ModuleIo::Replay(io) => io as &mut dyn ActuatorPort,
        }
    }
}

impl ActuatorPort for ModuleIo {
    fn measurement(&mut self) -> ModuleMeasurement {
        self.port().measurement()
    }

    fn set_steer_target(&mut self, heading: f64) {
        self.port().set_steer_target(heading)
    }

    fn set_drive_voltage(&mut self, volts: f64) {
        self.port().set_drive_voltage(volts)
    }

    fn set_drive_velocity(&mut self, speed_mps: f64) {
        self.port().set_drive_velocity(speed_mps)
    }

    fn set_steer_voltage(&mut self, volts: f64) {
        self.port().set_steer_voltage(volts)
    }

    fn set_brake_mode(&mut self, brake: bool) {
        self.port().set_brake_mode(brake)
    }

    fn reset_steer_reference(&mut self) {
        self.port().reset_steer_reference()
    }

    fn stop(&mut self) {
        self.port().stop()
    }

    fn odometry_source(&self) -> Option<Box<dyn OdometrySource>> {
        match self {
            ModuleIo::Hardware(io) => io.odometry_source(),
            ModuleIo::Replay(io) => io.odometry_source(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_selected_from_config() {
        let config = ModuleConfig {
            io: IoKind::Replay,
            ..Default::default()
        };
        let mut io = ModuleIo::from_config(&config).unwrap();
        assert!(matches!(io, ModuleIo::Replay(_)));

        io.set_steer_target(0.25);
        match &io {
            ModuleIo::Replay(replay) => assert_eq!(replay.steer_target(), Some(0.25)),
            ModuleIo::Hardware(_) => unreachable!(),
        }
        assert!(io.odometry_source().is_none());
    }

    #[test]
    fn test_invalid_config_rejected_before_open() {
        let config = ModuleConfig {
            io: IoKind::Hardware,
            wheel_diameter_m: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            ModuleIo::from_config(&config),
            Err(ModuleError::Config(_))
        ));
    }
}
