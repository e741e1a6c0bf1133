// Loop rates, topics, and per-module configuration
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// Control loop frequency
pub const LOOP_HZ: u64 = 50;

// Odometry sampling frequency (runs on its own thread)
pub const ODOMETRY_HZ: u64 = 250;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_MODULE: &str = "swerve/cmd/module"; // commands
pub const TOPIC_TELEMETRY: &str = "swerve/state/telemetry"; // per-tick telemetry
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

// Serial port for the Feetech servo bus
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Maximum number of odometry samples one control tick is expected to hold.
pub const fn samples_per_tick() -> usize {
    ODOMETRY_HZ.div_ceil(LOOP_HZ) as usize
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Which actuator port backs the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IoKind {
    #[default]
    Hardware,
    Replay,
}

/// Configuration for one swerve module.
///
/// Every field has a default so a config file only needs the values that
/// differ from the stock module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Name used in telemetry paths, e.g. `front_left`
    pub name: String,
    pub io: IoKind,
    pub serial_port: String,
    pub drive_motor_id: u8,
    pub steer_motor_id: u8,

    /// Drive motor rotations per wheel rotation
    pub drive_gear_ratio: f64,
    /// Drive motor rotations induced by one steer rotation
    pub coupling_ratio: f64,
    pub wheel_diameter_m: f64,

    /// Speed that maps to full voltage in open loop
    pub max_drive_speed_mps: f64,
    pub nominal_voltage: f64,

    /// Steer encoder reading (rad) when the wheel points forward
    pub steer_offset_rad: f64,

    pub speed_tolerance_mps: f64,
    pub angle_tolerance_rad: f64,
    /// Steer angular speed (rad/s) below which the wheel counts as settled
    pub angle_velocity_deadband_rad_per_s: f64,

    pub closed_loop_drive: bool,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: "module".to_string(),
            io: IoKind::Hardware,
            serial_port: DEFAULT_PORT.to_string(),
            drive_motor_id: 1,
            steer_motor_id: 2,
            drive_gear_ratio: 6.75,
            coupling_ratio: 0.0,
            wheel_diameter_m: 0.1,
            max_drive_speed_mps: 4.5,
            nominal_voltage: 12.0,
            steer_offset_rad: 0.0,
            speed_tolerance_mps: 0.05,
            angle_tolerance_rad: 3.0_f64.to_radians(),
            angle_velocity_deadband_rad_per_s: 3.0_f64.to_radians(),
            closed_loop_drive: true,
        }
    }
}

impl ModuleConfig {
    /// Load a config file, falling back to defaults for missing fields
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: ModuleConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("drive_gear_ratio", self.drive_gear_ratio),
            ("wheel_diameter_m", self.wheel_diameter_m),
            ("max_drive_speed_mps", self.max_drive_speed_mps),
            ("nominal_voltage", self.nominal_voltage),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be positive, got {}", value),
                });
            }
        }

        let non_negative = [
            ("speed_tolerance_mps", self.speed_tolerance_mps),
            ("angle_tolerance_rad", self.angle_tolerance_rad),
            (
                "angle_velocity_deadband_rad_per_s",
                self.angle_velocity_deadband_rad_per_s,
            ),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be non-negative, got {}", value),
                });
            }
        }

        if !self.coupling_ratio.is_finite() || !self.steer_offset_rad.is_finite() {
            return Err(ConfigError::Invalid {
                field: "coupling_ratio",
                reason: "coupling ratio and steer offset must be finite".to_string(),
            });
        }

        if self.drive_motor_id == self.steer_motor_id {
            return Err(ConfigError::Invalid {
                field: "steer_motor_id",
                reason: format!("drive and steer share id {}", self.drive_motor_id),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ModuleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_samples_per_tick() {
        // 250 Hz sampling into a 50 Hz loop
        assert_eq!(samples_per_tick(), 5);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ModuleConfig =
            serde_json::from_str(r#"{ "name": "front_left", "io": "replay" }"#).unwrap();
        assert_eq!(config.name, "front_left");
        assert_eq!(config.io, IoKind::Replay);
        assert_eq!(config.drive_gear_ratio, 6.75);
        assert!(config.closed_loop_drive);
    }

    #[test]
    fn test_rejects_zero_gear_ratio() {
        let config = ModuleConfig {
            drive_gear_ratio: 0.0,
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "drive_gear_ratio"),
            other => panic!("expected invalid gear ratio, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_shared_motor_id() {
        let config = ModuleConfig {
            drive_motor_id: 3,
            steer_motor_id: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = ModuleConfig::load("/nonexistent/module.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
