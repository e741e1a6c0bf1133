// Message types exchanged with the runtime over zenoh

use serde::{Deserialize, Serialize};

// Command from teleop/coordinators -> runtime
// Headings are radians, speeds m/s, voltages volts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModuleCommand {
    TargetState { speed: f64, heading: f64 },
    PointToAngle { heading: f64, optimize: bool },
    Stop,
    SetBrake { brake: bool },
    SetClosedLoop { closed_loop: bool },
    ResetByEncoder,
    DriveVoltage { volts: f64 },
    SteerVoltage { volts: f64 },
}

impl ModuleCommand {
    /// Commands that keep the wheel moving and so are subject to the watchdog
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            ModuleCommand::TargetState { .. }
                | ModuleCommand::DriveVoltage { .. }
                | ModuleCommand::SteerVoltage { .. }
        )
    }
}

/// Value half of a telemetry entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TelemetryValue {
    Bool(bool),
    Number(f64),
}

impl From<bool> for TelemetryValue {
    fn from(value: bool) -> Self {
        TelemetryValue::Bool(value)
    }
}

impl From<f64> for TelemetryValue {
    fn from(value: f64) -> Self {
        TelemetryValue::Number(value)
    }
}

/// One (path, value, timestamp) triple published by the runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryEntry {
    pub path: String,
    pub value: TelemetryValue,
    /// Seconds since the controller was created
    pub timestamp: f64,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Degraded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_json_shape() {
        let cmd: ModuleCommand =
            serde_json::from_str(r#"{"type":"target_state","speed":1.5,"heading":0.5}"#).unwrap();
        assert_eq!(
            cmd,
            ModuleCommand::TargetState {
                speed: 1.5,
                heading: 0.5
            }
        );

        let stop: ModuleCommand = serde_json::from_str(r#"{"type":"stop"}"#).unwrap();
        assert_eq!(stop, ModuleCommand::Stop);
    }

    #[test]
    fn test_motion_commands() {
        assert!(ModuleCommand::DriveVoltage { volts: 1.0 }.is_motion());
        assert!(!ModuleCommand::Stop.is_motion());
        assert!(!ModuleCommand::SetBrake { brake: true }.is_motion());
        assert!(
            !ModuleCommand::PointToAngle {
                heading: 0.0,
                optimize: true
            }
            .is_motion()
        );
    }

    #[test]
    fn test_telemetry_value_is_untagged() {
        let entry = TelemetryEntry {
            path: "modules/fl/is_at_target_state".to_string(),
            value: true.into(),
            timestamp: 1.0,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(
            json,
            r#"{"path":"modules/fl/is_at_target_state","value":true,"timestamp":1.0}"#
        );
    }

    #[test]
    fn test_health_serialization() {
        let json = serde_json::to_string(&RuntimeHealth::CmdStale).unwrap();
        assert_eq!(json, r#""cmd_stale""#);
    }
}
