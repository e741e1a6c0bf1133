// Swerve module control core
//
// Provides:
// - Angle wrapping and steer state optimization (<= 90 degrees of travel)
// - Skew reduction while the wheel is still turning
// - Target tracking and convergence checks
// - Per-tick odometry sample buffering
// - The per-tick module controller

pub mod angle;
mod controller;
pub mod odometry;
pub mod optimizer;
pub mod skew;
mod state;
pub mod tracker;

pub use controller::ModuleController;
pub use odometry::{DriveConversion, OdometryReconciler};
pub use optimizer::optimize;
pub use skew::reduce_skew;
pub use state::{DriveMode, ModuleMeasurement, OdometrySample, WheelPosition, WheelState};
pub use tracker::{Tolerances, TargetStateTracker};

use crate::config::ConfigError;
use crate::motor::FeetechError;

/// Errors surfaced by the module control core
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("Non-finite {what}: {value}")]
    NonFiniteTarget { what: &'static str, value: f64 },

    #[error("Odometry index {index} out of range for {len} samples this tick")]
    OdometryIndexOutOfRange { index: usize, len: usize },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Servo bus error: {0}")]
    Bus(#[from] FeetechError),
}

/// Reject NaN and infinite command inputs before they reach the optimizer
pub(crate) fn ensure_finite(what: &'static str, value: f64) -> Result<f64, ModuleError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ModuleError::NonFiniteTarget { what, value })
    }
}
