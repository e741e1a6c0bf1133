// Actuator side of a swerve module
//
// Provides:
// - The ActuatorPort capability the controller drives
// - Feetech STS serial protocol implementation
// - Hardware IO on two STS servos and a record-only replay IO

pub mod feetech;
mod hardware;
mod port;
mod replay;

pub use feetech::{FeetechBus, FeetechError};
pub use hardware::HardwareModuleIo;
pub use port::{ActuatorPort, DriveCommand, ModuleIo, OdometrySource};
pub use replay::ReplayModuleIo;
