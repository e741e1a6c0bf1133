// Control core and runtime for a single swerve module
//
// - swerve: state optimization, skew reduction, convergence and odometry
// - motor: actuator capability, Feetech serial servos, replay port
// - runtime: 50 Hz loop, command watchdog, odometry sampler thread

pub mod config;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod swerve;
pub mod telemetry;
