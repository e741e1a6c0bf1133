// Per-tick controller for one swerve module
//
// Each control period `update` runs a fixed pipeline:
// 1. read the actuator measurement
// 2. drain the odometry samples recorded since the last tick
// 3. convert to wheel units and refresh convergence
// 4. publish telemetry, raising an alert while anything is disconnected
//
// Commands may be issued at any point between updates.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::odometry::{DriveConversion, OdometryReconciler};
use super::tracker::TargetStateTracker;
use super::{
    DriveMode, ModuleError, ModuleMeasurement, OdometrySample, WheelPosition, WheelState,
    ensure_finite,
};
use crate::config::{ModuleConfig, samples_per_tick};
use crate::messages::{ModuleCommand, TelemetryValue};
use crate::motor::{ActuatorPort, ModuleIo, OdometrySource};
use crate::telemetry::TelemetrySink;

// Samples a tick can hold before the oldest are dropped
const RECONCILER_SLACK: usize = 4;

pub struct ModuleController<P: ActuatorPort = ModuleIo> {
    name: String,
    port: P,
    sink: Arc<dyn TelemetrySink>,
    tracker: TargetStateTracker,
    conversion: DriveConversion,
    reconciler: OdometryReconciler,
    measurement: ModuleMeasurement,
    tick_samples: Vec<OdometrySample>,
    at_target: bool,
    connected: bool,
    epoch: Instant,
}

impl<P: ActuatorPort> ModuleController<P> {
    /// Build a controller and seed the steer reference from the absolute encoder
    pub fn new(config: &ModuleConfig, port: P, sink: Arc<dyn TelemetrySink>) -> Self {
        let mut controller = Self {
            name: config.name.clone(),
            port,
            sink,
            tracker: TargetStateTracker::new(config),
            conversion: DriveConversion::from(config),
            reconciler: OdometryReconciler::with_capacity(samples_per_tick() * RECONCILER_SLACK),
            measurement: ModuleMeasurement::default(),
            tick_samples: Vec::with_capacity(samples_per_tick()),
            at_target: false,
            connected: true,
            epoch: Instant::now(),
        };
        controller.reset_by_encoder();
        controller
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Seconds since the controller was created
    pub fn timestamp(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Run the once-per-tick pipeline
    pub fn update(&mut self) {
        self.measurement = self.port.measurement();
        self.tick_samples = self.reconciler.drain_samples();
        self.at_target = self.is_at_target_state();
        self.log_status();
        self.report_alerts();
    }

    fn log_status(&self) {
        let now = self.timestamp();
        let state = self.current_state();
        let target = self.target_state();
        let base = format!("modules/{}", self.name);
        let entries: [(&str, TelemetryValue); 9] = [
            ("drive_distance_m", self.drive_distance_m().into()),
            ("drive_velocity_mps", state.speed.into()),
            ("steer_heading_rad", state.heading.into()),
            ("steer_velocity_rad_per_s", self.measurement.steer_velocity.into()),
            ("target_speed_mps", target.speed.into()),
            ("target_heading_rad", target.heading.into()),
            ("is_at_target_state", self.at_target.into()),
            ("all_components_connected", self.measurement.all_components_connected.into()),
            ("odometry_updates", (self.tick_samples.len() as f64).into()),
        ];
        for (key, value) in entries {
            self.sink.record(&format!("{}/{}", base, key), value, now);
        }
    }

    fn report_alerts(&mut self) {
        let connected = self.measurement.all_components_connected;
        if !connected {
            self.sink.record(
                &format!("alerts/modules/{}/component_disconnected_at", self.name),
                self.timestamp().into(),
                self.timestamp(),
            );
        }
        if connected != self.connected {
            if connected {
                info!("Module {}: all components reconnected", self.name);
            } else {
                warn!("Module {}: component disconnected", self.name);
            }
            self.connected = connected;
        }
    }

    /// Apply one command received from outside the control loop
    pub fn apply(&mut self, command: ModuleCommand) -> Result<(), ModuleError> {
        match command {
            ModuleCommand::TargetState { speed, heading } => {
                self.set_target_state(WheelState::new(speed, heading))
            }
            ModuleCommand::PointToAngle { heading, optimize } => {
                self.point_to_angle(heading, optimize)
            }
            ModuleCommand::Stop => {
                self.stop();
                Ok(())
            }
            ModuleCommand::SetBrake { brake } => {
                self.set_brake(brake);
                Ok(())
            }
            ModuleCommand::SetClosedLoop { closed_loop } => {
                self.set_drive_motor_closed_loop(closed_loop);
                Ok(())
            }
            ModuleCommand::ResetByEncoder => {
                self.reset_by_encoder();
                Ok(())
            }
            ModuleCommand::DriveVoltage { volts } => self.run_drive_motor_by_voltage(volts),
            ModuleCommand::SteerVoltage { volts } => self.run_steer_motor_by_voltage(volts),
        }
    }

    pub fn set_drive_motor_closed_loop(&mut self, closed_loop: bool) {
        self.tracker.set_drive_mode(DriveMode::from_closed_loop(closed_loop));
    }

    pub fn drive_mode(&self) -> DriveMode {
        self.tracker.drive_mode()
    }

    pub fn stop(&mut self) {
        self.port.stop();
    }

    pub fn set_brake(&mut self, brake: bool) {
        self.port.set_brake_mode(brake);
    }

    pub fn reset_by_encoder(&mut self) {
        self.port.reset_steer_reference();
    }

    /// Manual override, bypasses optimization and skew reduction
    pub fn run_drive_motor_by_voltage(&mut self, volts: f64) -> Result<(), ModuleError> {
        self.port.set_drive_voltage(ensure_finite("drive voltage", volts)?);
        Ok(())
    }

    /// Manual override, bypasses optimization
    pub fn run_steer_motor_by_voltage(&mut self, volts: f64) -> Result<(), ModuleError> {
        self.port.set_steer_voltage(ensure_finite("steer voltage", volts)?);
        Ok(())
    }

    pub fn point_to_angle(&mut self, heading: f64, optimize: bool) -> Result<(), ModuleError> {
        let current = self.current_heading();
        self.tracker
            .point_to_angle(&mut self.port, heading, optimize, current)
    }

    pub fn set_target_state(&mut self, state: WheelState) -> Result<(), ModuleError> {
        let current = self.current_heading();
        self.tracker.set_target_state(&mut self.port, state, current)
    }

    pub fn target_state(&self) -> WheelState {
        self.tracker.target()
    }

    /// Measured wheel speed and wrapped heading
    pub fn current_state(&self) -> WheelState {
        WheelState::new(self.drive_velocity_mps(), self.current_heading()).normalized()
    }

    pub fn measurement(&self) -> &ModuleMeasurement {
        &self.measurement
    }

    fn current_heading(&self) -> f64 {
        self.measurement.steer_heading
    }

    pub fn drive_distance_m(&self) -> f64 {
        self.conversion
            .to_meters(self.measurement.drive_rotations, self.measurement.steer_heading)
    }

    fn drive_velocity_mps(&self) -> f64 {
        self.conversion.to_meters_per_second(
            self.measurement.drive_rotations_per_s,
            self.measurement.steer_velocity,
        )
    }

    pub fn is_at_target_state(&self) -> bool {
        self.tracker
            .is_at_target_state(self.current_state(), self.measurement.steer_velocity)
    }

    pub fn is_at_angle(&self, target: f64) -> bool {
        self.tracker.is_at_angle(
            target,
            self.current_heading(),
            self.measurement.steer_velocity,
        )
    }

    pub fn is_at_velocity(&self, target_mps: f64) -> bool {
        self.tracker.is_at_velocity(target_mps, self.drive_velocity_mps())
    }

    /// Convergence as evaluated during the last `update`
    pub fn was_at_target_state(&self) -> bool {
        self.at_target
    }

    /// Samples drained during the last `update`
    pub fn odometry_update_count(&self) -> usize {
        self.tick_samples.len()
    }

    /// Wheel position at one sub-tick odometry sample of the last `update`
    pub fn odometry_position(&self, index: usize) -> Result<WheelPosition, ModuleError> {
        self.tick_samples
            .get(index)
            .map(|sample| self.conversion.sample_position(sample))
            .ok_or(ModuleError::OdometryIndexOutOfRange {
                index,
                len: self.tick_samples.len(),
            })
    }

    /// Every sub-tick position of the last `update`, oldest first
    pub fn odometry_positions(&self) -> impl Iterator<Item = WheelPosition> + '_ {
        self.tick_samples
            .iter()
            .map(|sample| self.conversion.sample_position(sample))
    }

    /// Handle for the sampler thread to record into
    pub fn odometry_reconciler(&self) -> OdometryReconciler {
        self.reconciler.clone()
    }

    pub fn odometry_source(&self) -> Option<Box<dyn OdometrySource>> {
        self.port.odometry_source()
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}
