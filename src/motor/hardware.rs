// Swerve module on two Feetech STS servos
//
// The steer servo runs in multi-turn position mode so a goal can cross the
// encoder seam by the short way. The drive servo runs in velocity mode. Both
// 12-bit positions wrap every turn and are accumulated into multi-turn counts.
// Both servos share one serial bus with the odometry sampler thread.

use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::feetech::{
    FeetechBus, FeetechError, MULTI_TURN_LIMIT, OperatingMode, STEPS_PER_REVOLUTION,
};
use super::port::{ActuatorPort, OdometrySource};
use crate::config::ModuleConfig;
use crate::swerve::angle::angle_difference;
use crate::swerve::{DriveConversion, ModuleMeasurement, OdometrySample};

const STEPS: f64 = STEPS_PER_REVOLUTION as f64;
const HALF_TURN: i32 = STEPS_PER_REVOLUTION / 2;

/// Unwraps a single-turn encoder into a running step count
#[derive(Debug, Clone, Copy, Default)]
struct MultiTurn {
    last: Option<u16>,
    total: i64,
}

impl MultiTurn {
    fn update(&mut self, raw: u16) -> i64 {
        if let Some(last) = self.last {
            let mut delta = raw as i32 - last as i32;
            if delta > HALF_TURN {
                delta -= STEPS_PER_REVOLUTION;
            } else if delta < -HALF_TURN {
                delta += STEPS_PER_REVOLUTION;
            }
            self.total += delta as i64;
        } else {
            self.total = raw as i64;
        }
        self.last = Some(raw);
        self.total
    }

    /// Restart counting from an absolute single-turn reading
    fn reseed(&mut self, raw: u16) {
        self.last = Some(raw);
        self.total = raw as i64;
    }
}

/// Bus plus the encoder state both threads update
struct ServoBus {
    bus: FeetechBus,
    drive_turns: MultiTurn,
    steer_turns: MultiTurn,
}

type SharedBus = Arc<Mutex<ServoBus>>;

fn lock(bus: &SharedBus) -> MutexGuard<'_, ServoBus> {
    bus.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy)]
struct ServoIds {
    drive: u8,
    steer: u8,
}

fn steps_to_radians(steps: i64, offset_rad: f64) -> f64 {
    steps as f64 / STEPS * TAU - offset_rad
}

/// Multi-turn goal reached by the shortest rotation from `current_steps`
fn steer_goal_steps(current_steps: i64, heading: f64, offset_rad: f64) -> i64 {
    let current = steps_to_radians(current_steps, offset_rad);
    let delta = angle_difference(heading, current);
    let mut goal = current_steps + (delta / TAU * STEPS).round() as i64;

    // Unwind by whole turns once the servo's goal range runs out
    let limit = MULTI_TURN_LIMIT as i64;
    let turn = STEPS_PER_REVOLUTION as i64;
    while goal > limit {
        goal -= turn;
    }
    while goal < -limit {
        goal += turn;
    }
    goal
}

/// Read both positions under one lock and fold them into the turn counters
fn read_positions(servos: &mut ServoBus, ids: ServoIds) -> Result<(i64, i64), FeetechError> {
    let drive = servos.bus.read_position(ids.drive)?;
    let steer = servos.bus.read_position(ids.steer)?;
    Ok((servos.drive_turns.update(drive), servos.steer_turns.update(steer)))
}

pub struct HardwareModuleIo {
    name: String,
    bus: SharedBus,
    ids: ServoIds,
    conversion: DriveConversion,
    nominal_voltage: f64,
    steer_offset_rad: f64,
    drive_mode: OperatingMode,
    steer_mode: OperatingMode,
    brake: bool,
    /// Set by any failed bus transaction since the last measurement
    fault: bool,
}

impl HardwareModuleIo {
    /// Open the serial bus and put both servos in their control modes
    pub fn open(config: &ModuleConfig) -> Result<Self, FeetechError> {
        info!(
            "Opening servo bus on {} for module {}",
            config.serial_port, config.name
        );
        let mut bus = FeetechBus::open(&config.serial_port)?;
        let ids = ServoIds {
            drive: config.drive_motor_id,
            steer: config.steer_motor_id,
        };

        for id in [ids.drive, ids.steer] {
            if !bus.ping(id)? {
                warn!("Servo {} not responding to ping", id);
                return Err(FeetechError::Timeout { id });
            }
            debug!("Servo {} responding", id);
        }

        bus.set_operating_mode(ids.drive, OperatingMode::Velocity)?;
        bus.set_operating_mode(ids.steer, OperatingMode::Position)?;
        bus.enable_multi_turn(ids.steer)?;

        let mut drive_turns = MultiTurn::default();
        let mut steer_turns = MultiTurn::default();
        drive_turns.reseed(bus.read_position(ids.drive)?);
        steer_turns.reseed(bus.read_position(ids.steer)?);

        info!("Module {} servos initialized", config.name);
        Ok(Self {
            name: config.name.clone(),
            bus: Arc::new(Mutex::new(ServoBus {
                bus,
                drive_turns,
                steer_turns,
            })),
            ids,
            conversion: DriveConversion::from(config),
            nominal_voltage: config.nominal_voltage,
            steer_offset_rad: config.steer_offset_rad,
            drive_mode: OperatingMode::Velocity,
            steer_mode: OperatingMode::Position,
            brake: true,
            fault: false,
        })
    }

    /// Run one bus operation, recording a fault instead of propagating it
    fn with_bus<T>(
        &mut self,
        what: &str,
        op: impl FnOnce(&mut ServoBus, ServoIds) -> Result<T, FeetechError>,
    ) -> Option<T> {
        let ids = self.ids;
        let result = op(&mut lock(&self.bus), ids);
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                if !self.fault {
                    warn!("Module {}: {} failed: {}", self.name, what, e);
                }
                self.fault = true;
                None
            }
        }
    }

    fn ensure_drive_mode(&mut self, mode: OperatingMode) -> bool {
        if self.drive_mode == mode {
            return true;
        }
        let switched = self
            .with_bus("drive mode switch", |s, ids| {
                s.bus.set_operating_mode(ids.drive, mode)
            })
            .is_some();
        if switched {
            debug!("Module {}: drive servo now in {:?} mode", self.name, mode);
            self.drive_mode = mode;
        }
        switched
    }

    fn ensure_steer_mode(&mut self, mode: OperatingMode) -> bool {
        if self.steer_mode == mode {
            return true;
        }
        let switched = self
            .with_bus("steer mode switch", |s, ids| {
                s.bus.set_operating_mode(ids.steer, mode)
            })
            .is_some();
        if switched {
            debug!("Module {}: steer servo now in {:?} mode", self.name, mode);
            self.steer_mode = mode;
        }
        switched
    }

    fn duty(&self, volts: f64) -> f64 {
        (volts / self.nominal_voltage).clamp(-1.0, 1.0)
    }
}

impl ActuatorPort for HardwareModuleIo {
    fn measurement(&mut self) -> ModuleMeasurement {
        let reading = self.with_bus("measurement", |s, ids| {
            let drive = s.bus.read_feedback(ids.drive)?;
            let steer = s.bus.read_feedback(ids.steer)?;
            Ok((
                s.drive_turns.update(drive.position),
                drive.velocity,
                s.steer_turns.update(steer.position),
                steer.velocity,
            ))
        });
        let connected = !self.fault && reading.is_some();
        self.fault = false;

        let guard = lock(&self.bus);
        let (drive_steps, drive_vel, steer_steps, steer_vel) = reading.unwrap_or((
            guard.drive_turns.total,
            0,
            guard.steer_turns.total,
            0,
        ));
        drop(guard);

        ModuleMeasurement {
            drive_rotations: drive_steps as f64 / STEPS,
            drive_rotations_per_s: drive_vel as f64 / STEPS,
            steer_heading: steps_to_radians(steer_steps, self.steer_offset_rad),
            steer_velocity: steer_vel as f64 / STEPS * TAU,
            all_components_connected: connected,
        }
    }

    fn set_steer_target(&mut self, heading: f64) {
        if !self.ensure_steer_mode(OperatingMode::Position) {
            return;
        }
        let offset = self.steer_offset_rad;
        self.with_bus("steer target", |s, ids| {
            let goal = steer_goal_steps(s.steer_turns.total, heading, offset);
            s.bus.set_goal_position(ids.steer, goal as i32)
        });
    }

    fn set_drive_voltage(&mut self, volts: f64) {
        if !self.ensure_drive_mode(OperatingMode::Pwm) {
            return;
        }
        let duty = self.duty(volts);
        self.with_bus("drive voltage", |s, ids| s.bus.set_goal_pwm(ids.drive, duty));
    }

    fn set_drive_velocity(&mut self, speed_mps: f64) {
        if !self.ensure_drive_mode(OperatingMode::Velocity) {
            return;
        }
        let steps_per_s = self.conversion.to_motor_rotations_per_second(speed_mps) * STEPS;
        let steps_per_s = steps_per_s.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        self.with_bus("drive velocity", |s, ids| {
            s.bus.set_goal_velocity(ids.drive, steps_per_s)
        });
    }

    fn set_steer_voltage(&mut self, volts: f64) {
        if !self.ensure_steer_mode(OperatingMode::Pwm) {
            return;
        }
        let duty = self.duty(volts);
        self.with_bus("steer voltage", |s, ids| s.bus.set_goal_pwm(ids.steer, duty));
    }

    fn set_brake_mode(&mut self, brake: bool) {
        info!(
            "Module {}: {} mode",
            self.name,
            if brake { "brake" } else { "coast" }
        );
        self.brake = brake;
        // Coast releases the drive servo; the next drive command re-engages it
        self.with_bus("brake mode", |s, ids| s.bus.set_torque(ids.drive, brake));
        if !brake {
            // Mode switch re-enables torque, so force one on the next command
            self.drive_mode = OperatingMode::Position;
        }
    }

    fn reset_steer_reference(&mut self) {
        // Keep the turn count: goals are issued in the servo's multi-turn frame
        if let Some(raw) = self.with_bus("steer reference reset", |s, ids| {
            let raw = s.bus.read_position(ids.steer)?;
            s.steer_turns.update(raw);
            Ok(raw)
        }) {
            debug!("Module {}: steer reference reseeded at {}", self.name, raw);
        }
    }

    fn stop(&mut self) {
        if self.brake {
            if self.ensure_drive_mode(OperatingMode::Velocity) {
                self.with_bus("stop drive", |s, ids| s.bus.set_goal_velocity(ids.drive, 0));
            }
        } else {
            self.with_bus("coast drive", |s, ids| s.bus.set_torque(ids.drive, false));
            self.drive_mode = OperatingMode::Position;
        }
        if self.steer_mode == OperatingMode::Pwm {
            self.with_bus("stop steer", |s, ids| s.bus.set_goal_pwm(ids.steer, 0.0));
        }
    }

    fn odometry_source(&self) -> Option<Box<dyn OdometrySource>> {
        Some(Box::new(HardwareOdometrySource {
            bus: Arc::clone(&self.bus),
            ids: self.ids,
            steer_offset_rad: self.steer_offset_rad,
        }))
    }
}

impl Drop for HardwareModuleIo {
    fn drop(&mut self) {
        // Leave the wheel stopped when the runtime exits
        self.stop();
    }
}

/// Samples drive and steer positions from the odometry thread
struct HardwareOdometrySource {
    bus: SharedBus,
    ids: ServoIds,
    steer_offset_rad: f64,
}

impl OdometrySource for HardwareOdometrySource {
    fn sample(&mut self) -> Option<OdometrySample> {
        match read_positions(&mut lock(&self.bus), self.ids) {
            Ok((drive_steps, steer_steps)) => Some(OdometrySample {
                drive_rotations: drive_steps as f64 / STEPS,
                steer_heading: steps_to_radians(steer_steps, self.steer_offset_rad),
            }),
            Err(e) => {
                debug!("Odometry sample failed: {}", e);
                None
            }
        }
    }
}
