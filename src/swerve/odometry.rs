// Odometry sample buffering and drive unit conversion
//
// The sampler thread records (drive, steer) readings faster than the control
// loop runs. Each tick the loop drains everything recorded since the last
// tick, so pose integration sees the whole sub-tick trajectory instead of
// only the latest reading.

use std::collections::VecDeque;
use std::f64::consts::{PI, TAU};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use super::angle::angle_modulus;
use super::{OdometrySample, WheelPosition};
use crate::config::ModuleConfig;

/// Converts drive motor rotations to linear wheel travel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveConversion {
    pub gear_ratio: f64,
    pub coupling_ratio: f64,
    pub wheel_diameter_m: f64,
}

impl From<&ModuleConfig> for DriveConversion {
    fn from(config: &ModuleConfig) -> Self {
        Self {
            gear_ratio: config.drive_gear_ratio,
            coupling_ratio: config.coupling_ratio,
            wheel_diameter_m: config.wheel_diameter_m,
        }
    }
}

impl DriveConversion {
    /// Wheel rotations with the steer-induced drive motion removed
    fn wheel_rotations(&self, drive_rotations: f64, steer_radians: f64) -> f64 {
        let steer_rotations = steer_radians / TAU;
        (drive_rotations - steer_rotations * self.coupling_ratio) / self.gear_ratio
    }

    /// Drive motor rotations -> meters travelled by the wheel
    pub fn to_meters(&self, drive_rotations: f64, steer_radians: f64) -> f64 {
        self.wheel_rotations(drive_rotations, steer_radians) * PI * self.wheel_diameter_m
    }

    /// Drive motor rotations/s -> wheel speed in m/s
    pub fn to_meters_per_second(&self, drive_rotations_per_s: f64, steer_radians_per_s: f64) -> f64 {
        self.to_meters(drive_rotations_per_s, steer_radians_per_s)
    }

    /// Wheel speed in m/s -> drive motor rotations/s, ignoring coupling
    pub fn to_motor_rotations_per_second(&self, speed_mps: f64) -> f64 {
        speed_mps / (PI * self.wheel_diameter_m) * self.gear_ratio
    }

    /// Physical wheel position for one odometry sample
    pub fn sample_position(&self, sample: &OdometrySample) -> WheelPosition {
        WheelPosition {
            distance: self.to_meters(sample.drive_rotations, sample.steer_heading),
            heading: angle_modulus(sample.steer_heading),
        }
    }
}

#[derive(Debug)]
struct SampleBuffer {
    samples: VecDeque<OdometrySample>,
    capacity: usize,
    dropped: u64,
}

/// Shared handle to the per-tick odometry buffer.
///
/// Clones share the same buffer: hand one to the sampler thread and keep
/// one in the control loop. `record_sample` and `drain_samples` each hold
/// the lock only for a push or a swap.
#[derive(Debug, Clone)]
pub struct OdometryReconciler {
    inner: Arc<Mutex<SampleBuffer>>,
}

impl OdometryReconciler {
    /// `capacity` bounds how many samples one tick can hold; once full, the
    /// oldest sample is dropped
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(SampleBuffer {
                samples: VecDeque::with_capacity(capacity),
                capacity,
                dropped: 0,
            })),
        }
    }

    // A panic while holding the lock cannot leave the deque half-written
    fn lock(&self) -> MutexGuard<'_, SampleBuffer> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one sample to the current tick's batch
    pub fn record_sample(&self, sample: OdometrySample) {
        let mut buffer = self.lock();
        if buffer.samples.len() == buffer.capacity {
            buffer.samples.pop_front();
            buffer.dropped += 1;
            if buffer.dropped.is_power_of_two() {
                warn!(
                    "Odometry buffer full ({} samples), {} samples dropped so far",
                    buffer.capacity, buffer.dropped
                );
            }
        }
        buffer.samples.push_back(sample);
    }

    /// Take every sample recorded since the previous drain, oldest first
    pub fn drain_samples(&self) -> Vec<OdometrySample> {
        let mut buffer = self.lock();
        let capacity = buffer.capacity;
        let batch = std::mem::replace(&mut buffer.samples, VecDeque::with_capacity(capacity));
        drop(buffer);
        batch.into()
    }

    /// Samples waiting for the next drain
    pub fn pending(&self) -> usize {
        self.lock().samples.len()
    }

    /// Total samples discarded because a tick overflowed the buffer
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}
