// Steer state optimization
//
// A wheel at heading h driving at speed s moves the same way as one at
// h + 180 degrees driving at -s. Picking whichever of the two is closer to
// the current heading keeps steer travel at or below 90 degrees.

use std::f64::consts::{FRAC_PI_2, PI};

use super::WheelState;
use super::angle::{angle_difference, angle_modulus};

/// Return the equivalent of `target` that needs the least steer travel from
/// `current_heading`.
///
/// Flips only when the travel is strictly greater than 90 degrees, so a
/// target exactly 90 degrees away is kept as is. The returned heading is
/// wrapped into [-π, π).
pub fn optimize(target: WheelState, current_heading: f64) -> WheelState {
    let delta = angle_difference(target.heading, current_heading);
    if delta.abs() > FRAC_PI_2 {
        WheelState {
            speed: -target.speed,
            heading: angle_modulus(target.heading + PI),
        }
    } else {
        target.normalized()
    }
}
