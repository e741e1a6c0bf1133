// Skew reduction
//
// While the steer motor is still turning toward its target, driving at full
// speed drags the contact patch sideways. Scaling the speed by the cosine of
// the remaining steer error keeps only the component along the direction the
// wheel currently rolls.

use super::angle::angle_difference;

/// Scale `requested_speed` by cos(target_heading - current_heading)
pub fn reduce_skew(requested_speed: f64, target_heading: f64, current_heading: f64) -> f64 {
    let error = angle_difference(target_heading, current_heading);
    requested_speed * error.cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_3, PI};

    #[test]
    fn test_no_error_no_reduction() {
        for &heading in &[0.0, 1.0, -2.5, PI, 7.0] {
            for &speed in &[-3.0, 0.0, 0.5, 4.2] {
                assert!((reduce_skew(speed, heading, heading) - speed).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_perpendicular_stops_drive() {
        assert!(reduce_skew(2.0, 0.3, 0.3 + FRAC_PI_2).abs() < 1e-9);
        assert!(reduce_skew(-2.0, 0.3, 0.3 - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_partial_reduction() {
        // cos(60 deg) = 0.5
        assert!((reduce_skew(4.0, FRAC_PI_3, 0.0) - 2.0).abs() < 1e-9);
        assert!((reduce_skew(4.0, 0.0, FRAC_PI_3) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_wrap_does_not_change_factor() {
        let a = reduce_skew(1.0, 179.0_f64.to_radians(), (-179.0_f64).to_radians());
        assert!((a - 2.0_f64.to_radians().cos()).abs() < 1e-9);
    }
}
