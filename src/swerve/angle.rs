// Angle helpers for periodic headings (radians)

use std::f64::consts::{PI, TAU};

/// Wrap an angle into [-π, π)
pub fn angle_modulus(angle: f64) -> f64 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// Shortest signed rotation from `from` to `to`, in [-π, π)
pub fn angle_difference(to: f64, from: f64) -> f64 {
    angle_modulus(to - from)
}

/// True if `actual` is strictly within `tolerance` of `expected`
pub fn is_near(expected: f64, actual: f64, tolerance: f64) -> bool {
    (expected - actual).abs() < tolerance
}

/// Wrap-aware version of [`is_near`] for headings
pub fn is_angle_near(expected: f64, actual: f64, tolerance: f64) -> bool {
    angle_difference(expected, actual).abs() < tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_modulus_range() {
        assert!((angle_modulus(0.0)).abs() < EPS);
        assert!((angle_modulus(3.0 * PI) - (-PI)).abs() < EPS);
        assert!((angle_modulus(-PI) - (-PI)).abs() < EPS);
        assert!((angle_modulus(PI) - (-PI)).abs() < EPS);
        assert!((angle_modulus(TAU + 0.5) - 0.5).abs() < EPS);
        assert!((angle_modulus(-TAU - 0.5) - (-0.5)).abs() < EPS);
    }

    #[test]
    fn test_difference_takes_short_way() {
        let d = angle_difference(179.0_f64.to_radians(), (-179.0_f64).to_radians());
        assert!((d - (-2.0_f64.to_radians())).abs() < EPS);

        let d = angle_difference((-179.0_f64).to_radians(), 179.0_f64.to_radians());
        assert!((d - 2.0_f64.to_radians()).abs() < EPS);
    }

    #[test]
    fn test_angle_near_across_wrap() {
        let tol = 3.0_f64.to_radians();
        assert!(is_angle_near(
            179.0_f64.to_radians(),
            (-179.0_f64).to_radians(),
            tol
        ));
        // Raw subtraction would say 358 degrees apart
        assert!(!is_near(
            179.0_f64.to_radians(),
            (-179.0_f64).to_radians(),
            tol
        ));
    }

    #[test]
    fn test_angle_near_multiple_turns() {
        let tol = 1.0_f64.to_radians();
        assert!(is_angle_near(0.2, 0.2 + 4.0 * TAU, tol));
        assert!(!is_angle_near(0.2, 0.2 + PI, tol));
    }
}
