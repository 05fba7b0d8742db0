//! Unit conversions between encoder counts, wheel revolutions, centimeters and
//! degrees of body rotation.

use core::f32::consts::PI;

use embassy_time::Duration;

/// Encoder counts per motor shaft revolution
pub const COUNTS_PER_MOTOR_REV: f32 = 12.0;
/// Motor gearbox reduction
pub const GEAR_RATIO: f32 = 48.75;
/// Encoder counts per output shaft revolution
pub const COUNTS_PER_OUTPUT_REV: f32 = COUNTS_PER_MOTOR_REV * GEAR_RATIO; // 585

/// Convert a raw encoder count to output shaft revolutions.
pub fn counts_to_revolutions(counts: i32, counts_per_revolution: f32) -> f32 {
    counts as f32 / counts_per_revolution
}

/// Distance covered by a wheel of `wheel_diameter` cm turning `revolutions`.
pub fn revolutions_to_cm(revolutions: f32, wheel_diameter: f32) -> f32 {
    revolutions * PI * wheel_diameter
}

/// Body rotation implied by the wheel travel difference on a differential base.
///
/// Positive when the right wheel travelled further, which is a left (counter
/// clockwise) turn, matching the sign of a gyro yaw.
pub fn encoder_heading(left_cm: f32, right_cm: f32, track_width: f32) -> f32 {
    ((right_cm - left_cm) / 2.0) * 360.0 / (track_width * PI)
}

/// Wheel revolutions per minute for a surface speed in cm/s.
pub fn cm_per_sec_to_rpm(speed: f32, wheel_diameter: f32) -> f32 {
    speed * 60.0 / (PI * wheel_diameter)
}

/// Duration as fractional seconds.
pub fn seconds(duration: Duration) -> f32 {
    duration.as_micros() as f32 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolution() {
        assert_eq!(COUNTS_PER_OUTPUT_REV, 585.0);
        assert!((counts_to_revolutions(1170, COUNTS_PER_OUTPUT_REV) - 2.0).abs() < 1e-6);
        assert!((counts_to_revolutions(-585, COUNTS_PER_OUTPUT_REV) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_one_revolution_is_one_circumference() {
        assert!((revolutions_to_cm(1.0, 6.5) - 6.5 * PI).abs() < 1e-4);
    }

    #[test]
    fn test_surface_speed_to_rpm() {
        // one circumference per second is 60 rpm
        assert!((cm_per_sec_to_rpm(6.0 * PI, 6.0) - 60.0).abs() < 1e-3);
        assert!((cm_per_sec_to_rpm(-10.0, 6.5) + 29.38).abs() < 0.01);
        assert_eq!(seconds(Duration::from_millis(20)), 0.02);
    }

    #[test]
    fn test_encoder_heading_full_spin() {
        // Each wheel travels half the track circumference in opposite
        // directions for a 180 degree spin in place.
        let half = 13.5 * PI / 2.0;
        assert!((encoder_heading(-half, half, 13.5) - 180.0).abs() < 1e-3);
        assert!((encoder_heading(half, -half, 13.5) + 180.0).abs() < 1e-3);
        assert_eq!(encoder_heading(10.0, 10.0, 13.5), 0.0);
    }
}
