//! PID controller with deadband, output clamp, slew limit, anti-windup and a
//! debounced convergence check.
//!
//! # Output shaping
//!
//! Each `update` shapes the raw `kp·e + ki·∫e + kd·de/dt` term in this order:
//! 1. Deadband: a nonzero output smaller than `min_output` is raised to
//!    `min_output`, keeping its sign. Small efforts do not overcome motor
//!    static friction.
//! 2. Clamp to `±max_output`.
//! 3. Slew limit: with `max_derivative` set, the output moves at most
//!    `max_derivative·Δt` away from the previous output.
//!
//! # Convergence
//!
//! `is_done` turns true after `tolerance_count` consecutive updates with
//! `|error| < tolerance`. One sample outside the band starts the count over.

use embassy_time::Instant;
use libm::{copysignf, fabsf};

use super::Controller;

/// Timestep assumed for the first update, when there is no previous sample.
pub const DEFAULT_TIMESTEP: f32 = 0.01;

/// Gains and limits of a [`Pid`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Deadband floor applied with the sign of the output
    pub min_output: f32,
    /// Largest output magnitude
    pub max_output: f32,
    /// Largest output change per second
    pub max_derivative: Option<f32>,
    /// Largest integral magnitude
    pub max_integral: Option<f32>,
    /// Convergence band around zero error
    pub tolerance: f32,
    /// Consecutive in-band updates required before `is_done`
    pub tolerance_count: u32,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            min_output: 0.0,
            max_output: 1.0,
            max_derivative: None,
            max_integral: None,
            tolerance: 0.1,
            tolerance_count: 1,
        }
    }
}

impl PidConfig {
    /// Distance loop of a straight drive, error in centimeters.
    pub fn straight_distance(max_effort: f32) -> Self {
        Self {
            kp: 0.1,
            ki: 0.04,
            kd: 0.04,
            min_output: 0.3,
            max_output: fabsf(max_effort),
            max_integral: Some(10.0),
            tolerance: 0.25,
            tolerance_count: 3,
            ..Self::default()
        }
    }

    /// Heading hold of a straight drive, error in degrees.
    pub fn straight_heading() -> Self {
        Self {
            kp: 0.075,
            kd: 0.001,
            ..Self::default()
        }
    }

    /// Heading loop of a turn, error in degrees.
    ///
    /// Faster turns carry more momentum into the target, so the derivative
    /// gain grows with the effort above 0.5.
    pub fn turn_heading(max_effort: f32) -> Self {
        let effort = fabsf(max_effort);
        Self {
            kp: 0.2,
            ki: 0.004,
            kd: 0.0036 + 0.0034 * (effort.max(0.5) - 0.5) * 2.0,
            min_output: 0.1,
            max_output: effort,
            max_integral: Some(30.0),
            tolerance: 1.0,
            tolerance_count: 3,
            ..Self::default()
        }
    }

    /// Translational drift loop of a turn, error is the summed wheel travel in
    /// centimeters.
    pub fn turn_drift() -> Self {
        Self {
            kp: 0.25,
            ..Self::default()
        }
    }

    /// Wheel speed regulation, error in encoder counts per regulation period.
    pub fn wheel_speed() -> Self {
        Self {
            kp: 0.035,
            ki: 0.03,
            ..Self::default()
        }
    }

    /// Single wheel rotation, error in degrees of the output shaft.
    pub fn wheel_rotation(max_effort: f32) -> Self {
        Self {
            kp: 0.16,
            ki: 0.1,
            kd: 0.045,
            min_output: 0.3,
            max_output: fabsf(max_effort),
            max_integral: Some(15.0),
            tolerance: 1.8,
            tolerance_count: 3,
            ..Self::default()
        }
    }
}

/// Stock [`Controller`] implementation.
#[derive(Debug, Clone)]
pub struct Pid {
    config: PidConfig,
    prev_error: f32,
    prev_integral: f32,
    prev_output: f32,
    prev_timestamp: Option<Instant>,
    in_tolerance: u32,
}

impl Pid {
    pub fn new(config: PidConfig) -> Self {
        Self {
            config,
            prev_error: 0.0,
            prev_integral: 0.0,
            prev_output: 0.0,
            prev_timestamp: None,
            in_tolerance: 0,
        }
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    /// Last output returned by `update`.
    pub fn output(&self) -> f32 {
        self.prev_output
    }

    /// Seconds since the previous update, or [`DEFAULT_TIMESTEP`] when there
    /// is no usable previous sample.
    fn timestep(&self, now: Instant) -> f32 {
        self.prev_timestamp
            .and_then(|prev| now.checked_duration_since(prev))
            .map(|elapsed| elapsed.as_micros() as f32 / 1_000_000.0)
            .filter(|&dt| dt > 0.0)
            .unwrap_or(DEFAULT_TIMESTEP)
    }
}

impl Default for Pid {
    fn default() -> Self {
        Self::new(PidConfig::default())
    }
}

impl Controller for Pid {
    fn update(&mut self, error: f32, now: Instant) -> f32 {
        let cfg = &self.config;
        let first = self.prev_timestamp.is_none();
        let dt = self.timestep(now);

        let mut integral = self.prev_integral + error * dt;
        if let Some(limit) = cfg.max_integral {
            integral = integral.clamp(-limit, limit);
        }

        // No history to differentiate against on the first sample
        let derivative = if first { 0.0 } else { (error - self.prev_error) / dt };

        let mut output = cfg.kp * error + cfg.ki * integral + cfg.kd * derivative;

        if output != 0.0 && fabsf(output) < cfg.min_output {
            output = copysignf(cfg.min_output, output);
        }

        output = output.clamp(-cfg.max_output, cfg.max_output);

        if let Some(rate) = cfg.max_derivative {
            let step = rate * dt;
            output = output.clamp(self.prev_output - step, self.prev_output + step);
        }

        if fabsf(error) < cfg.tolerance {
            self.in_tolerance += 1;
        } else {
            self.in_tolerance = 0;
        }

        self.prev_error = error;
        self.prev_integral = integral;
        self.prev_output = output;
        self.prev_timestamp = Some(now);

        output
    }

    fn is_done(&self) -> bool {
        self.in_tolerance >= self.config.tolerance_count
    }

    fn clear_history(&mut self) {
        self.prev_error = 0.0;
        self.prev_integral = 0.0;
        self.prev_output = 0.0;
        self.prev_timestamp = None;
        self.in_tolerance = 0;
    }
}
