//! Closed-loop wheel speed
//!
//! A [`SpeedRegulator`] holds one wheel at a target speed. Each regulation
//! period it measures the encoder counts travelled since the previous update
//! and feeds the shortfall, in counts per period, to its controller. The
//! controller output is the wheel effort.
//!
//! The regulator only computes efforts. Something has to call
//! [`SpeedRegulator::update`] once per period; the drive task does that for a
//! [`DifferentialDrive`](super::DifferentialDrive) whenever a target speed is
//! set.

use embassy_time::{Duration, Instant};

use crate::control::{Controller, Pid, PidConfig};
use crate::system::units::{seconds, COUNTS_PER_OUTPUT_REV};

/// Default regulation period (50 Hz)
pub const SPEED_PERIOD: Duration = Duration::from_millis(20);

/// Speed loop of one wheel.
#[derive(Debug, Clone)]
pub struct SpeedRegulator<P = Pid> {
    controller: P,
    counts_per_revolution: f32,
    period: Duration,
    /// Counts per period
    target: Option<f32>,
    /// Counts per period, as of the last update
    speed: f32,
    prev_position: f32,
    prev_time: Option<Instant>,
}

impl SpeedRegulator<Pid> {
    /// Regulator with the stock speed gains.
    pub fn new() -> Self {
        Self::with_controller(Pid::new(PidConfig::wheel_speed()))
    }
}

impl Default for SpeedRegulator<Pid> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Controller> SpeedRegulator<P> {
    pub fn with_controller(controller: P) -> Self {
        Self {
            controller,
            counts_per_revolution: COUNTS_PER_OUTPUT_REV,
            period: SPEED_PERIOD,
            target: None,
            speed: 0.0,
            prev_position: 0.0,
            prev_time: None,
        }
    }

    /// Encoder resolution the controller error is expressed in.
    pub fn with_resolution(mut self, counts_per_revolution: f32) -> Self {
        self.counts_per_revolution = counts_per_revolution;
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Swap the controller. Its history is cleared.
    pub fn set_controller(&mut self, controller: P) {
        self.controller = controller;
        self.controller.clear_history();
    }

    /// Same regulator state around a controller of another type.
    pub fn map_controller<Q: Controller>(self, mut controller: Q) -> SpeedRegulator<Q> {
        controller.clear_history();
        SpeedRegulator {
            controller,
            counts_per_revolution: self.counts_per_revolution,
            period: self.period,
            target: self.target,
            speed: self.speed,
            prev_position: self.prev_position,
            prev_time: self.prev_time,
        }
    }

    /// Hold `rpm`, measuring from `position` (revolutions) at `now`. Zero turns
    /// regulation off.
    pub fn set_target(&mut self, rpm: f32, position: f32, now: Instant) {
        if rpm == 0.0 {
            self.target = None;
            return;
        }
        self.target = Some(self.rpm_to_counts(rpm));
        self.controller.clear_history();
        self.rebase(position, now);
    }

    /// Stop regulating. The measured speed keeps updating.
    pub fn clear(&mut self) {
        self.target = None;
    }

    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    pub fn target_rpm(&self) -> Option<f32> {
        self.target.map(|t| self.counts_to_rpm(t))
    }

    /// Speed measured by the last update, in rpm.
    pub fn speed_rpm(&self) -> f32 {
        self.counts_to_rpm(self.speed)
    }

    /// Measure from a new reference, e.g. after an encoder reset.
    pub fn rebase(&mut self, position: f32, now: Instant) {
        self.prev_position = position;
        self.prev_time = Some(now);
    }

    /// Measure the speed since the previous update and, with a target set,
    /// return the effort to apply.
    pub fn update(&mut self, position: f32, now: Instant) -> Option<f32> {
        let Some(prev_time) = self.prev_time else {
            self.rebase(position, now);
            return None;
        };
        let elapsed = now.checked_duration_since(prev_time)?;
        if elapsed.as_ticks() == 0 {
            return None;
        }

        let counts = (position - self.prev_position) * self.counts_per_revolution;
        self.speed = counts * seconds(self.period) / seconds(elapsed);
        self.rebase(position, now);

        let target = self.target?;
        Some(self.controller.update(target - self.speed, now))
    }

    fn rpm_to_counts(&self, rpm: f32) -> f32 {
        rpm * self.counts_per_revolution / 60.0 * seconds(self.period)
    }

    fn counts_to_rpm(&self, counts: f32) -> f32 {
        counts * 60.0 / (self.counts_per_revolution * seconds(self.period))
    }
}
