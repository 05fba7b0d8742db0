//! Differential drive controller
//!
//! Runs closed-loop motion commands on a two-wheeled base. Each command owns a
//! primary controller driving toward the target and a secondary controller
//! correcting drift, and polls both once per control period until the primary
//! converges or the deadline passes.
//!
//! # Motion commands
//! - `straight`: primary on mean wheel travel, secondary holds the starting
//!   heading by biasing the wheels as `(effort - c, effort + c)`.
//! - `turn`: primary on heading relative to the start, secondary keeps the
//!   summed wheel travel at zero by biasing both wheels as
//!   `(-effort - c, effort - c)`.
//! - `rotate_left_wheel` / `rotate_right_wheel`: one wheel to a relative
//!   shaft angle.
//!
//! Every command stops the motors on exit and returns `true` if it converged,
//! `false` if it timed out.
//!
//! # Speed control
//! `set_speed` hands both wheels to their [`SpeedRegulator`]s, which
//! [`update_speed`](DifferentialDrive::update_speed) runs once per speed
//! period. Any effort command, `stop` included, ends speed control.
//!
//! # Sign conventions
//! - Positive effort drives the robot forward.
//! - Positive degrees turn left (counter clockwise seen from above), matching
//!   a positive gyro yaw.
//! - `straight` with a negative distance drives backward; so does a negative
//!   `max_effort`. A negative `max_effort` on `turn` reverses the turn.

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_time::Duration;

use super::heading::HeadingSource;
use super::motor::EncodedMotor;
use super::speed::{SpeedRegulator, SPEED_PERIOD};
use crate::control::{Controller, Deadline, Pid, PidConfig};
use crate::system::attitude::SharedAttitude;
use crate::system::clock::Clock;
use crate::system::units::{cm_per_sec_to_rpm, encoder_heading, revolutions_to_cm};

/// Default delay between two control loop iterations
pub const CONTROL_PERIOD: Duration = Duration::from_millis(10);
/// Default effort cap for motion commands
pub const DEFAULT_MAX_EFFORT: f32 = 0.5;
/// Default wheel diameter in centimeters
pub const WHEEL_DIAMETER: f32 = 6.0;
/// Default distance between the wheel contact points in centimeters
pub const TRACK_WIDTH: f32 = 15.5;

/// Geometry and timing of a drive.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveConfig {
    pub wheel_diameter: f32,
    pub track_width: f32,
    pub control_period: Duration,
    /// Wheel speed regulation period
    pub speed_period: Duration,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            wheel_diameter: WHEEL_DIAMETER,
            track_width: TRACK_WIDTH,
            control_period: CONTROL_PERIOD,
            speed_period: SPEED_PERIOD,
        }
    }
}

/// How a motion command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotionOutcome {
    Converged,
    TimedOut,
}

/// Wheel positions in centimeters when a command started.
#[derive(Clone, Copy)]
struct Start {
    left: f32,
    right: f32,
}

pub struct DifferentialDrive<'a, L, R, C, M: RawMutex = CriticalSectionRawMutex, S = Pid> {
    left: L,
    right: R,
    clock: C,
    heading: HeadingSource<'a, M>,
    config: DriveConfig,
    left_speed: SpeedRegulator<S>,
    right_speed: SpeedRegulator<S>,
}

impl<'a, L, R, C, M> DifferentialDrive<'a, L, R, C, M>
where
    L: EncodedMotor,
    R: EncodedMotor,
    C: Clock,
    M: RawMutex,
{
    /// Drive with the stock speed controllers.
    pub fn new(left: L, right: R, clock: C, heading: HeadingSource<'a, M>, config: DriveConfig) -> Self {
        let regulator = SpeedRegulator::new().with_period(config.speed_period);
        Self {
            left,
            right,
            clock,
            heading,
            config,
            left_speed: regulator.clone(),
            right_speed: regulator,
        }
    }
}

impl<'a, L, R, C, M, S> DifferentialDrive<'a, L, R, C, M, S>
where
    L: EncodedMotor,
    R: EncodedMotor,
    C: Clock,
    M: RawMutex,
    S: Controller,
{
    /// Replace the speed controllers with another implementation. Speed
    /// targets are dropped.
    pub fn with_speed_controllers<T: Controller>(self, left: T, right: T) -> DifferentialDrive<'a, L, R, C, M, T> {
        let mut drive = DifferentialDrive {
            left: self.left,
            right: self.right,
            clock: self.clock,
            heading: self.heading,
            config: self.config,
            left_speed: self.left_speed.map_controller(left),
            right_speed: self.right_speed.map_controller(right),
        };
        drive.clear_speed();
        drive
    }

    /// Swap the speed controllers for new ones of the same type.
    pub fn set_speed_controllers(&mut self, left: S, right: S) {
        self.left_speed.set_controller(left);
        self.right_speed.set_controller(right);
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn heading_source(&self) -> HeadingSource<'a, M> {
        self.heading
    }

    /// Give the motors back.
    pub fn release(self) -> (L, R) {
        (self.left, self.right)
    }

    /// Set both wheel efforts directly, clamped to [-1, 1]. Ends speed
    /// control.
    pub fn set_effort(&mut self, left: f32, right: f32) {
        self.clear_speed();
        self.apply_effort(left, right);
    }

    fn apply_effort(&mut self, left: f32, right: f32) {
        let l = left.clamp(-1.0, 1.0);
        let r = right.clamp(-1.0, 1.0);
        if l != left || r != right {
            debug!("Effort ({}, {}) clamped to ({}, {})", left, right, l, r);
        }
        self.left.set_effort(l);
        self.right.set_effort(r);
    }

    /// Zero both wheels and drop any speed targets.
    pub fn stop(&mut self) {
        self.set_effort(0.0, 0.0);
    }

    /// Hold both wheels at a surface speed in cm/s. Zero releases that wheel
    /// and sets its effort to zero.
    pub fn set_speed(&mut self, left: f32, right: f32) {
        let diameter = self.config.wheel_diameter;
        self.set_speed_rpm(cm_per_sec_to_rpm(left, diameter), cm_per_sec_to_rpm(right, diameter));
    }

    /// Hold both wheels at a shaft speed in rpm. Zero releases that wheel and
    /// sets its effort to zero.
    pub fn set_speed_rpm(&mut self, left: f32, right: f32) {
        debug!("Speed target ({}, {}) rpm", left, right);
        let now = self.clock.now();
        self.left_speed.set_target(left, self.left.position(), now);
        self.right_speed.set_target(right, self.right.position(), now);
        if left == 0.0 {
            self.left.set_effort(0.0);
        }
        if right == 0.0 {
            self.right.set_effort(0.0);
        }
    }

    /// Whether either wheel is under speed control.
    pub fn holding_speed(&self) -> bool {
        self.left_speed.is_active() || self.right_speed.is_active()
    }

    /// Left wheel speed in rpm, as of the last [`update_speed`](Self::update_speed).
    pub fn left_speed(&self) -> f32 {
        self.left_speed.speed_rpm()
    }

    /// Right wheel speed in rpm, as of the last [`update_speed`](Self::update_speed).
    pub fn right_speed(&self) -> f32 {
        self.right_speed.speed_rpm()
    }

    /// One speed regulation step: measure both wheels and apply new efforts
    /// to the ones holding a target. Call once per `speed_period`.
    pub fn update_speed(&mut self) {
        let now = self.clock.now();
        if let Some(effort) = self.left_speed.update(self.left.position(), now) {
            self.left.set_effort(effort.clamp(-1.0, 1.0));
        }
        if let Some(effort) = self.right_speed.update(self.right.position(), now) {
            self.right.set_effort(effort.clamp(-1.0, 1.0));
        }
    }

    fn clear_speed(&mut self) {
        if self.holding_speed() {
            debug!("Speed control released");
        }
        self.left_speed.clear();
        self.right_speed.clear();
    }

    /// Mix a forward and a turning effort, each in [-1, 1]. Positive `turn`
    /// turns left.
    ///
    /// Both wheels are scaled so that neither exceeds the larger of the two
    /// inputs in magnitude.
    pub fn arcade(&mut self, straight: f32, turn: f32) {
        if straight == 0.0 && turn == 0.0 {
            self.set_effort(0.0, 0.0);
            return;
        }
        let (s, t) = (libm::fabsf(straight), libm::fabsf(turn));
        let scale = s.max(t) / (s + t);
        self.set_effort((straight - turn) * scale, (straight + turn) * scale);
    }

    /// Left wheel travel in centimeters since the last reset.
    pub fn left_encoder_position(&self) -> f32 {
        revolutions_to_cm(self.left.position(), self.config.wheel_diameter)
    }

    /// Right wheel travel in centimeters since the last reset.
    pub fn right_encoder_position(&self) -> f32 {
        revolutions_to_cm(self.right.position(), self.config.wheel_diameter)
    }

    pub fn reset_encoder_position(&mut self) {
        self.left.reset_position();
        self.right.reset_position();
        let now = self.clock.now();
        self.left_speed.rebase(self.left.position(), now);
        self.right_speed.rebase(self.right.position(), now);
    }

    /// Drive `distance` centimeters with the stock controllers.
    pub async fn straight(&mut self, distance: f32, max_effort: f32, timeout: Option<Duration>) -> bool {
        let mut main = Pid::new(PidConfig::straight_distance(max_effort));
        let mut secondary = Pid::new(PidConfig::straight_heading());
        self.straight_with(distance, max_effort, timeout, &mut main, &mut secondary)
            .await
    }

    /// Drive `distance` centimeters.
    ///
    /// `main` sees the remaining distance in centimeters and its output is the
    /// forward effort magnitude. `secondary` sees the heading error in degrees
    /// and its output is the differential correction.
    pub async fn straight_with<P: Controller, Q: Controller>(
        &mut self,
        distance: f32,
        max_effort: f32,
        timeout: Option<Duration>,
        main: &mut P,
        secondary: &mut Q,
    ) -> bool {
        let (distance, max_effort) = if distance < 0.0 {
            (-distance, -max_effort)
        } else {
            (distance, max_effort)
        };
        let direction = if max_effort < 0.0 { -1.0 } else { 1.0 };

        info!(
            "Straight {} cm at effort {}, timeout {:?} ms",
            distance,
            max_effort,
            timeout.map(|t| t.as_millis())
        );

        self.clear_speed();
        main.clear_history();
        secondary.clear_history();

        let attitude = self.heading.attitude();
        let start = self.start();
        let start_heading = self.current_heading(attitude, 0.0, 0.0);
        let deadline = Deadline::new(self.clock.now(), timeout);

        let outcome = loop {
            let (left_delta, right_delta) = self.deltas(start);
            let travelled = (left_delta + right_delta) / 2.0 * direction;
            let now = self.clock.now();

            let effort = main.update(distance - travelled, now) * direction;
            if main.is_done() {
                break MotionOutcome::Converged;
            }
            if deadline.is_expired(now) {
                break MotionOutcome::TimedOut;
            }

            let heading = self.current_heading(attitude, left_delta, right_delta);
            let correction = secondary.update(start_heading - heading, now);
            self.apply_effort(effort - correction, effort + correction);

            pause(&self.clock, self.config.control_period, &deadline).await;
        };

        self.finish(outcome)
    }

    /// Turn `degrees` in place with the stock controllers.
    ///
    /// With `use_attitude` false, or without an attitude source, the heading
    /// comes from the wheel encoders.
    pub async fn turn(&mut self, degrees: f32, max_effort: f32, timeout: Option<Duration>, use_attitude: bool) -> bool {
        let mut main = Pid::new(PidConfig::turn_heading(max_effort));
        let mut secondary = Pid::new(PidConfig::turn_drift());
        self.turn_with(degrees, max_effort, timeout, use_attitude, &mut main, &mut secondary)
            .await
    }

    /// Turn `degrees` in place.
    ///
    /// `main` sees the heading error in degrees and its output is the turning
    /// effort. `secondary` sees the summed wheel travel in centimeters and its
    /// output is subtracted from both wheels.
    pub async fn turn_with<P: Controller, Q: Controller>(
        &mut self,
        degrees: f32,
        max_effort: f32,
        timeout: Option<Duration>,
        use_attitude: bool,
        main: &mut P,
        secondary: &mut Q,
    ) -> bool {
        let degrees = if max_effort < 0.0 { -degrees } else { degrees };

        let attitude = if use_attitude { self.heading.attitude() } else { None };

        info!(
            "Turn {} deg at effort {} using {}, timeout {:?} ms",
            degrees,
            libm::fabsf(max_effort),
            if attitude.is_some() { "attitude" } else { "encoders" },
            timeout.map(|t| t.as_millis())
        );

        self.clear_speed();
        main.clear_history();
        secondary.clear_history();

        let start = self.start();
        let target = self.current_heading(attitude, 0.0, 0.0) + degrees;
        let deadline = Deadline::new(self.clock.now(), timeout);

        let outcome = loop {
            let (left_delta, right_delta) = self.deltas(start);
            let now = self.clock.now();

            let correction = secondary.update(left_delta + right_delta, now);
            let heading = self.current_heading(attitude, left_delta, right_delta);
            let turn_effort = main.update(target - heading, now);
            if main.is_done() {
                break MotionOutcome::Converged;
            }
            if deadline.is_expired(now) {
                break MotionOutcome::TimedOut;
            }

            self.apply_effort(-turn_effort - correction, turn_effort - correction);

            pause(&self.clock, self.config.control_period, &deadline).await;
        };

        self.finish(outcome)
    }

    /// Rotate the left wheel `degrees` of output shaft rotation, right wheel idle.
    pub async fn rotate_left_wheel(&mut self, degrees: f32, max_effort: f32, timeout: Option<Duration>) -> bool {
        self.clear_speed();
        let mut controller = Pid::new(PidConfig::wheel_rotation(max_effort));
        let period = self.config.control_period;
        let outcome = rotate_wheel(
            &mut self.left,
            &self.clock,
            period,
            degrees,
            max_effort,
            timeout,
            &mut controller,
        )
        .await;
        self.finish(outcome)
    }

    /// Rotate the right wheel `degrees` of output shaft rotation, left wheel idle.
    pub async fn rotate_right_wheel(&mut self, degrees: f32, max_effort: f32, timeout: Option<Duration>) -> bool {
        self.clear_speed();
        let mut controller = Pid::new(PidConfig::wheel_rotation(max_effort));
        let period = self.config.control_period;
        let outcome = rotate_wheel(
            &mut self.right,
            &self.clock,
            period,
            degrees,
            max_effort,
            timeout,
            &mut controller,
        )
        .await;
        self.finish(outcome)
    }

    fn start(&self) -> Start {
        Start {
            left: self.left_encoder_position(),
            right: self.right_encoder_position(),
        }
    }

    fn deltas(&self, start: Start) -> (f32, f32) {
        (
            self.left_encoder_position() - start.left,
            self.right_encoder_position() - start.right,
        )
    }

    fn current_heading(&self, attitude: Option<&SharedAttitude<M>>, left_delta: f32, right_delta: f32) -> f32 {
        match attitude {
            Some(attitude) => attitude.yaw(),
            None => encoder_heading(left_delta, right_delta, self.config.track_width),
        }
    }

    fn finish(&mut self, outcome: MotionOutcome) -> bool {
        self.stop();
        match outcome {
            MotionOutcome::Converged => info!("Motion converged"),
            MotionOutcome::TimedOut => warn!("Motion timed out before converging"),
        }
        outcome == MotionOutcome::Converged
    }
}

/// Turn one wheel to a relative shaft angle, leaving it stopped.
async fn rotate_wheel<W: EncodedMotor, C: Clock, P: Controller>(
    wheel: &mut W,
    clock: &C,
    period: Duration,
    degrees: f32,
    max_effort: f32,
    timeout: Option<Duration>,
    controller: &mut P,
) -> MotionOutcome {
    let degrees = if max_effort < 0.0 { -degrees } else { degrees };
    info!("Rotate wheel {} deg at effort {}", degrees, libm::fabsf(max_effort));

    controller.clear_history();
    let start = wheel.position();
    let deadline = Deadline::new(clock.now(), timeout);

    let outcome = loop {
        let now = clock.now();
        let turned = (wheel.position() - start) * 360.0;
        let effort = controller.update(degrees - turned, now);
        if controller.is_done() {
            break MotionOutcome::Converged;
        }
        if deadline.is_expired(now) {
            break MotionOutcome::TimedOut;
        }

        wheel.set_effort(effort.clamp(-1.0, 1.0));
        pause(clock, period, &deadline).await;
    };

    wheel.set_effort(0.0);
    outcome
}

/// Sleep one control period, cut short so the loop wakes at the deadline.
async fn pause<C: Clock>(clock: &C, period: Duration, deadline: &Deadline) {
    let delay = match deadline.remaining(clock.now()) {
        Some(remaining) => remaining.min(period),
        None => period,
    };
    clock.sleep(delay).await
}
