//! Simulated collaborators shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::f32::consts::PI;
use std::vec::Vec;

use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::{Duration, Instant};

use crate::drive::EncodedMotor;
use crate::imu::{EstimatorConfig, ImuSample, InertialSensor, OrientationEstimator};
use crate::system::attitude::SharedAttitude;
use crate::system::clock::Clock;

/// Clock that jumps straight to the requested deadline.
///
/// Every sleep yields once so concurrently polled futures get a turn.
pub struct SimClock {
    now: Cell<Instant>,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            now: Cell::new(Instant::from_ticks(0)),
        }
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    async fn sleep_until(&self, deadline: Instant) {
        if deadline > self.now.get() {
            self.now.set(deadline);
        }
        yield_now().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimImuError;

/// Inertial sensor replaying a fixed list of samples in a loop.
pub struct ScriptedImu {
    samples: RefCell<Vec<ImuSample>>,
    next: Cell<usize>,
    reads: Cell<u32>,
    failures_left: Cell<u32>,
}

impl ScriptedImu {
    pub fn constant(sample: ImuSample) -> Self {
        Self::cycle(&[sample])
    }

    pub fn cycle(samples: &[ImuSample]) -> Self {
        Self {
            samples: RefCell::new(samples.to_vec()),
            next: Cell::new(0),
            reads: Cell::new(0),
            failures_left: Cell::new(0),
        }
    }

    /// Replace the script with a single constant sample.
    pub fn set(&self, sample: ImuSample) {
        *self.samples.borrow_mut() = vec![sample];
        self.next.set(0);
    }

    /// Make the next `count` reads fail.
    pub fn fail_next(&self, count: u32) {
        self.failures_left.set(count);
    }

    /// Reads attempted so far, failed ones included.
    pub fn reads(&self) -> u32 {
        self.reads.get()
    }

    fn read_next(&self) -> Result<ImuSample, SimImuError> {
        self.reads.set(self.reads.get() + 1);
        let failures = self.failures_left.get();
        if failures > 0 {
            self.failures_left.set(failures - 1);
            return Err(SimImuError);
        }
        let samples = self.samples.borrow();
        let i = self.next.get();
        self.next.set((i + 1) % samples.len());
        Ok(samples[i])
    }
}

impl InertialSensor for ScriptedImu {
    type Error = SimImuError;

    async fn read(&mut self) -> Result<ImuSample, SimImuError> {
        self.read_next()
    }
}

impl InertialSensor for &ScriptedImu {
    type Error = SimImuError;

    async fn read(&mut self) -> Result<ImuSample, SimImuError> {
        self.read_next()
    }
}

/// Physical parameters of the simulated robot.
#[derive(Debug, Clone, Copy)]
pub struct SimParams {
    pub wheel_diameter: f32,
    pub track_width: f32,
    /// Output shaft speed at full effort, revolutions per second
    pub max_rps: f32,
    /// Fraction of the gap to the commanded speed closed each 10 ms step
    pub lag: f32,
    /// Left motor strength relative to the right one
    pub left_skew: f32,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            wheel_diameter: 6.5,
            track_width: 13.5,
            max_rps: 1.5,
            lag: 0.1,
            left_skew: 1.0,
        }
    }
}

#[derive(Default)]
struct SimMotor {
    effort: Cell<f32>,
    /// Revolutions per second
    velocity: Cell<f32>,
    /// Revolutions since the last reset
    position: Cell<f32>,
}

impl SimMotor {
    fn step(&self, full_speed: f32, lag: f32, dt: f32) {
        let target = self.effort.get() * full_speed;
        let v = self.velocity.get() + (target - self.velocity.get()) * lag;
        self.velocity.set(v);
        self.position.set(self.position.get() + v * dt);
    }
}

const STEP: Duration = Duration::from_millis(10);

/// Two-wheeled robot whose clock advances the physics.
///
/// Each 10 ms of simulated time the motors move toward their commanded speed,
/// the wheels integrate their positions and the resulting yaw rate is fed to a
/// real [`OrientationEstimator`] writing into `attitude`. Sleeping yields once
/// after the physics catch up, like [`SimClock`].
pub struct SimRobot<'a> {
    params: SimParams,
    now: Cell<Instant>,
    left: SimMotor,
    right: SimMotor,
    estimator: RefCell<OrientationEstimator<'a, ScriptedImu, NoopRawMutex>>,
    steps: Cell<u32>,
    efforts: RefCell<Vec<(f32, f32)>>,
}

impl<'a> SimRobot<'a> {
    pub fn new(params: SimParams, attitude: &'a SharedAttitude<NoopRawMutex>) -> Self {
        let estimator = OrientationEstimator::new(
            ScriptedImu::constant(ImuSample::default()),
            attitude,
            EstimatorConfig::default(),
        );
        Self {
            params,
            now: Cell::new(Instant::from_ticks(0)),
            left: SimMotor::default(),
            right: SimMotor::default(),
            estimator: RefCell::new(estimator),
            steps: Cell::new(0),
            efforts: RefCell::new(Vec::new()),
        }
    }

    pub fn left(&self) -> SimWheel<'_, 'a> {
        SimWheel { robot: self, left: true }
    }

    pub fn right(&self) -> SimWheel<'_, 'a> {
        SimWheel { robot: self, left: false }
    }

    /// Number of 10 ms physics steps taken.
    pub fn steps(&self) -> u32 {
        self.steps.get()
    }

    /// Efforts held during each physics step.
    pub fn efforts(&self) -> Vec<(f32, f32)> {
        self.efforts.borrow().clone()
    }

    /// Efforts currently commanded to the motors.
    pub fn commanded(&self) -> (f32, f32) {
        (self.left.effort.get(), self.right.effort.get())
    }

    pub fn left_cm(&self) -> f32 {
        self.left.position.get() * PI * self.params.wheel_diameter
    }

    pub fn right_cm(&self) -> f32 {
        self.right.position.get() * PI * self.params.wheel_diameter
    }

    fn motor(&self, left: bool) -> &SimMotor {
        if left {
            &self.left
        } else {
            &self.right
        }
    }

    fn step(&self) {
        let p = self.params;
        let dt = STEP.as_micros() as f32 / 1_000_000.0;
        self.efforts.borrow_mut().push((self.left.effort.get(), self.right.effort.get()));

        self.left.step(p.max_rps * p.left_skew, p.lag, dt);
        self.right.step(p.max_rps, p.lag, dt);

        let circumference = PI * p.wheel_diameter;
        let yaw_rate = (self.right.velocity.get() - self.left.velocity.get()) * circumference / p.track_width * 180.0 / PI;
        self.estimator.borrow_mut().integrate(ImuSample {
            gyro: [0.0, 0.0, yaw_rate],
            accel: [0.0, 0.0, 1000.0],
        });

        self.now.set(self.now.get() + STEP);
        self.steps.set(self.steps.get() + 1);
    }
}

impl Clock for SimRobot<'_> {
    fn now(&self) -> Instant {
        self.now.get()
    }

    async fn sleep_until(&self, deadline: Instant) {
        while self.now.get() < deadline {
            self.step();
        }
        yield_now().await
    }
}

/// One wheel of a [`SimRobot`].
pub struct SimWheel<'r, 'a> {
    robot: &'r SimRobot<'a>,
    left: bool,
}

impl EncodedMotor for SimWheel<'_, '_> {
    fn position(&self) -> f32 {
        self.robot.motor(self.left).position.get()
    }

    fn reset_position(&mut self) {
        self.robot.motor(self.left).position.set(0.0);
    }

    fn set_effort(&mut self, effort: f32) {
        self.robot.motor(self.left).effort.set(effort);
    }
}
