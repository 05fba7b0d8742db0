//! Periodic orientation estimation.
//!
//! This module provides the long-running task that keeps the shared attitude
//! current by ticking an [`OrientationEstimator`] at its sample period.
//!
//! # Architecture
//!
//! The task operates in two modes:
//! 1. Standby - not reading
//! 2. Active - one estimator tick per sample period
//!
//! Commands arrive through an [`EstimatorControl`]. A calibration request
//! pauses ticking, runs the calibration window, reports the result and then
//! resumes ticking with the new offsets.
//!
//! Sensor read failures are counted. After `max_consecutive_failures` in a row
//! the task stops ticking, raises [`Error::SensorUnavailable`] and waits for
//! the next command.
//!
//! # Usage
//!
//! ```rust,ignore
//! static ATTITUDE: SharedAttitude = SharedAttitude::new();
//! static IMU_CONTROL: EstimatorControl = EstimatorControl::new();
//!
//! // in the task
//! let mut estimator = OrientationEstimator::new(sensor, &ATTITUDE, EstimatorConfig::default());
//! estimate_orientation(&mut estimator, &SystemClock, &IMU_CONTROL).await;
//!
//! // anywhere else
//! IMU_CONTROL.calibrate(Duration::from_secs(1), Axis::Z).await?;
//! ```

use embassy_futures::select::{select, Either};
use embassy_sync::{
    blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex},
    signal::Signal,
};
use embassy_time::Duration;

use crate::error::{Error, Result};
use crate::imu::{Axis, InertialSensor, Offsets, OrientationEstimator};
use crate::system::clock::Clock;

/// Commands for the estimation task
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EstimatorCommand {
    /// Start ticking
    Start,
    /// Stop ticking
    Stop,
    /// Measure sensor offsets, then tick
    Calibrate { duration: Duration, vertical_axis: Axis },
}

/// Control and status signals of the estimation task
pub struct EstimatorControl<M: RawMutex = CriticalSectionRawMutex> {
    commands: Signal<M, EstimatorCommand>,
    calibrated: Signal<M, Result<Offsets>>,
    faults: Signal<M, Error>,
}

impl<M: RawMutex> EstimatorControl<M> {
    pub const fn new() -> Self {
        Self {
            commands: Signal::new(),
            calibrated: Signal::new(),
            faults: Signal::new(),
        }
    }

    /// Start continuous estimation
    pub fn start(&self) {
        self.commands.signal(EstimatorCommand::Start);
    }

    /// Stop estimation, the attitude keeps its last value
    pub fn stop(&self) {
        self.commands.signal(EstimatorCommand::Stop);
    }

    /// Calibrate and wait for the result. Estimation runs afterwards.
    pub async fn calibrate(&self, duration: Duration, vertical_axis: Axis) -> Result<Offsets> {
        self.calibrated.reset();
        self.commands.signal(EstimatorCommand::Calibrate {
            duration,
            vertical_axis,
        });
        self.calibrated.wait().await
    }

    /// Wait until the task gives up on the sensor.
    pub async fn wait_fault(&self) -> Error {
        self.faults.wait().await
    }
}

impl<M: RawMutex> Default for EstimatorControl<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the estimator under `control` forever.
pub async fn estimate_orientation<S, M, N, C>(
    estimator: &mut OrientationEstimator<'_, S, M>,
    clock: &C,
    control: &EstimatorControl<N>,
) where
    S: InertialSensor,
    M: RawMutex,
    N: RawMutex,
    C: Clock,
{
    let period = estimator.config().sample_period;
    let max_failures = estimator.config().max_consecutive_failures;
    let mut pending: Option<EstimatorCommand> = None;

    'command: loop {
        // Take a command left over from the reading loop, or wait for one
        let command = match pending.take() {
            Some(command) => command,
            None => control.commands.wait().await,
        };

        match command {
            EstimatorCommand::Stop => {
                info!("IMU stopped. Waiting for next command.");
            }
            EstimatorCommand::Calibrate {
                duration,
                vertical_axis,
            } => {
                let result = estimator.calibrate(clock, duration, vertical_axis).await;
                control.calibrated.signal(result);
                pending = Some(EstimatorCommand::Start);
            }
            EstimatorCommand::Start => {
                info!("Starting IMU integration every {} ms", period.as_millis());

                let mut consecutive_failures = 0u32;
                let mut next = clock.now() + period;

                loop {
                    match select(control.commands.wait(), clock.sleep_until(next)).await {
                        Either::First(EstimatorCommand::Start) => continue,
                        Either::First(command) => {
                            pending = Some(command);
                            continue 'command;
                        }
                        Either::Second(()) => {
                            next += period;
                            // Don't burst to catch up after a stall
                            let now = clock.now();
                            if next < now {
                                next = now;
                            }

                            match estimator.tick().await {
                                Ok(_) => consecutive_failures = 0,
                                Err(_) => {
                                    consecutive_failures += 1;
                                    warn!(
                                        "Failed to read IMU (failure {} of {})",
                                        consecutive_failures, max_failures
                                    );
                                    if consecutive_failures >= max_failures {
                                        error!("Max consecutive IMU failures reached - integration stopped");
                                        control.faults.signal(Error::SensorUnavailable);
                                        continue 'command;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::{block_on, yield_now};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embassy_time::Instant;

    use super::*;
    use crate::imu::{EstimatorConfig, ImuSample};
    use crate::system::attitude::SharedAttitude;
    use crate::testing::{ScriptedImu, SimClock};

    fn spinning(rate: f32) -> ImuSample {
        ImuSample {
            gyro: [0.0, 0.0, rate],
            accel: [0.0, 0.0, 1000.0],
        }
    }

    async fn until<C: Clock>(clock: &C, at: Instant) {
        while clock.now() < at {
            yield_now().await;
        }
    }

    #[test]
    fn test_ticks_once_per_period_after_start() {
        let attitude = SharedAttitude::<NoopRawMutex>::new();
        let clock = SimClock::new();
        let imu = ScriptedImu::constant(spinning(10.0));
        let mut estimator = OrientationEstimator::new(&imu, &attitude, EstimatorConfig::default());
        let control = EstimatorControl::<NoopRawMutex>::new();

        control.start();
        block_on(select(
            estimate_orientation(&mut estimator, &clock, &control),
            until(&clock, Instant::from_secs(1)),
        ));

        assert!((attitude.yaw() - 10.0).abs() < 0.2, "yaw {}", attitude.yaw());
        assert!((98..=100).contains(&imu.reads()), "reads {}", imu.reads());
    }

    #[test]
    fn test_idle_until_started() {
        let attitude = SharedAttitude::<NoopRawMutex>::new();
        let clock = SimClock::new();
        let imu = ScriptedImu::constant(spinning(10.0));
        let mut estimator = OrientationEstimator::new(&imu, &attitude, EstimatorConfig::default());
        let control = EstimatorControl::<NoopRawMutex>::new();

        block_on(select(estimate_orientation(&mut estimator, &clock, &control), async {
            for _ in 0..100 {
                yield_now().await;
            }
        }));

        assert_eq!(imu.reads(), 0);
        assert_eq!(attitude.yaw(), 0.0);
    }

    #[test]
    fn test_stop_halts_integration() {
        let attitude = SharedAttitude::<NoopRawMutex>::new();
        let clock = SimClock::new();
        let imu = ScriptedImu::constant(spinning(10.0));
        let mut estimator = OrientationEstimator::new(&imu, &attitude, EstimatorConfig::default());
        let control = EstimatorControl::<NoopRawMutex>::new();

        control.start();
        block_on(select(estimate_orientation(&mut estimator, &clock, &control), async {
            until(&clock, Instant::from_millis(500)).await;
            control.stop();
            for _ in 0..100 {
                yield_now().await;
            }
        }));

        let reads = imu.reads();
        assert!((48..=50).contains(&reads), "reads {reads}");
        assert!(clock.now() <= Instant::from_millis(510));
    }

    #[test]
    fn test_calibrate_command_reports_offsets_and_resumes() {
        let attitude = SharedAttitude::<NoopRawMutex>::new();
        let clock = SimClock::new();
        let imu = ScriptedImu::constant(spinning(2.0));
        let mut estimator = OrientationEstimator::new(&imu, &attitude, EstimatorConfig::default());
        let control = EstimatorControl::<NoopRawMutex>::new();

        let result = block_on(select(estimate_orientation(&mut estimator, &clock, &control), async {
            let offsets = control.calibrate(Duration::from_millis(200), Axis::Z).await;
            // real rotation after calibration
            imu.set(spinning(12.0));
            let resumed_at = clock.now();
            until(&clock, resumed_at + Duration::from_secs(1)).await;
            offsets
        }));

        let offsets = match result {
            Either::Second(offsets) => offsets.unwrap(),
            Either::First(()) => unreachable!(),
        };
        assert_eq!(offsets.gyro[2], 2.0);
        assert!((attitude.yaw() - 10.0).abs() < 0.2, "yaw {}", attitude.yaw());
    }

    #[test]
    fn test_gives_up_after_consecutive_failures() {
        let attitude = SharedAttitude::<NoopRawMutex>::new();
        let clock = SimClock::new();
        let imu = ScriptedImu::constant(spinning(10.0));
        imu.fail_next(u32::MAX);
        let mut estimator = OrientationEstimator::new(&imu, &attitude, EstimatorConfig::default());
        let control = EstimatorControl::<NoopRawMutex>::new();

        control.start();
        let result = block_on(select(
            estimate_orientation(&mut estimator, &clock, &control),
            control.wait_fault(),
        ));

        assert!(matches!(result, Either::Second(Error::SensorUnavailable)));
        assert_eq!(imu.reads(), MAX_FAILURES_IN_TEST);
    }

    #[test]
    fn test_single_failures_are_tolerated() {
        let attitude = SharedAttitude::<NoopRawMutex>::new();
        let clock = SimClock::new();
        let imu = ScriptedImu::constant(spinning(10.0));
        let mut estimator = OrientationEstimator::new(&imu, &attitude, EstimatorConfig::default());
        let control = EstimatorControl::<NoopRawMutex>::new();

        control.start();
        block_on(select(estimate_orientation(&mut estimator, &clock, &control), async {
            until(&clock, Instant::from_millis(200)).await;
            imu.fail_next(9);
            until(&clock, Instant::from_secs(1)).await;
        }));

        // still running: the nine failed ticks are missing from the integral
        assert!((attitude.yaw() - 9.0).abs() < 0.15, "yaw {}", attitude.yaw());
    }

    const MAX_FAILURES_IN_TEST: u32 = crate::imu::MAX_CONSECUTIVE_FAILURES;
}
