//! Orientation estimator
//!
//! Turns raw gyro and accelerometer readings into the running pitch/roll/yaw
//! triple held in a [`SharedAttitude`].
//!
//! # Operation
//! - `calibrate` averages a stationary window of samples into per-axis
//!   offsets. The vertical accelerometer axis keeps its 1 g baseline removed.
//! - `tick` reads one sample, subtracts the offsets and applies the configured
//!   [`Fusion`] rule to the shared triple as one atomic update.
//! - `read_corrected` takes a sample with the offsets removed and leaves the
//!   attitude alone. `last_sample` is the corrected sample of the latest tick.
//! - The periodic loop that calls `tick` lives in
//!   [`estimate_orientation`](crate::task::imu_read::estimate_orientation).
//!
//! # Configuration
//! - 10 ms sample period (100 Hz)
//! - 100 ms settle time before calibration sampling
//! - Pure gyro integration unless a fusion rule is selected

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_time::Duration;

use super::fusion::{Fusion, FusionState};
use super::sensor::{Axis, ImuSample, InertialSensor, ONE_G_MG};
use crate::error::{Error, Result};
use crate::system::attitude::{Attitude, SharedAttitude};
use crate::system::clock::Clock;
use crate::system::units::seconds;

/// Default tick period (100 Hz)
pub const SAMPLE_PERIOD: Duration = Duration::from_millis(10);
/// Time to let the robot come to rest before calibration sampling
pub const SETTLE_TIME: Duration = Duration::from_millis(100);
/// Failed reads in a row before the periodic loop gives up
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EstimatorConfig {
    pub sample_period: Duration,
    pub settle_time: Duration,
    pub fusion: Fusion,
    pub max_consecutive_failures: u32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            sample_period: SAMPLE_PERIOD,
            settle_time: SETTLE_TIME,
            fusion: Fusion::Integrate,
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
        }
    }
}

/// Per-axis sensor biases, in the sensor's units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Offsets {
    pub gyro: [f32; 3],
    pub accel: [f32; 3],
}

impl Offsets {
    fn correct(&self, raw: ImuSample) -> ImuSample {
        ImuSample {
            gyro: core::array::from_fn(|i| raw.gyro[i] - self.gyro[i]),
            accel: core::array::from_fn(|i| raw.accel[i] - self.accel[i]),
        }
    }
}

/// Keeps the shared attitude current from an inertial sensor.
pub struct OrientationEstimator<'a, S, M: RawMutex = CriticalSectionRawMutex> {
    sensor: S,
    attitude: &'a SharedAttitude<M>,
    config: EstimatorConfig,
    offsets: Offsets,
    fusion: FusionState,
    last: ImuSample,
}

impl<'a, S: InertialSensor, M: RawMutex> OrientationEstimator<'a, S, M> {
    pub fn new(sensor: S, attitude: &'a SharedAttitude<M>, config: EstimatorConfig) -> Self {
        let fusion = FusionState::new(config.fusion, seconds(config.sample_period));
        Self {
            sensor,
            attitude,
            config,
            offsets: Offsets::default(),
            fusion,
            last: ImuSample::default(),
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn offsets(&self) -> Offsets {
        self.offsets
    }

    /// Offset-corrected sample folded in by the latest tick.
    pub fn last_sample(&self) -> ImuSample {
        self.last
    }

    /// The attitude this estimator writes to.
    pub fn attitude(&self) -> &'a SharedAttitude<M> {
        self.attitude
    }

    /// Measure sensor biases over a stationary window.
    ///
    /// Offsets are zeroed first, then after the settle time the sensor is
    /// sampled every sample period until `duration` has elapsed. At least one
    /// read is attempted even for an empty window. Failed reads are skipped.
    /// Offsets stay zero if no read succeeded.
    pub async fn calibrate<C: Clock>(&mut self, clock: &C, duration: Duration, vertical_axis: Axis) -> Result<Offsets> {
        self.offsets = Offsets::default();
        info!(
            "Calibrating IMU for {} ms, vertical axis {:?}",
            duration.as_millis(),
            vertical_axis
        );

        clock.sleep(self.config.settle_time).await;

        // None when the window runs past the end of time
        let end = clock.now().checked_add(duration);
        let mut sums = Offsets::default();
        let mut count = 0u32;
        let mut failures = 0u32;

        loop {
            match self.sensor.read().await {
                Ok(sample) => {
                    for i in 0..3 {
                        sums.gyro[i] += sample.gyro[i];
                        sums.accel[i] += sample.accel[i];
                    }
                    count += 1;
                }
                Err(_) => failures += 1,
            }

            clock.sleep(self.config.sample_period).await;
            if end.is_some_and(|end| clock.now() >= end) {
                break;
            }
        }

        if count == 0 {
            warn!("IMU calibration failed: {} reads, none succeeded", failures);
            return Err(Error::NoCalibrationSamples);
        }
        if failures > 0 {
            warn!("IMU calibration skipped {} failed reads", failures);
        }

        let n = count as f32;
        let mut offsets = Offsets {
            gyro: sums.gyro.map(|s| s / n),
            accel: sums.accel.map(|s| s / n),
        };
        offsets.accel[vertical_axis.index()] -= ONE_G_MG;
        self.offsets = offsets;

        info!(
            "IMU calibrated from {} samples, gyro offset [{}, {}, {}]",
            count, offsets.gyro[0], offsets.gyro[1], offsets.gyro[2]
        );
        Ok(offsets)
    }

    /// Read one sample and fold it into the shared attitude.
    pub async fn tick(&mut self) -> core::result::Result<Attitude, S::Error> {
        let raw = self.sensor.read().await?;
        Ok(self.integrate(raw))
    }

    /// Read one sample with the calibration offsets removed, without touching
    /// the attitude.
    pub async fn read_corrected(&mut self) -> core::result::Result<ImuSample, S::Error> {
        let raw = self.sensor.read().await?;
        Ok(self.offsets.correct(raw))
    }

    /// Fold a raw sample taken one sample period after the previous one into
    /// the shared attitude and return the new triple.
    pub fn integrate(&mut self, raw: ImuSample) -> Attitude {
        let sample = self.offsets.correct(raw);
        self.last = sample;
        let step = self.fusion.step(&sample, seconds(self.config.sample_period));
        self.attitude.update(|current| step.apply(current))
    }

    /// Zero all three angles and any filter memory.
    pub fn reset_angles(&mut self) {
        self.fusion.reset();
        self.attitude.store(Attitude::ZERO);
    }

    pub fn pitch(&self) -> f32 {
        self.attitude.pitch()
    }

    pub fn roll(&self) -> f32 {
        self.attitude.roll()
    }

    pub fn yaw(&self) -> f32 {
        self.attitude.yaw()
    }

    /// Yaw in [0, 360).
    pub fn heading(&self) -> f32 {
        self.attitude.heading()
    }

    pub fn reset_pitch(&self) {
        self.attitude.reset_pitch();
    }

    pub fn reset_roll(&self) {
        self.attitude.reset_roll();
    }

    pub fn reset_yaw(&self) {
        self.attitude.reset_yaw();
    }

    pub fn set_yaw(&self, yaw: f32) {
        self.attitude.set_yaw(yaw);
    }
}
