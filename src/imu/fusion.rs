//! Per-tick attitude update rules.
//!
//! Every rule turns one offset-corrected sample into an [`AttitudeStep`]. The
//! step is applied to the shared triple inside its lock, so a reset made by a
//! reader between two ticks is never overwritten by a stale value.

use core::f32::consts::PI;

use ahrs::{Ahrs, Madgwick};
use libm::{atan2f, sqrtf};
use nalgebra::{UnitQuaternion, Vector3};

use super::sensor::ImuSample;
use crate::system::attitude::Attitude;

/// Default Madgwick gain
pub const DEFAULT_BETA: f32 = 0.1;

const DEG_TO_RAD: f32 = PI / 180.0;
const RAD_TO_DEG: f32 = 180.0 / PI;

/// How the estimator turns samples into attitude.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fusion {
    /// Gyro integration only. Drifts with any residual bias.
    #[default]
    Integrate,
    /// Gyro integration with pitch and roll pulled toward the accelerometer
    /// gravity angles by `gain` (0 = gyro only, 1 = accelerometer only).
    Complementary { gain: f32 },
    /// Madgwick gradient-descent quaternion filter.
    Madgwick { beta: f32 },
}

/// Change to apply to the running attitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum AttitudeStep {
    /// Add a delta to every axis.
    Rotate(Attitude),
    /// Add the gyro delta, then blend pitch and roll toward measured angles.
    Blend {
        delta: Attitude,
        pitch: f32,
        roll: f32,
        gain: f32,
    },
}

impl AttitudeStep {
    pub(crate) fn apply(self, current: Attitude) -> Attitude {
        match self {
            AttitudeStep::Rotate(delta) => Attitude {
                pitch: current.pitch + delta.pitch,
                roll: current.roll + delta.roll,
                yaw: current.yaw + delta.yaw,
            },
            AttitudeStep::Blend {
                delta,
                pitch,
                roll,
                gain,
            } => {
                let predicted_pitch = current.pitch + delta.pitch;
                let predicted_roll = current.roll + delta.roll;
                Attitude {
                    pitch: blend(predicted_pitch, pitch, gain),
                    roll: blend(predicted_roll, roll, gain),
                    yaw: current.yaw + delta.yaw,
                }
            }
        }
    }
}

/// Move `predicted` toward `measured` by `gain`, taking the short way around
/// so unbounded running angles are pulled toward the nearest equivalent.
fn blend(predicted: f32, measured: f32, gain: f32) -> f32 {
    predicted + gain * wrap_signed(measured - predicted)
}

/// Fold an angle difference into [-180, 180).
fn wrap_signed(angle: f32) -> f32 {
    let wrapped = (angle + 180.0) % 360.0;
    let wrapped = if wrapped < 0.0 { wrapped + 360.0 } else { wrapped };
    wrapped - 180.0
}

/// Pitch and roll implied by the gravity vector, in degrees.
pub(crate) fn gravity_angles(accel: &[f32; 3]) -> (f32, f32) {
    let [ax, ay, az] = *accel;
    let roll = atan2f(ay, az) * RAD_TO_DEG;
    let pitch = atan2f(-ax, sqrtf(ay * ay + az * az)) * RAD_TO_DEG;
    (pitch, roll)
}

/// Rule state carried between ticks.
pub(crate) enum FusionState {
    Integrate,
    Complementary {
        gain: f32,
    },
    Madgwick {
        filter: Madgwick<f32>,
        beta: f32,
        period: f32,
        last: Attitude,
    },
}

impl FusionState {
    pub(crate) fn new(fusion: Fusion, period: f32) -> Self {
        match fusion {
            Fusion::Integrate => FusionState::Integrate,
            Fusion::Complementary { gain } => FusionState::Complementary { gain },
            Fusion::Madgwick { beta } => FusionState::Madgwick {
                filter: Madgwick::new(period, beta),
                beta,
                period,
                last: Attitude::ZERO,
            },
        }
    }

    /// Drop any orientation memory the rule keeps.
    pub(crate) fn reset(&mut self) {
        if let FusionState::Madgwick {
            filter,
            beta,
            period,
            last,
        } = self
        {
            *filter = Madgwick::new(*period, *beta);
            *last = Attitude::ZERO;
        }
    }

    /// Compute the step for one corrected sample taken `dt` seconds after the
    /// previous one.
    pub(crate) fn step(&mut self, sample: &ImuSample, dt: f32) -> AttitudeStep {
        let integrated = integrate(&sample.gyro, dt);
        match self {
            FusionState::Integrate => AttitudeStep::Rotate(integrated),
            FusionState::Complementary { gain } => {
                let (pitch, roll) = gravity_angles(&sample.accel);
                AttitudeStep::Blend {
                    delta: integrated,
                    pitch,
                    roll,
                    gain: *gain,
                }
            }
            FusionState::Madgwick { filter, last, .. } => {
                let gyro = Vector3::new(
                    sample.gyro[0] * DEG_TO_RAD,
                    sample.gyro[1] * DEG_TO_RAD,
                    sample.gyro[2] * DEG_TO_RAD,
                );
                let accel = Vector3::new(sample.accel[0], sample.accel[1], sample.accel[2]);
                match filter.update_imu(&gyro, &accel) {
                    Ok(quat) => {
                        let current = euler_degrees(quat);
                        let delta = Attitude {
                            pitch: wrap_signed(current.pitch - last.pitch),
                            roll: wrap_signed(current.roll - last.roll),
                            yaw: wrap_signed(current.yaw - last.yaw),
                        };
                        *last = current;
                        AttitudeStep::Rotate(delta)
                    }
                    Err(_) => {
                        // Free fall or a dead accelerometer; keep the gyro estimate moving
                        debug!("Madgwick update rejected sample, integrating gyro only");
                        AttitudeStep::Rotate(integrated)
                    }
                }
            }
        }
    }
}

fn integrate(gyro: &[f32; 3], dt: f32) -> Attitude {
    Attitude {
        roll: gyro[0] * dt,
        pitch: gyro[1] * dt,
        yaw: gyro[2] * dt,
    }
}

fn euler_degrees(q: &UnitQuaternion<f32>) -> Attitude {
    let (roll, pitch, yaw) = q.euler_angles();
    Attitude {
        pitch: pitch * RAD_TO_DEG,
        roll: roll * RAD_TO_DEG,
        yaw: yaw * RAD_TO_DEG,
    }
}
