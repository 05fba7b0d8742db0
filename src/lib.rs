//! Motion control core for small differential-drive robots
//!
//! - [`control`]: PID controller, the [`control::Controller`] strategy trait
//!   and command deadlines
//! - [`imu`]: gyro calibration and orientation estimation into a
//!   [`system::attitude::SharedAttitude`]
//! - [`drive`]: closed-loop straight, turn and wheel moves
//! - [`task`]: long-running estimator and drive tasks fed through signals
//!
//! Hardware enters through the [`imu::InertialSensor`],
//! [`drive::EncodedMotor`] and [`system::clock::Clock`] traits.

#![cfg_attr(not(test), no_std)]

// macros first, so every module below can log
mod fmt;

pub mod control;
pub mod drive;
pub mod error;
pub mod imu;
pub mod system;
pub mod task;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
