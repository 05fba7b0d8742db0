//! Motor and encoder collaborators
//!
//! The drive controller only needs [`EncodedMotor`]: a wheel that reports its
//! rotation and accepts an effort. Board code usually has a PWM motor driver
//! and a quadrature counter as separate peripherals; [`Wheel`] glues an
//! implementation of [`MotorOutput`] and one of [`QuadratureCounter`] together.
//!
//! # Calibration
//!
//! Each [`Wheel`] carries a calibration factor (0.5 to 1.5) to compensate for
//! manufacturing variations between motors. It multiplies the commanded effort
//! before the effort is clamped and handed to the motor.

use crate::system::units::{counts_to_revolutions, COUNTS_PER_OUTPUT_REV};

/// A wheel with rotation feedback.
pub trait EncodedMotor {
    /// Output shaft revolutions since the last reset, positive when driving
    /// the robot forward.
    fn position(&self) -> f32;

    /// Make the current position read zero.
    fn reset_position(&mut self);

    /// Command an effort in [-1, 1]. Zero stops the motor.
    fn set_effort(&mut self, effort: f32);
}

impl<T: EncodedMotor + ?Sized> EncodedMotor for &mut T {
    fn position(&self) -> f32 {
        T::position(self)
    }

    fn reset_position(&mut self) {
        T::reset_position(self)
    }

    fn set_effort(&mut self, effort: f32) {
        T::set_effort(self, effort)
    }
}

/// Effort sink, e.g. one channel of an H-bridge driver.
pub trait MotorOutput {
    /// `effort` in [-1, 1], sign selects direction.
    fn set_effort(&mut self, effort: f32);
}

/// Signed pulse count of a quadrature decoder.
pub trait QuadratureCounter {
    fn count(&self) -> i32;
    fn reset(&mut self);
}

/// Quadrature counter scaled to output shaft revolutions.
pub struct Encoder<Q> {
    counter: Q,
    counts_per_revolution: f32,
    flip: bool,
}

impl<Q: QuadratureCounter> Encoder<Q> {
    /// Encoder with the default 585 counts per output revolution.
    pub fn new(counter: Q) -> Self {
        Self::with_resolution(counter, COUNTS_PER_OUTPUT_REV)
    }

    pub fn with_resolution(counter: Q, counts_per_revolution: f32) -> Self {
        Self {
            counter,
            counts_per_revolution,
            flip: false,
        }
    }

    /// Invert the count direction, for an encoder mounted mirrored.
    pub fn flipped(mut self) -> Self {
        self.flip = !self.flip;
        self
    }

    pub fn revolutions(&self) -> f32 {
        let revs = counts_to_revolutions(self.counter.count(), self.counts_per_revolution);
        if self.flip {
            -revs
        } else {
            revs
        }
    }

    pub fn reset(&mut self) {
        self.counter.reset();
    }
}

/// Motor plus encoder on one shaft.
pub struct Wheel<M, Q> {
    motor: M,
    encoder: Encoder<Q>,
    flip_motor: bool,
    calibration: f32,
}

impl<M: MotorOutput, Q: QuadratureCounter> Wheel<M, Q> {
    const MIN_CALIBRATION: f32 = 0.5;
    const MAX_CALIBRATION: f32 = 1.5;

    pub fn new(motor: M, encoder: Encoder<Q>) -> Self {
        Self {
            motor,
            encoder,
            flip_motor: false,
            calibration: 1.0,
        }
    }

    /// Invert the motor direction, for a motor mounted mirrored.
    pub fn flipped(mut self) -> Self {
        self.flip_motor = !self.flip_motor;
        self
    }

    /// Set the effort multiplier, clamped to 0.5..=1.5.
    pub fn set_calibration(&mut self, factor: f32) {
        let clamped = factor.clamp(Self::MIN_CALIBRATION, Self::MAX_CALIBRATION);
        if clamped != factor {
            warn!("Calibration factor {} clamped to {}", factor, clamped);
        }
        self.calibration = clamped;
    }

    pub fn calibration(&self) -> f32 {
        self.calibration
    }

    pub fn encoder(&self) -> &Encoder<Q> {
        &self.encoder
    }
}

impl<M: MotorOutput, Q: QuadratureCounter> EncodedMotor for Wheel<M, Q> {
    fn position(&self) -> f32 {
        self.encoder.revolutions()
    }

    fn reset_position(&mut self) {
        self.encoder.reset();
    }

    fn set_effort(&mut self, effort: f32) {
        let effort = (effort * self.calibration).clamp(-1.0, 1.0);
        self.motor.set_effort(if self.flip_motor { -effort } else { effort });
    }
}
