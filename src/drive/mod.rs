//! Differential drive: motion primitives over two encoded motors.

mod differential;
mod heading;
mod motor;
mod speed;

pub use differential::{
    DifferentialDrive, DriveConfig, MotionOutcome, CONTROL_PERIOD, DEFAULT_MAX_EFFORT, TRACK_WIDTH, WHEEL_DIAMETER,
};
pub use heading::HeadingSource;
pub use motor::{EncodedMotor, Encoder, MotorOutput, QuadratureCounter, Wheel};
pub use speed::{SpeedRegulator, SPEED_PERIOD};
