//! Inertial sensing: the sensor collaborator and the orientation estimator.

mod estimator;
mod fusion;
mod sensor;

pub use estimator::{
    EstimatorConfig, Offsets, OrientationEstimator, MAX_CONSECUTIVE_FAILURES, SAMPLE_PERIOD, SETTLE_TIME,
};
pub use fusion::{Fusion, DEFAULT_BETA};
pub use sensor::{Axis, ImuSample, InertialSensor, ONE_G_MG};
