use core::fmt;

/// Failures that are not ordinary control-loop outcomes.
///
/// A motion command that fails to converge is reported through its boolean
/// result, never through this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The calibration window closed without a single successful sensor read.
    NoCalibrationSamples,
    /// The inertial sensor failed too many reads in a row.
    SensorUnavailable,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NoCalibrationSamples => write!(f, "calibration window collected no samples"),
            Error::SensorUnavailable => write!(f, "inertial sensor unavailable"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
