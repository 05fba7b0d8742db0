/// Expected accelerometer magnitude at rest, in milli-g.
pub const ONE_G_MG: f32 = 1000.0;

/// Sensor axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// One raw reading of the inertial sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuSample {
    /// Angular rate in degrees per second, indexed by [`Axis::index`]
    pub gyro: [f32; 3],
    /// Acceleration in milli-g
    pub accel: [f32; 3],
}

/// Source of raw gyro and accelerometer readings.
///
/// Implementations own the bus access and register decoding; the estimator
/// only asks for one sample at a time.
#[allow(async_fn_in_trait)]
pub trait InertialSensor {
    type Error;

    async fn read(&mut self) -> Result<ImuSample, Self::Error>;
}

impl<T: InertialSensor + ?Sized> InertialSensor for &mut T {
    type Error = T::Error;

    async fn read(&mut self) -> Result<ImuSample, Self::Error> {
        T::read(self).await
    }
}
