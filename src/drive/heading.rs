use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};

use crate::system::attitude::SharedAttitude;

/// Where a drive reads its heading from.
pub enum HeadingSource<'a, M: RawMutex = CriticalSectionRawMutex> {
    /// Yaw of an orientation estimator.
    Attitude(&'a SharedAttitude<M>),
    /// Wheel travel difference, assuming no wheel slip.
    Encoders,
}

impl<'a, M: RawMutex> HeadingSource<'a, M> {
    pub fn attitude(&self) -> Option<&'a SharedAttitude<M>> {
        match self {
            HeadingSource::Attitude(attitude) => Some(attitude),
            HeadingSource::Encoders => None,
        }
    }
}

impl<M: RawMutex> Clone for HeadingSource<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex> Copy for HeadingSource<'_, M> {}
