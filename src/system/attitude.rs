//! Shared attitude state
//!
//! The orientation estimator writes the running pitch/roll/yaw triple from its
//! periodic tick while motion commands read it from their polling loop. Both
//! sides go through [`SharedAttitude`], which keeps the triple behind a
//! blocking mutex so a reader always sees the three angles from the same tick.
//!
//! With the default [`CriticalSectionRawMutex`] the lock disables interrupts
//! for the duration of the copy, so the estimator may run in an interrupt
//! executor and the drive in thread mode. Single-executor setups can use
//! `NoopRawMutex` instead.
//!
//! # Usage
//!
//! ```rust,ignore
//! static ATTITUDE: SharedAttitude = SharedAttitude::new();
//!
//! let heading = ATTITUDE.heading();
//! ATTITUDE.reset_yaw();
//! ```

use core::cell::Cell;

use embassy_sync::blocking_mutex::{
    raw::{CriticalSectionRawMutex, RawMutex},
    Mutex,
};

/// Running orientation in degrees.
///
/// Angles accumulate without wraparound, so a robot that spun twice to the
/// left reads a yaw of 720. Use [`Attitude::heading`] for a compass value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Attitude {
    /// Rotation about the lateral (sensor Y) axis
    pub pitch: f32,
    /// Rotation about the longitudinal (sensor X) axis
    pub roll: f32,
    /// Rotation about the vertical (sensor Z) axis
    pub yaw: f32,
}

impl Attitude {
    pub const ZERO: Self = Self {
        pitch: 0.0,
        roll: 0.0,
        yaw: 0.0,
    };

    /// Yaw folded into [0, 360).
    pub fn heading(&self) -> f32 {
        wrap_degrees(self.yaw)
    }
}

/// Fold an angle into [0, 360).
pub fn wrap_degrees(angle: f32) -> f32 {
    let wrapped = angle % 360.0;
    let wrapped = if wrapped < 0.0 { wrapped + 360.0 } else { wrapped };
    // -1e-6 % 360 + 360 rounds to exactly 360
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Attitude triple shared between the estimator tick and its readers.
pub struct SharedAttitude<M: RawMutex = CriticalSectionRawMutex> {
    inner: Mutex<M, Cell<Attitude>>,
}

impl<M: RawMutex> SharedAttitude<M> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(Attitude::ZERO)),
        }
    }

    /// Consistent copy of all three angles.
    pub fn snapshot(&self) -> Attitude {
        self.inner.lock(|cell| cell.get())
    }

    /// Replace the whole triple.
    pub fn store(&self, attitude: Attitude) {
        self.inner.lock(|cell| cell.set(attitude));
    }

    /// Read-modify-write the triple under one lock and return the new value.
    ///
    /// Keep `f` short: with a critical-section mutex it runs with interrupts
    /// disabled.
    pub fn update(&self, f: impl FnOnce(Attitude) -> Attitude) -> Attitude {
        self.inner.lock(|cell| {
            let next = f(cell.get());
            cell.set(next);
            next
        })
    }

    pub fn pitch(&self) -> f32 {
        self.snapshot().pitch
    }

    pub fn roll(&self) -> f32 {
        self.snapshot().roll
    }

    pub fn yaw(&self) -> f32 {
        self.snapshot().yaw
    }

    /// Yaw in [0, 360).
    pub fn heading(&self) -> f32 {
        self.snapshot().heading()
    }

    pub fn set_pitch(&self, pitch: f32) {
        self.update(|a| Attitude { pitch, ..a });
    }

    pub fn set_roll(&self, roll: f32) {
        self.update(|a| Attitude { roll, ..a });
    }

    pub fn set_yaw(&self, yaw: f32) {
        self.update(|a| Attitude { yaw, ..a });
    }

    pub fn reset_pitch(&self) {
        self.set_pitch(0.0);
    }

    pub fn reset_roll(&self) {
        self.set_roll(0.0);
    }

    pub fn reset_yaw(&self) {
        self.set_yaw(0.0);
    }
}

impl<M: RawMutex> Default for SharedAttitude<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    use super::*;

    #[test]
    fn test_heading_wraps_into_range() {
        assert_eq!(wrap_degrees(0.0), 0.0);
        assert_eq!(wrap_degrees(360.0), 0.0);
        assert!((wrap_degrees(725.0) - 5.0).abs() < 1e-3);
        assert!((wrap_degrees(-90.0) - 270.0).abs() < 1e-3);
        assert!((wrap_degrees(-720.5) - 359.5).abs() < 1e-3);
        let tiny = wrap_degrees(-1e-6);
        assert!((0.0..360.0).contains(&tiny));
    }

    #[test]
    fn test_per_axis_setters_leave_other_axes() {
        let attitude = SharedAttitude::<NoopRawMutex>::new();
        attitude.store(Attitude {
            pitch: 1.0,
            roll: 2.0,
            yaw: 400.0,
        });

        attitude.reset_yaw();
        assert_eq!(
            attitude.snapshot(),
            Attitude {
                pitch: 1.0,
                roll: 2.0,
                yaw: 0.0
            }
        );

        attitude.set_pitch(-3.0);
        attitude.reset_roll();
        assert_eq!(attitude.pitch(), -3.0);
        assert_eq!(attitude.roll(), 0.0);
    }

    #[test]
    fn test_heading_of_shared_state() {
        let attitude = SharedAttitude::<NoopRawMutex>::new();
        attitude.set_yaw(-450.0);
        assert!((attitude.heading() - 270.0).abs() < 1e-3);
        assert_eq!(attitude.yaw(), -450.0);
    }

    #[test]
    fn test_readers_never_see_a_torn_triple() {
        // The writer always stores three equal angles; any mismatch in a
        // snapshot would mean a partial write was observed.
        let attitude: Arc<SharedAttitude> = Arc::new(SharedAttitude::new());

        let writer = {
            let attitude = attitude.clone();
            thread::spawn(move || {
                for i in 0..20_000 {
                    let v = i as f32;
                    attitude.update(|_| Attitude {
                        pitch: v,
                        roll: v,
                        yaw: v,
                    });
                }
            })
        };

        for _ in 0..20_000 {
            let a = attitude.snapshot();
            assert_eq!(a.pitch, a.roll);
            assert_eq!(a.roll, a.yaw);
        }
        writer.join().unwrap();
    }
}
