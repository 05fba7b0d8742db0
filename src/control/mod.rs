//! Feedback control primitives
//!
//! Motion commands run two loops at once, a primary loop toward the target and
//! a secondary loop that corrects drift. Both go through the [`Controller`]
//! trait so callers can swap in their own strategy. [`Pid`] is the stock
//! implementation.

mod deadline;
mod pid;

use embassy_time::Instant;

pub use deadline::Deadline;
pub use pid::{Pid, PidConfig, DEFAULT_TIMESTEP};

/// A closed-loop controller driven by a stream of error samples.
pub trait Controller {
    /// Feed the current error (target minus measurement) sampled at `now` and
    /// get the next output.
    fn update(&mut self, error: f32, now: Instant) -> f32;

    /// Whether the error has stayed inside the tolerance band long enough.
    fn is_done(&self) -> bool;

    /// Forget all accumulated state so the controller can start a new command.
    fn clear_history(&mut self);
}

impl<T: Controller + ?Sized> Controller for &mut T {
    fn update(&mut self, error: f32, now: Instant) -> f32 {
        T::update(self, error, now)
    }

    fn is_done(&self) -> bool {
        T::is_done(self)
    }

    fn clear_history(&mut self) {
        T::clear_history(self)
    }
}
