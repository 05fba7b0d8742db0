//! Time source for every loop in the crate.
//!
//! Control loops never call `Instant::now()` or `Timer` directly. They go
//! through a [`Clock`] so the same code runs against the embassy time driver on
//! target and against simulated time in tests.

use embassy_time::{Duration, Instant, Timer};

/// Monotonic time plus the ability to wait on it.
#[allow(async_fn_in_trait)]
pub trait Clock {
    /// Current time.
    fn now(&self) -> Instant;

    /// Suspend until `deadline` has passed.
    async fn sleep_until(&self, deadline: Instant);

    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration) {
        self.sleep_until(self.now() + duration).await
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> Instant {
        T::now(self)
    }

    async fn sleep_until(&self, deadline: Instant) {
        T::sleep_until(self, deadline).await
    }

    async fn sleep(&self, duration: Duration) {
        T::sleep(self, duration).await
    }
}

/// Clock backed by the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        Timer::at(deadline).await
    }

    async fn sleep(&self, duration: Duration) {
        Timer::after(duration).await
    }
}
