use embassy_time::{Duration, Instant};

/// Point in time after which a motion command gives up.
///
/// A deadline built without a timeout never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    pub fn new(start: Instant, timeout: Option<Duration>) -> Self {
        Self {
            expires_at: timeout.and_then(|t| start.checked_add(t)),
        }
    }

    /// A deadline that never expires.
    pub const fn never() -> Self {
        Self { expires_at: None }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Time left before expiry, `None` if unbounded.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at
            .map(|at| at.checked_duration_since(now).unwrap_or(Duration::from_ticks(0)))
    }
}
