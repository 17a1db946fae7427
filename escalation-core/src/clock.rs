//! Injectable source of "now".
//!
//! Every classification takes the current instant as an explicit argument;
//! the [`Clock`] trait is how long-lived callers obtain it without reaching
//! for the platform clock inline.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;

/// Supplies the current instant. Implementations must not block or have
/// side effects.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant. It only moves when a caller asks for an
/// advanced copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedClock {
    instant: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }

    /// Returns a clock `delta` later than this one.
    pub fn advanced(self, delta: TimeDelta) -> Self {
        Self {
            instant: self.instant + delta,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_returns_same_instant_every_call() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn advanced_clock_leaves_original_untouched() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(at);
        let later = clock.advanced(TimeDelta::hours(36));

        assert_eq!(clock.now(), at);
        assert_eq!(later.now() - clock.now(), TimeDelta::hours(36));
    }

    #[test]
    fn shared_and_borrowed_clocks_delegate() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 8, 30, 0).unwrap();
        let clock = FixedClock::new(at);
        let shared: Arc<dyn Clock> = Arc::new(clock);
        let boxed: Box<dyn Clock> = Box::new(clock);

        assert_eq!((&clock).now(), at);
        assert_eq!(shared.now(), at);
        assert_eq!(boxed.now(), at);
    }

    #[test]
    fn system_clock_moves_forward() {
        let a = SystemClock.now();
        let b = SystemClock.now();
        assert!(b >= a);
    }
}
