//! Time source abstraction used by every delay in the crate.
//!
//! Settle delays, photo delays and the aircraft yaw cap all go through
//! [`Clock`], so host tests and the emulator can drive a virtual timeline
//! while firmware uses `embassy-time`.

use core::future::Future;
use core::time::Duration;

/// Monotonic instant produced by a [`Clock`].
pub trait MonotonicInstant: Copy + Ord {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Source of time and delays.
pub trait Clock {
    type Instant: MonotonicInstant;

    fn now(&self) -> Self::Instant;

    /// Suspends the caller for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;

    /// Time elapsed since `earlier`.
    fn elapsed_since(&self, earlier: Self::Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

#[cfg(target_os = "none")]
pub use embassy::EmbassyClock;

#[cfg(target_os = "none")]
mod embassy {
    use core::future::Future;
    use core::time::Duration;

    use super::{Clock, MonotonicInstant};

    impl MonotonicInstant for embassy_time::Instant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            let elapsed = embassy_time::Instant::saturating_duration_since(self, earlier);
            Duration::from_micros(elapsed.as_micros())
        }
    }

    /// Clock backed by the embassy time driver.
    #[derive(Copy, Clone, Debug, Default)]
    pub struct EmbassyClock;

    impl Clock for EmbassyClock {
        type Instant = embassy_time::Instant;

        fn now(&self) -> Self::Instant {
            embassy_time::Instant::now()
        }

        fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
            let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
            embassy_time::Timer::after(embassy_time::Duration::from_micros(micros))
        }
    }
}
