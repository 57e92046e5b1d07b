//! Single-slot rendezvous between an actuator and the sequencer.
//!
//! The sequencer arms the barrier, hands a request to the actuator task and
//! waits. Whoever produces the outcome first releases it: the actuator when
//! its verify loop finishes, or a hardware fault callback via
//! [`SyncBarrier::release_if_active`]. Misuse is logged and reported through
//! the boolean results rather than panicking.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicBool, Ordering};

/// Named rendezvous carrying the outcome of one command.
pub struct SyncBarrier<M, T>
where
    M: RawMutex,
{
    name: &'static str,
    active: AtomicBool,
    signal: Signal<M, T>,
}

impl<M, T> SyncBarrier<M, T>
where
    M: RawMutex,
    T: Send,
{
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            active: AtomicBool::new(false),
            signal: Signal::new(),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` while a command is bracketed by this barrier.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Marks the barrier active and discards any stale outcome.
    ///
    /// Returns `false` (and logs) when the barrier was already armed; the
    /// barrier stays armed in that case.
    pub fn arm(&self) -> bool {
        log_debug!("barrier {} armed", self.name);
        if self.active.swap(true, Ordering::AcqRel) {
            log_warn!("barrier {} armed while already active", self.name);
            return false;
        }
        self.signal.reset();
        true
    }

    /// Clears the active flag and wakes the waiter with `outcome`.
    ///
    /// Returns `false` (and logs) when the barrier was not armed; the outcome
    /// is dropped in that case.
    pub fn release(&self, outcome: T) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            log_warn!("barrier {} released while not active", self.name);
            return false;
        }
        log_debug!("barrier {} released", self.name);
        self.signal.signal(outcome);
        true
    }

    /// Releases only when armed. Safe to call from racing completion paths.
    pub fn release_if_active(&self, outcome: T) -> bool {
        if self
            .active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        log_debug!("barrier {} released by late path", self.name);
        self.signal.signal(outcome);
        true
    }

    /// Suspends until the matching release. There is no timeout.
    pub async fn wait(&self) -> T {
        log_debug!("barrier {} waiting", self.name);
        let outcome = self.signal.wait().await;
        log_debug!("barrier {} wait complete", self.name);
        outcome
    }
}
