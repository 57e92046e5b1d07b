//! Shared-state primitives used between hardware callbacks, actuator tasks,
//! and the sequencer.

pub mod barrier;

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

pub use barrier::SyncBarrier;

#[cfg(target_os = "none")]
pub type PanoMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

#[cfg(not(target_os = "none"))]
pub type PanoMutex = embassy_sync::blocking_mutex::raw::NoopRawMutex;

/// Copyable value guarded by a blocking mutex.
///
/// Every access is a short critical section, so callbacks and tasks on the
/// same executor never observe a torn update.
pub struct SharedCell<M, T>
where
    M: RawMutex,
    T: Copy,
{
    inner: Mutex<M, Cell<T>>,
}

impl<M, T> SharedCell<M, T>
where
    M: RawMutex,
    T: Copy,
{
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Cell::new(value)),
        }
    }

    pub fn get(&self) -> T {
        self.inner.lock(Cell::get)
    }

    pub fn set(&self, value: T) {
        self.inner.lock(|cell| cell.set(value));
    }

    /// Stores `value` and returns the previous contents.
    pub fn replace(&self, value: T) -> T {
        self.inner.lock(|cell| cell.replace(value))
    }

    /// Applies `f` atomically and returns the new value.
    pub fn update(&self, f: impl FnOnce(T) -> T) -> T {
        self.inner.lock(|cell| {
            let next = f(cell.get());
            cell.set(next);
            next
        })
    }
}
