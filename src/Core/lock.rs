//! Cross-process mutual exclusion over a single shared `u32` cell.
//!
//! The cell is `0` when free and `1` when held. There is no owner tracking:
//! any participant may release the lock, and releasing a lock you do not hold
//! silently frees it for someone else. Callers must pair every successful
//! `acquire` with exactly one `release` (see `QueueGuard`).

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;

use super::futex::{futex_wait, futex_wake};
use crate::error::LockTimeout;

pub const UNLOCKED: u32 = 0;
pub const LOCKED: u32 = 1;

/// Upper bound on a single futex sleep while waiting for the lock.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A view over a lock cell in shared memory.
#[derive(Clone, Copy)]
pub struct AtomicLock<'a> {
    cell: &'a AtomicU32,
}

impl<'a> AtomicLock<'a> {
    pub fn new(cell: &'a AtomicU32) -> Self {
        Self { cell }
    }

    /// Single CAS attempt, never waits.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        self.cell
            .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            .is_ok()
    }

    /// Acquire the lock, waiting at most `timeout`.
    ///
    /// Spins and yields briefly under contention, then sleeps on the cell in
    /// slices of at most [`POLL_INTERVAL`] so a release in another process is
    /// noticed even if its wake-up is missed. Not fair and not reentrant.
    pub fn acquire(&self, timeout: Duration) -> Result<(), LockTimeout> {
        if self.try_acquire() {
            return Ok(());
        }

        let start = Instant::now();
        let backoff = Backoff::new();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(LockTimeout { waited: elapsed });
            }

            if self.try_acquire() {
                return Ok(());
            }

            if !backoff.is_completed() {
                backoff.snooze();
                continue;
            }

            let remaining = timeout - elapsed;
            futex_wait(self.cell, LOCKED, remaining.min(POLL_INTERVAL));
        }
    }

    /// Free the lock and wake one waiter.
    ///
    /// Unconditional: this does not check that the caller holds the lock.
    #[inline]
    pub fn release(&self) {
        self.cell.store(UNLOCKED, Release);
        futex_wake(self.cell, 1);
    }

    /// Diagnostic read of the cell. Stale as soon as it returns.
    pub fn is_held(&self) -> bool {
        self.cell.load(Relaxed) != UNLOCKED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_free_lock_is_immediate() {
        let cell = AtomicU32::new(UNLOCKED);
        let lock = AtomicLock::new(&cell);
        assert!(lock.acquire(Duration::ZERO).is_ok());
        assert!(lock.is_held());
        lock.release();
        assert!(!lock.is_held());
    }

    #[test]
    fn try_acquire_fails_while_held() {
        let cell = AtomicU32::new(UNLOCKED);
        let lock = AtomicLock::new(&cell);
        assert!(lock.try_acquire());
        assert!(!lock.try_acquire());
        lock.release();
        assert!(lock.try_acquire());
    }

    #[test]
    fn zero_timeout_on_held_lock_fails() {
        let cell = AtomicU32::new(LOCKED);
        let lock = AtomicLock::new(&cell);
        let err = lock.acquire(Duration::ZERO).unwrap_err();
        assert!(err.waited >= Duration::ZERO);
    }
}
