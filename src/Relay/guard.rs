use std::ops::Deref;
use std::time::Duration;

use crate::error::LockTimeout;
use crate::Core::lock::AtomicLock;
use crate::Relay::Ring::RingQueue;

/// Exclusive access to a region's queue. The lock is released when the guard
/// is dropped, on every exit path including panics.
pub struct QueueGuard<'a> {
    lock: AtomicLock<'a>,
    queue: RingQueue<'a>,
}

impl<'a> QueueGuard<'a> {
    pub fn acquire(lock: AtomicLock<'a>, queue: RingQueue<'a>, timeout: Duration) -> Result<Self, LockTimeout> {
        lock.acquire(timeout)?;
        Ok(Self { lock, queue })
    }
}

impl<'a> Deref for QueueGuard<'a> {
    type Target = RingQueue<'a>;

    fn deref(&self) -> &Self::Target {
        &self.queue
    }
}

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
