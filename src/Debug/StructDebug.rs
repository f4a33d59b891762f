use std::fmt;
use crate::Core::lock::AtomicLock;
use crate::Core::region::SharedRegion;
use crate::Relay::Ring::RingQueue;

/// Debug function for SharedRegion
///
/// Provides a safe debug representation that shows:
/// - Backing name (or anonymous)
/// - Header pointer location
/// - Queue geometry
/// - Initialization status
pub fn debug_shared_region(region: &SharedRegion, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SharedRegion")
        .field("name", &region.name().unwrap_or("<anonymous>"))
        .field("header", &format_args!("{:p}", region.header_ptr()))
        .field("capacity", &region.capacity())
        .field("slot_size", &region.slot_size())
        .field("size", &region.size())
        .field("initialized", &region.is_initialized())
        .finish()
}

/// Debug function for RingQueue
///
/// Cursor values are a relaxed read and may be stale unless the lock is held.
pub fn debug_ring_queue(queue: &RingQueue<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let cursors = queue.cursors();
    f.debug_struct("RingQueue")
        .field("capacity", &queue.capacity())
        .field("slot_size", &queue.slot_size())
        .field("head", &cursors.head)
        .field("tail", &cursors.tail)
        .field("length", &cursors.length)
        .finish_non_exhaustive()
}

pub fn debug_atomic_lock(lock: &AtomicLock<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AtomicLock")
        .field("held", &lock.is_held())
        .finish()
}
