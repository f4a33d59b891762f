// This is the shared slot ring that carries serialized messages from producers to the pump

use super::layout::ControlBlock;

use std::marker::PhantomData;

/// A fixed-capacity ring of fixed-size slots living in shared memory.
///
/// Slot wire format: `[u32 LE length N][N bytes of UTF-8 JSON]`, slot `i`
/// starting at byte `i * slot_size` of the data block.
///
/// This struct is NOT stored in shared memory. It is a transient view that
/// borrows the control block and data block of a `SharedRegion`.
///
/// ### Concurrency Design:
/// The queue performs no locking of its own and its cursors are read and
/// written with relaxed ordering. Every call must happen while the region
/// lock is held; the lock's acquire/release ordering publishes slot bytes and
/// cursors to the next holder. `SharedRegion::lock_queue` hands out a
/// `QueueGuard` that enforces this.
pub struct RingQueue<'a> {
    /// Cursor block in the region header.
    pub(crate) control: &'a ControlBlock,

    /// Start of the data block.
    pub(crate) data: *mut u8,

    /// Number of slots.
    pub(crate) capacity: u32,

    /// Bytes per slot, length prefix included.
    pub(crate) slot_size: u32,

    pub(crate) _region: PhantomData<&'a mut [u8]>,
}

/// Point-in-time copy of the control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Cursors {
    pub head: u32,
    pub tail: u32,
    pub length: u32,
}
