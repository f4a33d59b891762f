use crossbeam_utils::CachePadded;
use std::mem::size_of;
use std::sync::atomic::AtomicU32;

/// "CC_RELAY"
pub const REGION_MAGIC: u64 = 0x4343_5F52_454C_4159;

/// Bumped whenever `RegionHeader` or the slot format changes.
pub const REGION_VERSION: u32 = 1;

/// Bytes of the little-endian `u32` length prefix at the start of every slot.
pub const SLOT_HEADER_BYTES: usize = 4;

/// The data block starts on this boundary.
pub const DATA_ALIGN: usize = 128;

pub const DEFAULT_CAPACITY: u32 = 256;
pub const DEFAULT_SLOT_SIZE: u32 = 4096;

/// Queue cursors. Mutated only while the region lock is held.
///
/// Invariants: `length <= capacity`, `head, tail < capacity`,
/// `tail == (head + length) % capacity`.
#[repr(C)]
pub struct ControlBlock {
    /// Next slot to read.
    pub head: AtomicU32,
    /// Next slot to write.
    pub tail: AtomicU32,
    /// Number of occupied slots.
    pub length: AtomicU32,
}

/// Header at the very beginning of a shared region.
///
/// Every process that maps the region reads geometry from here, so only the
/// creator decides capacity and slot size. The lock cell and the control block
/// sit on their own cache lines so spinning waiters on the lock do not keep
/// bouncing the cursors between cores.
#[repr(C, align(128))]
pub struct RegionHeader {
    /// Identifies the mapping as a relay region.
    pub magic: u64,

    /// Layout version, see [`REGION_VERSION`].
    pub version: u32,

    /// Number of slots in the data block.
    pub capacity: u32,

    /// Bytes per slot including the length prefix.
    pub slot_size: u32,

    pub reserved: u32,

    /// `0` free, `1` held.
    pub lock: CachePadded<AtomicU32>,

    pub control: CachePadded<ControlBlock>,
}

/// Offset of the data block from the start of the region.
#[inline]
pub const fn data_offset() -> usize {
    (size_of::<RegionHeader>() + DATA_ALIGN - 1) & !(DATA_ALIGN - 1)
}

/// Total mapping size for the given geometry, `None` on overflow.
pub fn bytes_for_region(capacity: u32, slot_size: u32) -> Option<usize> {
    (capacity as usize)
        .checked_mul(slot_size as usize)
        .and_then(|data| data.checked_add(data_offset()))
}
