use super::*;

/// Getters for SharedRegion
///
/// Read-only access to the mapping for diagnostics, the `inspect` command and tests.
impl SharedRegion {
    /// Number of slots in the queue
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Bytes per slot, length prefix included
    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }

    /// Size of the whole mapping in bytes
    pub fn size(&self) -> usize {
        self.shm.size()
    }

    /// Name under /dev/shm, `None` for anonymous regions
    pub fn name(&self) -> Option<&str> {
        self.shm.name()
    }

    /// Get the raw pointer to the RegionHeader
    pub fn header_ptr(&self) -> *const RegionHeader {
        self.header
    }

    /// Get the raw pointer to the first slot
    ///
    /// # Safety
    /// Writes through this pointer bypass the lock and the slot format. Only
    /// meant for tests that need to damage a slot on purpose.
    pub unsafe fn data_ptr(&self) -> *mut u8 {
        self.data
    }

    /// Check that the header carries the relay magic and layout version
    pub fn is_initialized(&self) -> bool {
        let header = self.header();
        header.magic == REGION_MAGIC && header.version == REGION_VERSION
    }
}
