use crate::config::RegionSettings;
use crate::error::{LockTimeout, RegionError};
use crate::Core::lock::AtomicLock;
use crate::Core::SharedMemory::{
    attach_shared_fd, attach_shared_memory, create_shared_memory, unlink_shared_memory, RawHandle,
    SharedMemoryBackend,
};
use crate::Relay::builder::RegionBuilder;
use crate::Relay::guard::QueueGuard;
use crate::Relay::Ring::layout::{
    bytes_for_region, data_offset, ControlBlock, RegionHeader, REGION_MAGIC, REGION_VERSION,
    SLOT_HEADER_BYTES,
};
use crate::Relay::Ring::RingQueue;
use crossbeam_utils::CachePadded;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
mod debug;
mod getters;

/// Transferable reference to a region. Hand it to another thread or process
/// and call [`SharedRegion::attach`] there to get its own mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionHandle {
    /// `/dev/shm/<name>`, usable from any process.
    Named(String),
    /// Descriptor of an anonymous region, usable inside the creating process
    /// while the creating `SharedRegion` is alive.
    Fd(i32),
}

/// One mapping of the shared lock cell, control block and data block.
///
/// Every participant holds its own `SharedRegion` (created or attached); they
/// all address the same underlying memory.
pub struct SharedRegion {
    shm: Box<dyn SharedMemoryBackend>,
    header: *const RegionHeader,
    data: *mut u8,
    capacity: u32,
    slot_size: u32,
}

lazy_static! {
    static ref GLOBAL_REGION: Mutex<Option<Arc<SharedRegion>>> = Mutex::new(None);
}

fn check_geometry(capacity: u32, slot_size: u32) -> Result<usize, RegionError> {
    let invalid = |reason| RegionError::InvalidGeometry {
        capacity,
        slot_size,
        reason,
    };
    if capacity == 0 {
        return Err(invalid("capacity must be non-zero"));
    }
    if slot_size as usize <= SLOT_HEADER_BYTES {
        return Err(invalid("slot must be larger than its 4-byte length prefix"));
    }
    bytes_for_region(capacity, slot_size).ok_or_else(|| invalid("region size overflows usize"))
}

impl SharedRegion {
    /// Create and initialize a fresh region.
    ///
    /// `Some(name)` backs it with `/dev/shm/<name>` (replacing any stale file
    /// of that name), `None` with an anonymous memfd. The lock starts free and
    /// the queue empty.
    pub fn create(name: Option<&str>, capacity: u32, slot_size: u32) -> Result<Self, RegionError> {
        let size = check_geometry(capacity, slot_size)?;

        let shm = create_shared_memory(size, name).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!(
                    "Failed to create shared region:\n\
                    ├─ Name:       {}\n\
                    ├─ Total size: {size}\n\
                    ╰─ Error: {e}",
                    name.unwrap_or("<anonymous>")
                ),
            )
        })?;

        let header_ptr = shm.as_ptr() as *mut RegionHeader;
        if (header_ptr as usize) % std::mem::align_of::<RegionHeader>() != 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "Shared memory not properly aligned").into());
        }

        unsafe {
            std::ptr::write(
                header_ptr,
                RegionHeader {
                    magic: REGION_MAGIC,
                    version: REGION_VERSION,
                    capacity,
                    slot_size,
                    reserved: 0,
                    lock: CachePadded::new(AtomicU32::new(0)),
                    control: CachePadded::new(ControlBlock {
                        head: AtomicU32::new(0),
                        tail: AtomicU32::new(0),
                        length: AtomicU32::new(0),
                    }),
                },
            );
        }

        let data = unsafe { shm.as_ptr().add(data_offset()) };
        info!(
            name = name.unwrap_or("<anonymous>"),
            capacity, slot_size, size, "created shared region"
        );

        Ok(Self {
            shm,
            header: header_ptr,
            data,
            capacity,
            slot_size,
        })
    }

    /// Create an anonymous region, shareable in-process through [`RegionHandle::Fd`].
    pub fn anonymous(capacity: u32, slot_size: u32) -> Result<Self, RegionError> {
        Self::create(None, capacity, slot_size)
    }

    /// Map an existing region. Geometry is read from its header and checked
    /// against the mapping size.
    pub fn attach(handle: &RegionHandle) -> Result<Self, RegionError> {
        let shm = match handle {
            RegionHandle::Named(name) => attach_shared_memory(name, data_offset())?,
            RegionHandle::Fd(fd) => attach_shared_fd(*fd, data_offset())?,
        };

        let header = shm.as_ptr() as *const RegionHeader;
        let (magic, version, capacity, slot_size) =
            unsafe { ((*header).magic, (*header).version, (*header).capacity, (*header).slot_size) };

        if magic != REGION_MAGIC {
            return Err(RegionError::BadMagic(magic));
        }
        if version != REGION_VERSION {
            return Err(RegionError::VersionMismatch {
                found: version,
                expected: REGION_VERSION,
            });
        }
        let needed = check_geometry(capacity, slot_size)?;
        if shm.size() < needed {
            return Err(RegionError::TooSmall {
                needed,
                actual: shm.size(),
            });
        }

        let data = unsafe { shm.as_ptr().add(data_offset()) };
        debug!(?handle, capacity, slot_size, "attached shared region");

        Ok(Self {
            shm,
            header,
            data,
            capacity,
            slot_size,
        })
    }

    #[inline]
    fn header(&self) -> &RegionHeader {
        // Safety: the header lives at the start of the mapping owned by `self.shm`
        unsafe { &*self.header }
    }

    /// The region's lock.
    pub fn lock(&self) -> AtomicLock<'_> {
        AtomicLock::new(&self.header().lock)
    }

    /// The region's queue, without taking the lock.
    ///
    /// Callers must hold the lock for every queue operation. Prefer
    /// [`lock_queue`](Self::lock_queue).
    pub fn queue(&self) -> RingQueue<'_> {
        unsafe { RingQueue::from_raw(&self.header().control, self.data, self.capacity, self.slot_size) }
    }

    /// Acquire the lock and get the queue behind a guard that releases on drop.
    pub fn lock_queue(&self, timeout: Duration) -> Result<QueueGuard<'_>, LockTimeout> {
        QueueGuard::acquire(self.lock(), self.queue(), timeout)
    }

    /// A handle other participants can attach with.
    pub fn handle(&self) -> RegionHandle {
        match self.shm.name() {
            Some(name) => RegionHandle::Named(name.to_owned()),
            None => {
                let RawHandle::Fd(fd) = self.shm.raw_handle();
                RegionHandle::Fd(fd)
            }
        }
    }

    /// Remove the backing file of a named region. Mappings stay valid until
    /// dropped. No-op for anonymous regions.
    pub fn unlink(&self) -> io::Result<()> {
        match self.shm.name() {
            Some(name) => {
                unlink_shared_memory(name)?;
                info!(name, "unlinked shared region");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Install the process-wide region, creating it with `create` on first call.
///
/// Later calls return the installed region and never run `create`.
pub fn init_global_with<F>(create: F) -> Result<Arc<SharedRegion>, RegionError>
where
    F: FnOnce() -> Result<SharedRegion, RegionError>,
{
    let mut slot = GLOBAL_REGION.lock();
    if let Some(region) = slot.as_ref() {
        return Ok(Arc::clone(region));
    }
    let region = Arc::new(create()?);
    *slot = Some(Arc::clone(&region));
    Ok(region)
}

/// Install the process-wide region from configuration. An empty name means anonymous.
pub fn init_global(settings: &RegionSettings) -> Result<Arc<SharedRegion>, RegionError> {
    RegionBuilder::from_settings(settings).init_global()
}

/// The process-wide region, if [`init_global`] has run.
pub fn global() -> Option<Arc<SharedRegion>> {
    GLOBAL_REGION.lock().clone()
}

// The mapping is only reached through atomics and the lock protocol
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}
