pub mod SharedMemory;
pub mod futex;
pub mod lock;
pub mod region;

pub use SharedMemory::{
    attach_shared_fd, attach_shared_memory, create_shared_memory, unlink_shared_memory, RawHandle,
    SharedMemoryBackend,
};
pub use lock::AtomicLock;
pub use region::{global, init_global, init_global_with, RegionHandle, SharedRegion};
