// Backing memory for relay regions.
// Named regions are files under /dev/shm; anonymous ones come from memfd_create
// and travel between threads as a file descriptor.

use std::fmt::Debug;
use std::io;

/// A read/write `MAP_SHARED` mapping that other mappings of the same backing
/// object observe.
pub trait SharedMemoryBackend: Send + Sync + Debug {
    /// Start of the mapping
    fn as_ptr(&self) -> *mut u8;

    /// Mapped length in bytes
    fn size(&self) -> usize;

    /// Descriptor of the backing object
    fn raw_handle(&self) -> RawHandle;

    /// Name under /dev/shm, `None` for anonymous regions
    fn name(&self) -> Option<&str>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHandle {
    Fd(i32),
}

/// Allocate `size` zeroed bytes of shared memory.
///
/// `Some(name)` backs the mapping with `/dev/shm/<name>`, replacing a stale
/// file of the same name, so unrelated processes can attach by name.
/// `None` uses an anonymous memfd, reachable only through its descriptor.
#[cfg(target_os = "linux")]
pub fn create_shared_memory(size: usize, name: Option<&str>) -> io::Result<Box<dyn SharedMemoryBackend>> {
    let shm = match name {
        Some(name) => LinuxSharedMemory::create_named(size, name)?,
        None => LinuxSharedMemory::create_anonymous(size)?,
    };
    Ok(Box::new(shm))
}

/// Map the whole of `/dev/shm/<name>`. Fails with `InvalidData` when the file
/// holds fewer than `min_size` bytes.
#[cfg(target_os = "linux")]
pub fn attach_shared_memory(name: &str, min_size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(LinuxSharedMemory::attach_named(name, min_size)?))
}

/// Map the object behind `fd` through a duplicate descriptor, so the new
/// mapping does not depend on the lifetime of the caller's copy.
#[cfg(target_os = "linux")]
pub fn attach_shared_fd(fd: i32, min_size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(LinuxSharedMemory::attach_fd(fd, min_size)?))
}

/// Delete `/dev/shm/<name>`. Mappings that already exist keep working.
#[cfg(target_os = "linux")]
pub fn unlink_shared_memory(name: &str) -> io::Result<()> {
    std::fs::remove_file(shm_path(name)?)
}

#[cfg(not(target_os = "linux"))]
pub fn create_shared_memory(_size: usize, _name: Option<&str>) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(unsupported())
}

#[cfg(not(target_os = "linux"))]
pub fn attach_shared_memory(_name: &str, _min_size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(unsupported())
}

#[cfg(not(target_os = "linux"))]
pub fn attach_shared_fd(_fd: i32, _min_size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(unsupported())
}

#[cfg(not(target_os = "linux"))]
pub fn unlink_shared_memory(_name: &str) -> io::Result<()> {
    Err(unsupported())
}

#[cfg(not(target_os = "linux"))]
fn unsupported() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "relay regions need Linux shared memory")
}

#[cfg(target_os = "linux")]
pub use linux::LinuxSharedMemory;

#[cfg(target_os = "linux")]
fn shm_path(name: &str) -> io::Result<std::path::PathBuf> {
    match name {
        "" | "." | ".." => {}
        _ if !name.contains('/') => return Ok(std::path::Path::new("/dev/shm").join(name)),
        _ => {}
    }
    Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("'{name}' is not a valid region name"),
    ))
}

#[cfg(target_os = "linux")]
mod linux {
    use super::{shm_path, RawHandle, SharedMemoryBackend};
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
    use std::os::unix::fs::OpenOptionsExt;
    use std::ptr::{self, NonNull};

    /// A mapping plus the file that backs it. The file closes itself; only
    /// the mapping needs explicit teardown.
    #[derive(Debug)]
    pub struct LinuxSharedMemory {
        ptr: NonNull<u8>,
        size: usize,
        file: File,
        name: Option<String>,
    }

    // The pointer targets a process-shared mapping, not thread-local state
    unsafe impl Send for LinuxSharedMemory {}
    unsafe impl Sync for LinuxSharedMemory {}

    impl LinuxSharedMemory {
        pub fn create_named(size: usize, name: &str) -> io::Result<Self> {
            let path = shm_path(name)?;
            // truncate(true) zeroes whatever a previous run left behind
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&path)
                .map_err(|e| io::Error::new(e.kind(), format!("cannot create {}: {e}", path.display())))?;
            Self::sized(file, size, Some(name.to_owned()))
        }

        pub fn create_anonymous(size: usize) -> io::Result<Self> {
            let raw = unsafe { libc::memfd_create(c"crosschat_region".as_ptr(), libc::MFD_CLOEXEC) };
            if raw < 0 {
                return Err(io::Error::last_os_error());
            }
            // Safety: memfd_create just returned this descriptor and nothing else owns it
            let file = File::from(unsafe { OwnedFd::from_raw_fd(raw) });
            Self::sized(file, size, None)
        }

        pub fn attach_named(name: &str, min_size: usize) -> io::Result<Self> {
            let path = shm_path(name)?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|e| io::Error::new(e.kind(), format!("cannot open {}: {e}", path.display())))?;
            Self::existing(file, min_size, Some(name.to_owned()))
        }

        pub fn attach_fd(fd: RawFd, min_size: usize) -> io::Result<Self> {
            // Safety: the caller vouches that `fd` is open for the duration of this call
            let owned = unsafe { BorrowedFd::borrow_raw(fd) }.try_clone_to_owned()?;
            Self::existing(File::from(owned), min_size, None)
        }

        fn sized(file: File, size: usize, name: Option<String>) -> io::Result<Self> {
            if size == 0 {
                return Err(io::Error::new(io::ErrorKind::InvalidInput, "cannot map an empty region"));
            }
            let len = u64::try_from(size).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
            file.set_len(len)?;
            let ptr = map(&file, size)?;
            Ok(Self { ptr, size, file, name })
        }

        fn existing(file: File, min_size: usize, name: Option<String>) -> io::Result<Self> {
            let size = usize::try_from(file.metadata()?.len())
                .map_err(|_| io::Error::from(io::ErrorKind::InvalidData))?;
            if size == 0 || size < min_size {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("backing object is {size} bytes, need at least {min_size}"),
                ));
            }
            let ptr = map(&file, size)?;
            Ok(Self { ptr, size, file, name })
        }
    }

    fn map(file: &File, size: usize) -> io::Result<NonNull<u8>> {
        // Safety: a fresh shared mapping of a descriptor we hold open; no existing memory is aliased
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(addr.cast::<u8>()).ok_or_else(|| io::Error::other("mmap returned null"))
    }

    impl Drop for LinuxSharedMemory {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.ptr.as_ptr().cast(), self.size);
            }
        }
    }

    impl SharedMemoryBackend for LinuxSharedMemory {
        fn as_ptr(&self) -> *mut u8 {
            self.ptr.as_ptr()
        }

        fn size(&self) -> usize {
            self.size
        }

        fn raw_handle(&self) -> RawHandle {
            RawHandle::Fd(self.file.as_raw_fd())
        }

        fn name(&self) -> Option<&str> {
            self.name.as_deref()
        }
    }
}
