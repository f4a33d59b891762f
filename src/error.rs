//! Error types shared by the region, queue, producer and pump layers.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::Relay::Structs::Platform;

/// The lock cell stayed held for the whole wait budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("lock not acquired within {waited:?}")]
pub struct LockTimeout {
    pub waited: Duration,
}

/// Failures at the lock/queue boundary.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    LockTimeout(#[from] LockTimeout),

    #[error("serialized message is {size} bytes, slot holds at most {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("slot {index} has length prefix {len} beyond the slot bounds")]
    CorruptSlot { index: u32, len: usize },

    #[error("control block out of range (head={head}, tail={tail}, length={length}, capacity={capacity})")]
    CorruptControl {
        head: u32,
        tail: u32,
        length: u32,
        capacity: u32,
    },

    #[error("message (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures creating, attaching or validating a shared region.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("shared memory error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid region geometry (capacity={capacity}, slot_size={slot_size}): {reason}")]
    InvalidGeometry {
        capacity: u32,
        slot_size: u32,
        reason: &'static str,
    },

    #[error("bad magic number {0:#x}, region not initialized by a relay")]
    BadMagic(u64),

    #[error("region layout version {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("region mapping is {actual} bytes, layout needs {needed}")]
    TooSmall { needed: usize, actual: usize },
}

/// Why the producer refused a payload before it reached the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("user is empty")]
    EmptyUser,
    #[error("text is empty")]
    EmptyText,
    #[error("streamerId is missing")]
    MissingStreamer,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown platform '{0}'")]
pub struct UnknownPlatform(pub String);

/// Failures handing a payload to a producer worker.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("worker could not attach to the shared region: {0}")]
    Region(#[from] RegionError),

    #[error("failed to spawn producer worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("producer worker for {0} is not accepting payloads")]
    WorkerUnavailable(Platform),
}

#[derive(Debug, Error)]
pub enum PumpError {
    #[error("a pump is already running in this process")]
    AlreadyRunning,

    #[error("failed to spawn pump thread: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("broadcast to {room} failed: {reason}")]
pub struct BroadcastError {
    pub room: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("persisting message {id} failed: {reason}")]
pub struct StoreError {
    pub id: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_converts_into_queue_error() {
        let err: QueueError = LockTimeout {
            waited: Duration::from_millis(50),
        }
        .into();
        assert!(matches!(err, QueueError::LockTimeout(_)));
        assert_eq!(err.to_string(), "lock not acquired within 50ms");
    }

    #[test]
    fn payload_too_large_names_both_sizes() {
        let err = QueueError::PayloadTooLarge { size: 5000, max: 4092 };
        let text = err.to_string();
        assert!(text.contains("5000"));
        assert!(text.contains("4092"));
    }
}
