use crosschat_relay::error::RegionError;
use crosschat_relay::Core::{create_shared_memory, RawHandle};
use crosschat_relay::{Message, Platform, RegionHandle, SharedRegion};
use std::time::Duration;

fn message(id: &str) -> Message {
    Message {
        id: id.into(),
        streamer_id: "s".into(),
        user: "u".into(),
        text: "t".into(),
        platform: Platform::Trovo,
        timestamp: 7,
        is_vip: None,
        is_sub: None,
        is_mod: None,
        color: None,
    }
}

#[test]
fn test_fresh_region_is_empty_and_unlocked() {
    let region = SharedRegion::anonymous(32, 256).unwrap();
    assert!(region.is_initialized());
    assert_eq!(region.capacity(), 32);
    assert_eq!(region.slot_size(), 256);
    assert!(region.size() >= 32 * 256);
    assert!(!region.lock().is_held());

    let cursors = region.queue().cursors();
    assert_eq!((cursors.head, cursors.tail, cursors.length), (0, 0, 0));
}

#[test]
fn test_invalid_geometry_is_rejected() {
    assert!(matches!(
        SharedRegion::anonymous(0, 256),
        Err(RegionError::InvalidGeometry { capacity: 0, .. })
    ));
    assert!(matches!(
        SharedRegion::anonymous(4, 4),
        Err(RegionError::InvalidGeometry { slot_size: 4, .. })
    ));
    assert!(matches!(
        SharedRegion::anonymous(u32::MAX, u32::MAX),
        Err(RegionError::InvalidGeometry { .. }) | Err(RegionError::Io(_))
    ));
}

#[test]
fn test_attached_mapping_shares_queue_and_geometry() {
    let owner = SharedRegion::anonymous(8, 512).unwrap();
    let handle = owner.handle();
    assert!(matches!(handle, RegionHandle::Fd(_)));

    let other = SharedRegion::attach(&handle).unwrap();
    assert_eq!(other.capacity(), 8);
    assert_eq!(other.slot_size(), 512);
    assert_ne!(other.header_ptr(), owner.header_ptr(), "attach must create a second mapping");

    owner.lock_queue(Duration::from_millis(100)).unwrap().enqueue(&message("a")).unwrap();
    let got = other.lock_queue(Duration::from_millis(100)).unwrap().dequeue().unwrap();
    assert_eq!(got.map(|m| m.id).as_deref(), Some("a"));
    assert!(owner.lock_queue(Duration::from_millis(100)).unwrap().is_empty());
}

#[cfg(target_os = "linux")]
#[test]
fn test_attach_rejects_uninitialized_memory() {
    let raw = create_shared_memory(64 * 1024, None).unwrap();
    let RawHandle::Fd(fd) = raw.raw_handle();

    assert!(matches!(
        SharedRegion::attach(&RegionHandle::Fd(fd)),
        Err(RegionError::BadMagic(0))
    ));
}

#[test]
fn test_debug_output_names_geometry() {
    let region = SharedRegion::anonymous(4, 128).unwrap();
    let region_dbg = format!("{region:?}");
    assert!(region_dbg.contains("<anonymous>"));
    assert!(region_dbg.contains("capacity: 4"));
    assert!(region_dbg.contains("initialized: true"));

    region.lock().acquire(Duration::ZERO).unwrap();
    assert_eq!(format!("{:?}", region.lock()), "AtomicLock { held: true }");
    region.lock().release();

    let queue_dbg = format!("{:?}", region.queue());
    assert!(queue_dbg.starts_with("RingQueue"));
    assert!(queue_dbg.contains("length: 0"));
}

#[cfg(target_os = "linux")]
#[test]
#[serial_test::serial]
fn test_named_region_round_trip_and_unlink() {
    let name = format!("crosschat_region_test_{}", std::process::id());
    let owner = SharedRegion::create(Some(&name), 4, 256).unwrap();
    assert_eq!(owner.name(), Some(name.as_str()));
    assert_eq!(owner.handle(), RegionHandle::Named(name.clone()));

    let other = SharedRegion::attach(&owner.handle()).unwrap();
    owner.lock_queue(Duration::from_millis(100)).unwrap().enqueue(&message("n")).unwrap();
    assert_eq!(other.lock_queue(Duration::from_millis(100)).unwrap().len(), 1);

    owner.unlink().unwrap();
    assert!(SharedRegion::attach(&RegionHandle::Named(name)).is_err());
    // Existing mappings outlive the name
    assert_eq!(other.lock_queue(Duration::from_millis(100)).unwrap().len(), 1);
}
