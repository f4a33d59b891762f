// Ring queue behaviour over a real (anonymous) shared region.
// Run with: cargo test --test ring_queue -- --nocapture

use crosschat_relay::error::QueueError;
use crosschat_relay::Relay::Ring::layout::SLOT_HEADER_BYTES;
use crosschat_relay::Relay::Structs::{Message, Platform};
use crosschat_relay::SharedRegion;
use std::time::Duration;

const LOCK_WAIT: Duration = Duration::from_millis(100);

fn message(id: &str, text: &str) -> Message {
    Message {
        id: id.into(),
        streamer_id: "s1".into(),
        user: "alice".into(),
        text: text.into(),
        platform: Platform::Twitch,
        timestamp: 1000,
        is_vip: None,
        is_sub: None,
        is_mod: None,
        color: None,
    }
}

fn region(capacity: u32, slot_size: u32) -> SharedRegion {
    SharedRegion::anonymous(capacity, slot_size).unwrap()
}

#[test]
fn test_single_message_round_trip() {
    let region = region(256, 4096);
    let queue = region.lock_queue(LOCK_WAIT).unwrap();

    let m1 = message("m1", "hi");
    assert!(queue.enqueue(&m1).unwrap());
    assert_eq!(queue.len(), 1);

    assert_eq!(queue.dequeue().unwrap(), Some(m1));
    assert_eq!(queue.len(), 0);
    assert!(queue.is_empty());
    assert_eq!(queue.dequeue().unwrap(), None);
}

#[test]
fn test_fifo_order() {
    let region = region(64, 512);
    let queue = region.lock_queue(LOCK_WAIT).unwrap();

    let sent: Vec<_> = (0..40).map(|i| message(&format!("m{i}"), &format!("text {i}"))).collect();
    for m in &sent {
        assert!(queue.enqueue(m).unwrap());
    }

    let mut received = Vec::new();
    while let Some(m) = queue.dequeue().unwrap() {
        received.push(m);
    }
    assert_eq!(received, sent);
}

#[test]
fn test_full_queue_rejects_then_accepts_after_dequeue() {
    let region = region(8, 512);
    let queue = region.lock_queue(LOCK_WAIT).unwrap();

    for i in 0..8 {
        assert!(queue.enqueue(&message(&format!("m{i}"), "x")).unwrap(), "enqueue {i} should succeed");
    }
    assert!(queue.is_full());

    let ninth = message("m8", "ninth");
    let before = queue.cursors();
    assert!(!queue.enqueue(&ninth).unwrap());
    assert_eq!(queue.cursors(), before, "a rejected enqueue must not move the cursors");

    assert_eq!(queue.dequeue().unwrap().unwrap().id, "m0");
    assert!(queue.enqueue(&ninth).unwrap());
    assert_eq!(queue.len(), 8);

    let ids: Vec<_> = queue.snapshot().unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, ["m1", "m2", "m3", "m4", "m5", "m6", "m7", "m8"]);
}

#[test]
fn test_wraparound_keeps_order_and_cursor_invariant() {
    let region = region(4, 256);
    let queue = region.lock_queue(LOCK_WAIT).unwrap();

    let mut next = 0;
    let mut expected = 0;
    for round in 0..10 {
        for _ in 0..3 {
            assert!(queue.enqueue(&message(&format!("m{next}"), "w")).unwrap());
            next += 1;
        }
        for _ in 0..3 {
            let m = queue.dequeue().unwrap().unwrap();
            assert_eq!(m.id, format!("m{expected}"), "round {round}");
            expected += 1;
        }

        let c = queue.cursors();
        assert!(c.head < 4 && c.tail < 4);
        assert_eq!(c.tail, (c.head + c.length) % 4);
    }
    assert!(queue.is_empty());
}

#[test]
fn test_snapshot_does_not_consume() {
    let region = region(16, 512);
    let queue = region.lock_queue(LOCK_WAIT).unwrap();
    for i in 0..5 {
        queue.enqueue(&message(&format!("m{i}"), "s")).unwrap();
    }
    queue.dequeue().unwrap();

    let before = queue.cursors();
    let first = queue.snapshot().unwrap();
    let second = queue.snapshot().unwrap();
    assert_eq!(first, second);
    assert_eq!(queue.cursors(), before);
    assert_eq!(first.len(), 4);

    let mut drained = Vec::new();
    while let Some(m) = queue.dequeue().unwrap() {
        drained.push(m);
    }
    assert_eq!(drained, first);
}

#[test]
fn test_oversized_payload_is_never_written() {
    let slot_size = 256;
    let region = region(4, slot_size);
    let queue = region.lock_queue(LOCK_WAIT).unwrap();

    let small = message("ok", "fits");
    assert!(queue.enqueue(&small).unwrap());

    let huge = message("big", &"x".repeat(slot_size as usize));
    let before = queue.cursors();
    let slot_bytes = unsafe {
        std::slice::from_raw_parts(region.data_ptr(), (4 * slot_size) as usize).to_vec()
    };

    match queue.enqueue(&huge) {
        Err(QueueError::PayloadTooLarge { size, max }) => {
            assert!(size > max);
            assert_eq!(max, slot_size as usize - SLOT_HEADER_BYTES);
        }
        other => panic!("expected PayloadTooLarge, got {other:?}"),
    }

    assert_eq!(queue.cursors(), before);
    let after = unsafe { std::slice::from_raw_parts(region.data_ptr(), (4 * slot_size) as usize) };
    assert_eq!(after, slot_bytes.as_slice(), "data block must be untouched");
    assert_eq!(queue.snapshot().unwrap(), vec![small]);
}

#[test]
fn test_payload_exactly_filling_a_slot_fits() {
    let slot_size = 512u32;
    let region = region(2, slot_size);
    let queue = region.lock_queue(LOCK_WAIT).unwrap();

    let base = serde_json::to_vec(&message("edge", "")).unwrap().len();
    let text = "y".repeat(queue.max_payload() - base);
    let edge = message("edge", &text);
    assert_eq!(serde_json::to_vec(&edge).unwrap().len(), queue.max_payload());

    assert!(queue.enqueue(&edge).unwrap());
    assert_eq!(queue.dequeue().unwrap(), Some(edge));
}

#[test]
fn test_slot_wire_format() {
    let region = region(2, 256);
    let queue = region.lock_queue(LOCK_WAIT).unwrap();
    let m = message("wire", "bytes");
    queue.enqueue(&m).unwrap();

    let json = serde_json::to_vec(&m).unwrap();
    let slot = unsafe { std::slice::from_raw_parts(region.data_ptr(), 256) };
    assert_eq!(&slot[..4], &(json.len() as u32).to_le_bytes());
    assert_eq!(&slot[4..4 + json.len()], json.as_slice());
}

#[test]
fn test_corrupt_slot_is_reported_and_skipped() {
    let region = region(4, 256);
    let queue = region.lock_queue(LOCK_WAIT).unwrap();
    queue.enqueue(&message("bad", "a")).unwrap();
    queue.enqueue(&message("good", "b")).unwrap();

    // Length prefix of slot 0 now claims more than the slot holds
    unsafe {
        let prefix = 10_000u32.to_le_bytes();
        std::ptr::copy_nonoverlapping(prefix.as_ptr(), region.data_ptr(), 4);
    }

    assert!(matches!(queue.snapshot(), Err(QueueError::CorruptSlot { index: 0, len: 10_000 })));
    assert!(matches!(queue.dequeue(), Err(QueueError::CorruptSlot { index: 0, .. })));
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.dequeue().unwrap().unwrap().id, "good");
}

#[test]
fn test_garbage_json_is_reported_and_skipped() {
    let region = region(4, 256);
    let queue = region.lock_queue(LOCK_WAIT).unwrap();
    queue.enqueue(&message("bad", "a")).unwrap();
    queue.enqueue(&message("good", "b")).unwrap();

    unsafe {
        let garbage = b"\x05\x00\x00\x00{nope";
        std::ptr::copy_nonoverlapping(garbage.as_ptr(), region.data_ptr(), garbage.len());
    }

    assert!(matches!(queue.dequeue(), Err(QueueError::Serialization(_))));
    assert_eq!(queue.dequeue().unwrap().unwrap().id, "good");
}

#[test]
fn test_corrupt_control_block_is_detected() {
    let region = region(4, 256);
    unsafe {
        let header = &*region.header_ptr();
        header.control.head.store(9, std::sync::atomic::Ordering::Relaxed);
    }

    let queue = region.lock_queue(LOCK_WAIT).unwrap();
    assert!(matches!(
        queue.enqueue(&message("m", "x")),
        Err(QueueError::CorruptControl { head: 9, capacity: 4, .. })
    ));
    assert!(matches!(queue.dequeue(), Err(QueueError::CorruptControl { .. })));
}

#[test]
fn test_optional_fields_survive_the_queue() {
    let region = region(4, 512);
    let queue = region.lock_queue(LOCK_WAIT).unwrap();

    let mut m = message("flags", "hello");
    m.is_vip = Some(true);
    m.is_mod = Some(false);
    m.color = Some("#00ff00".into());
    queue.enqueue(&m).unwrap();

    let out = queue.dequeue().unwrap().unwrap();
    assert_eq!(out, m);
    assert_eq!(out.is_sub, None);
}
