// End to end inside one process: platform workers -> shared ring -> pump ->
// room subscribers and history.

use crosschat_relay::config::{ProducerSettings, PumpSettings};
use crosschat_relay::Relay::collaborators::room_name;
use crosschat_relay::Relay::diagnostics::{self, DiagnosticCause};
use crosschat_relay::Relay::{MemoryHistory, ProducerPool, Pump, RegionBuilder, RoomBroadcaster};
use crosschat_relay::{InboundPayload, Message, Platform};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn payload(streamer: &str, user: &str, text: &str) -> InboundPayload {
    InboundPayload {
        streamer_id: Some(streamer.into()),
        user: user.into(),
        text: text.into(),
        ..Default::default()
    }
}

/// Tick until `want` messages have been persisted or the deadline passes.
fn pump_until<B, S>(pump: &Pump<B, S>, history: &MemoryHistory, streamer: &str, want: usize)
where
    B: crosschat_relay::Relay::Broadcaster,
    S: crosschat_relay::Relay::MessageStore,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while history.history(streamer).len() < want {
        assert!(Instant::now() < deadline, "only {} of {want} arrived", history.history(streamer).len());
        pump.tick();
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_payloads_from_every_platform_reach_the_room() {
    let region = Arc::new(RegionBuilder::new().with_capacity(64).with_slot_size(1024).build().unwrap());
    let rooms = Arc::new(RoomBroadcaster::new());
    let history = Arc::new(MemoryHistory::new(300));
    let room = rooms.subscribe(&room_name("lobby"));

    let pool = ProducerPool::new(Arc::clone(&region), ProducerSettings::default(), diagnostics::DiagnosticSender::discard());
    let pump = Pump::new(
        Arc::clone(&region),
        Arc::clone(&rooms),
        Arc::clone(&history),
        PumpSettings::default(),
        diagnostics::DiagnosticSender::discard(),
    );

    let platforms = [Platform::Twitch, Platform::YouTube, Platform::Kick];
    for (n, platform) in platforms.iter().enumerate() {
        pool.dispatch(*platform, payload("lobby", "viewer", &format!("hello {n}"))).unwrap();
    }
    pump_until(&pump, &history, "lobby", 3);

    assert_eq!(pool.active(), {
        let mut sorted = platforms.to_vec();
        sorted.sort();
        sorted
    });

    let received: Vec<Message> = room.try_iter().collect();
    assert_eq!(received.len(), 3);
    let mut seen: Vec<_> = received.iter().map(|m| m.platform).collect();
    seen.sort();
    let mut expected = platforms.to_vec();
    expected.sort();
    assert_eq!(seen, expected);
    assert!(received.iter().all(|m| m.streamer_id == "lobby" && m.user == "viewer"));

    pool.shutdown();
    assert!(pool.active().is_empty());
}

#[test]
fn test_one_platform_keeps_its_order() {
    let region = Arc::new(RegionBuilder::new().with_capacity(128).with_slot_size(512).build().unwrap());
    let history = Arc::new(MemoryHistory::new(300));
    let pool = ProducerPool::new(Arc::clone(&region), ProducerSettings::default(), diagnostics::DiagnosticSender::discard());
    let pump = Pump::new(
        Arc::clone(&region),
        RoomBroadcaster::new(),
        Arc::clone(&history),
        PumpSettings::default(),
        diagnostics::DiagnosticSender::discard(),
    );

    for n in 0..100 {
        pool.dispatch(Platform::Discord, payload("ordered", "u", &n.to_string())).unwrap();
    }
    pump_until(&pump, &history, "ordered", 100);

    let texts: Vec<_> = history.history("ordered").into_iter().map(|m| m.text).collect();
    let expected: Vec<_> = (0..100).map(|n| n.to_string()).collect();
    assert_eq!(texts, expected);
}

#[test]
fn test_rejected_payloads_never_reach_the_queue() {
    let region = Arc::new(RegionBuilder::new().with_capacity(8).with_slot_size(512).build().unwrap());
    let history = Arc::new(MemoryHistory::new(300));
    let pool = ProducerPool::new(Arc::clone(&region), ProducerSettings::default(), diagnostics::DiagnosticSender::discard());

    pool.dispatch(Platform::X, payload("s", "", "no user")).unwrap();
    pool.dispatch(Platform::X, payload("s", "u", "  ")).unwrap();
    pool.dispatch(Platform::X, payload("s", "u", "kept")).unwrap();
    // Closing the inbox waits for the worker to finish all three
    pool.shutdown();

    let pump = Pump::new(
        Arc::clone(&region),
        RoomBroadcaster::new(),
        Arc::clone(&history),
        PumpSettings::default(),
        diagnostics::DiagnosticSender::discard(),
    );
    assert_eq!(pump.tick().drained, 1);
    assert_eq!(history.history("s")[0].text, "kept");
}

#[test]
fn test_overflow_is_reported_on_the_diagnostic_channel() {
    let region = Arc::new(RegionBuilder::new().with_capacity(2).with_slot_size(512).build().unwrap());
    let (tx, rx) = diagnostics::channel();
    let pool = ProducerPool::new(Arc::clone(&region), ProducerSettings::default(), tx);

    for n in 0..5 {
        pool.dispatch(Platform::Facebook, payload("s", "u", &n.to_string())).unwrap();
    }
    pool.shutdown();
    drop(pool);

    let causes: Vec<_> = rx.iter().map(|d| d.cause).collect();
    assert_eq!(causes, vec![DiagnosticCause::QueueFull; 3]);
    assert_eq!(region.lock_queue(Duration::from_millis(100)).unwrap().len(), 2);
}
