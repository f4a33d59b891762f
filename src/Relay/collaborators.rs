//! Outbound seams of the pump: where messages are broadcast and persisted.
//!
//! The real transport and storage live outside the relay. `RoomBroadcaster`
//! and `MemoryHistory` are small in-process implementations used by the
//! binary and the tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{BroadcastError, StoreError};
use crate::Relay::Structs::Message;

/// Room that receives every message when global mirroring is on.
pub const GLOBAL_ROOM: &str = "global";

/// Broadcast room for a streamer.
pub fn room_name(streamer_id: &str) -> String {
    format!("streamer:{streamer_id}")
}

pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, room: &str, message: &Message) -> Result<(), BroadcastError>;
}

pub trait MessageStore: Send + Sync {
    fn persist(&self, message: &Message) -> Result<(), StoreError>;
}

impl<T: Broadcaster + ?Sized> Broadcaster for Arc<T> {
    fn broadcast(&self, room: &str, message: &Message) -> Result<(), BroadcastError> {
        (**self).broadcast(room, message)
    }
}

impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    fn persist(&self, message: &Message) -> Result<(), StoreError> {
        (**self).persist(message)
    }
}

/// Fan-out to in-process subscribers, grouped by room.
#[derive(Debug, Default)]
pub struct RoomBroadcaster {
    rooms: Mutex<HashMap<String, Vec<mpsc::Sender<Message>>>>,
    delivered: AtomicU64,
}

impl RoomBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every message broadcast to `room` from now on.
    pub fn subscribe(&self, room: &str) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel();
        self.rooms.lock().entry(room.to_owned()).or_default().push(tx);
        rx
    }

    /// Live subscribers of `room`.
    pub fn subscribers(&self, room: &str) -> usize {
        self.rooms.lock().get(room).map_or(0, Vec::len)
    }

    /// Total messages handed to subscribers.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl Broadcaster for RoomBroadcaster {
    fn broadcast(&self, room: &str, message: &Message) -> Result<(), BroadcastError> {
        let mut rooms = self.rooms.lock();
        let Some(subscribers) = rooms.get_mut(room) else {
            trace!(room, "no subscribers");
            return Ok(());
        };

        // Disconnected receivers are pruned as they are found
        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        self.delivered.fetch_add(subscribers.len() as u64, Ordering::Relaxed);
        if subscribers.is_empty() {
            rooms.remove(room);
        }
        Ok(())
    }
}

/// Bounded per-streamer message log. When a streamer's log is full the
/// oldest message is evicted.
#[derive(Debug)]
pub struct MemoryHistory {
    logs: Mutex<HashMap<String, VecDeque<Message>>>,
    limit: usize,
}

impl MemoryHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            logs: Mutex::new(HashMap::new()),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Logged messages for a streamer, oldest first.
    pub fn history(&self, streamer_id: &str) -> Vec<Message> {
        self.logs
            .lock()
            .get(streamer_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget a streamer's log, e.g. when a new stream starts.
    pub fn clear(&self, streamer_id: &str) {
        self.logs.lock().remove(streamer_id);
    }

    /// Remove a single message. Returns whether it was found.
    pub fn delete(&self, streamer_id: &str, id: &str) -> bool {
        let mut logs = self.logs.lock();
        let Some(log) = logs.get_mut(streamer_id) else {
            return false;
        };
        let before = log.len();
        log.retain(|m| m.id != id);
        log.len() != before
    }
}

impl MessageStore for MemoryHistory {
    fn persist(&self, message: &Message) -> Result<(), StoreError> {
        let mut logs = self.logs.lock();
        let log = logs.entry(message.streamer_id.clone()).or_default();
        log.push_back(message.clone());
        while log.len() > self.limit {
            log.pop_front();
        }
        Ok(())
    }
}
