use std::ptr;
use std::sync::atomic::Ordering::Relaxed;

use tracing::error;

use super::layout::{ControlBlock, SLOT_HEADER_BYTES};
use super::Ring::{Cursors, RingQueue};
use crate::error::QueueError;
use crate::Relay::Structs::Message;

impl<'a> RingQueue<'a> {
    /// Create a queue view over an existing control block and data block.
    ///
    /// # Safety
    /// `data` must point to at least `capacity * slot_size` writable bytes that
    /// stay mapped for `'a`, and `slot_size` must exceed the length prefix.
    pub unsafe fn from_raw(control: &'a ControlBlock, data: *mut u8, capacity: u32, slot_size: u32) -> Self {
        Self {
            control,
            data,
            capacity,
            slot_size,
            _region: std::marker::PhantomData,
        }
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }

    /// Largest serialized message a slot can hold.
    #[inline]
    pub fn max_payload(&self) -> usize {
        self.slot_size as usize - SLOT_HEADER_BYTES
    }

    pub fn len(&self) -> u32 {
        self.control.length.load(Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Raw cursor values, unchecked.
    pub fn cursors(&self) -> Cursors {
        Cursors {
            head: self.control.head.load(Relaxed),
            tail: self.control.tail.load(Relaxed),
            length: self.control.length.load(Relaxed),
        }
    }

    /// Cursor values, rejected if they break the ring invariants.
    fn checked_cursors(&self) -> Result<Cursors, QueueError> {
        let c = self.cursors();
        let cap = self.capacity;
        let valid = c.length <= cap
            && c.head < cap
            && c.tail < cap
            && c.tail == ((c.head as u64 + c.length as u64) % cap as u64) as u32;
        if valid {
            Ok(c)
        } else {
            Err(QueueError::CorruptControl {
                head: c.head,
                tail: c.tail,
                length: c.length,
                capacity: cap,
            })
        }
    }

    #[inline]
    unsafe fn slot_mut(&self, index: u32) -> *mut u8 {
        self.data.add(index as usize * self.slot_size as usize)
    }

    /// Append a message at the tail.
    ///
    /// Returns `Ok(false)` without touching the queue when it is full.
    /// A message whose JSON does not fit a slot fails with
    /// `PayloadTooLarge` and nothing is written.
    pub fn enqueue(&self, message: &Message) -> Result<bool, QueueError> {
        let cursors = self.checked_cursors()?;
        if cursors.length == self.capacity {
            return Ok(false);
        }

        let payload = serde_json::to_vec(message)?;
        if payload.len() > self.max_payload() {
            return Err(QueueError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload(),
            });
        }

        unsafe {
            let slot = self.slot_mut(cursors.tail);
            let prefix = (payload.len() as u32).to_le_bytes();
            ptr::copy_nonoverlapping(prefix.as_ptr(), slot, SLOT_HEADER_BYTES);
            ptr::copy_nonoverlapping(payload.as_ptr(), slot.add(SLOT_HEADER_BYTES), payload.len());
        }

        self.control.tail.store((cursors.tail + 1) % self.capacity, Relaxed);
        self.control.length.store(cursors.length + 1, Relaxed);
        Ok(true)
    }

    /// Remove and return the message at the head, `None` when empty.
    ///
    /// The head advances before the slot is decoded, so a corrupt slot is
    /// reported once and then skipped instead of blocking the queue.
    pub fn dequeue(&self) -> Result<Option<Message>, QueueError> {
        let cursors = self.checked_cursors()?;
        if cursors.length == 0 {
            return Ok(None);
        }

        let bytes = self.read_slot(cursors.head);

        self.control.head.store((cursors.head + 1) % self.capacity, Relaxed);
        self.control.length.store(cursors.length - 1, Relaxed);

        Ok(Some(decode(cursors.head, bytes?)?))
    }

    /// Copy out every queued message in FIFO order without consuming any.
    pub fn snapshot(&self) -> Result<Vec<Message>, QueueError> {
        let cursors = self.checked_cursors()?;
        let mut messages = Vec::with_capacity(cursors.length as usize);
        for offset in 0..cursors.length {
            let index = ((cursors.head as u64 + offset as u64) % self.capacity as u64) as u32;
            messages.push(decode(index, self.read_slot(index)?)?);
        }
        Ok(messages)
    }

    fn read_slot(&self, index: u32) -> Result<Vec<u8>, QueueError> {
        unsafe {
            let slot = self.slot_mut(index);
            let mut prefix = [0u8; SLOT_HEADER_BYTES];
            ptr::copy_nonoverlapping(slot, prefix.as_mut_ptr(), SLOT_HEADER_BYTES);
            let len = u32::from_le_bytes(prefix) as usize;

            if len > self.max_payload() {
                error!(slot = index, len, max = self.max_payload(), "slot length prefix out of bounds");
                return Err(QueueError::CorruptSlot { index, len });
            }

            let mut payload = vec![0u8; len];
            ptr::copy_nonoverlapping(slot.add(SLOT_HEADER_BYTES), payload.as_mut_ptr(), len);
            Ok(payload)
        }
    }
}

fn decode(index: u32, bytes: Vec<u8>) -> Result<Message, QueueError> {
    serde_json::from_slice(&bytes).map_err(|e| {
        error!(slot = index, error = %e, "slot payload is not a valid message");
        QueueError::Serialization(e)
    })
}
