use crate::config::ProducerSettings;
use crate::error::{QueueError, RejectReason};
use crate::Core::region::SharedRegion;
use crate::Relay::diagnostics::{Diagnostic, DiagnosticCause, DiagnosticSender};
use crate::Relay::Structs::{InboundPayload, Message, Platform};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Why an accepted message never reached the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Every attempt timed out waiting for the lock.
    LockTimeout,
    /// The queue was at capacity.
    QueueFull,
    /// The serialized message does not fit in a slot.
    PayloadTooLarge,
    /// The queue rejected the write for another reason (corrupt control block).
    Fault,
}

/// Final state of one submitted payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Enqueued { id: String },
    Rejected(RejectReason),
    Dropped(DropReason),
}

/// Validate an inbound payload and turn it into a message.
///
/// `user` and `text` are trimmed and must be non-empty; `streamerId` must be
/// present and not blank. Optional flags pass through untouched.
pub fn normalize(platform: Platform, payload: InboundPayload, now_ms: u64) -> Result<Message, RejectReason> {
    let user = payload.user.trim();
    if user.is_empty() {
        return Err(RejectReason::EmptyUser);
    }
    let text = payload.text.trim();
    if text.is_empty() {
        return Err(RejectReason::EmptyText);
    }
    let streamer_id = match payload.streamer_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => return Err(RejectReason::MissingStreamer),
    };

    Ok(Message {
        id: Uuid::new_v4().to_string(),
        streamer_id,
        user: user.to_owned(),
        text: text.to_owned(),
        platform,
        timestamp: now_ms,
        is_vip: payload.is_vip,
        is_sub: payload.is_sub,
        is_mod: payload.is_mod,
        color: payload.color,
    })
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Writes normalized messages into a shared region.
///
/// Lock timeouts are retried with a jittered pause; a full queue or an
/// oversized message is dropped at once. Every drop is logged and reported on
/// the diagnostic channel, never to the caller's sender.
pub struct Producer {
    region: Arc<SharedRegion>,
    settings: ProducerSettings,
    diagnostics: DiagnosticSender,
}

impl Producer {
    pub fn new(region: Arc<SharedRegion>, settings: ProducerSettings, diagnostics: DiagnosticSender) -> Self {
        Self {
            region,
            settings,
            diagnostics,
        }
    }

    pub fn region(&self) -> &Arc<SharedRegion> {
        &self.region
    }

    /// Validate, normalize and enqueue one payload that arrived on `platform`'s route.
    pub fn submit(&self, platform: Platform, payload: InboundPayload) -> Delivery {
        match normalize(platform, payload, now_ms()) {
            Ok(message) => self.enqueue(message),
            Err(reason) => {
                warn!(%platform, %reason, "rejected payload");
                Delivery::Rejected(reason)
            }
        }
    }

    /// Enqueue an already normalized message.
    pub fn enqueue(&self, message: Message) -> Delivery {
        let id = message.id.clone();
        let platform = message.platform;
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            // The guard is dropped at the end of this statement, before any pause
            let outcome = match self.region.lock_queue(self.settings.lock_timeout()) {
                Ok(queue) => queue.enqueue(&message),
                Err(timeout) => Err(QueueError::from(timeout)),
            };

            match outcome {
                Ok(true) => {
                    debug!(%id, %platform, streamer = %message.streamer_id, attempt, "enqueued");
                    return Delivery::Enqueued { id };
                }
                Ok(false) => {
                    warn!(%id, %platform, "queue full, dropping message");
                    self.report(DiagnosticCause::QueueFull, platform);
                    return Delivery::Dropped(DropReason::QueueFull);
                }
                Err(QueueError::LockTimeout(timeout)) => {
                    if attempt >= max_attempts {
                        error!(%id, %platform, attempts = attempt, "lock not acquired, dropping message");
                        self.report(DiagnosticCause::LockTimeout, platform);
                        return Delivery::Dropped(DropReason::LockTimeout);
                    }
                    let pause = self.jitter();
                    debug!(%id, attempt, waited = ?timeout.waited, ?pause, "lock busy, retrying");
                    thread::sleep(pause);
                }
                Err(QueueError::PayloadTooLarge { size, max }) => {
                    error!(%id, %platform, size, max, "message does not fit a slot, dropping");
                    self.report(DiagnosticCause::PayloadTooLarge, platform);
                    return Delivery::Dropped(DropReason::PayloadTooLarge);
                }
                Err(e) => {
                    error!(%id, %platform, error = %e, "enqueue failed, dropping message");
                    return Delivery::Dropped(DropReason::Fault);
                }
            }
        }
    }

    fn jitter(&self) -> Duration {
        let lo = self.settings.jitter_min_ms;
        let hi = self.settings.jitter_max_ms.max(lo);
        Duration::from_millis(fastrand::u64(lo..=hi))
    }

    fn report(&self, cause: DiagnosticCause, platform: Platform) {
        self.diagnostics.emit(Diagnostic::new(cause, Some(platform)));
    }
}
