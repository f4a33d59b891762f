use crate::config::PumpSettings;
use crate::error::{PumpError, QueueError};
use crate::Core::region::SharedRegion;
use crate::Relay::collaborators::{Broadcaster, MessageStore, GLOBAL_ROOM};
use crate::Relay::diagnostics::{Diagnostic, DiagnosticCause, DiagnosticSender};
use crate::Relay::Ring::RingQueue;
use crate::Relay::Structs::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Set while a spawned pump thread is alive. Only one pump may drain a
/// process's queue at a time.
static PUMP_ACTIVE: AtomicBool = AtomicBool::new(false);

/// What one tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Messages taken off the queue.
    pub drained: usize,
    /// Messages whose room broadcast succeeded.
    pub delivered: usize,
    /// Messages the store accepted.
    pub persisted: usize,
    pub broadcast_failures: usize,
    pub persist_failures: usize,
    /// Slots consumed but lost to corruption.
    pub corrupt: usize,
    /// The lock was not acquired, nothing was drained.
    pub skipped: bool,
}

/// The single consumer of a region's queue.
///
/// Each tick takes the lock, drains up to `batch_size` messages, releases the
/// lock, and only then hands each message to the broadcaster and the store.
/// Delivery is at-most-once: dequeuing is destructive and nothing is retried.
pub struct Pump<B, S> {
    region: Arc<SharedRegion>,
    broadcaster: B,
    store: S,
    settings: PumpSettings,
    diagnostics: DiagnosticSender,
}

impl<B: Broadcaster, S: MessageStore> Pump<B, S> {
    pub fn new(
        region: Arc<SharedRegion>,
        broadcaster: B,
        store: S,
        settings: PumpSettings,
        diagnostics: DiagnosticSender,
    ) -> Self {
        Self {
            region,
            broadcaster,
            store,
            settings,
            diagnostics,
        }
    }

    /// Run one drain-and-deliver cycle.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let batch = match self.region.lock_queue(self.settings.lock_timeout()) {
            Ok(queue) => self.drain(&queue, &mut report),
            Err(timeout) => {
                warn!(waited = ?timeout.waited, "pump could not take the lock, skipping tick");
                self.diagnostics.emit(Diagnostic::new(DiagnosticCause::LockTimeout, None));
                report.skipped = true;
                return report;
            }
        };

        for message in &batch {
            self.deliver(message, &mut report);
        }
        report
    }

    fn drain(&self, queue: &RingQueue<'_>, report: &mut TickReport) -> Vec<Message> {
        let mut batch = Vec::with_capacity(self.settings.batch_size.min(queue.len() as usize));

        for _ in 0..self.settings.batch_size {
            match queue.dequeue() {
                Ok(Some(message)) => batch.push(message),
                Ok(None) => break,
                Err(e @ QueueError::CorruptControl { .. }) => {
                    error!(error = %e, "queue control block is corrupt, nothing can be drained");
                    self.diagnostics.emit(Diagnostic::new(DiagnosticCause::CorruptSlot, None));
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "dropped unreadable slot");
                    self.diagnostics.emit(Diagnostic::new(DiagnosticCause::CorruptSlot, None));
                    report.corrupt += 1;
                }
            }
        }

        report.drained = batch.len();
        batch
    }

    fn deliver(&self, message: &Message, report: &mut TickReport) {
        let room = message.room();
        match self.broadcaster.broadcast(&room, message) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.broadcast_failures += 1;
                warn!(id = %message.id, error = %e, "broadcast failed");
            }
        }

        if self.settings.mirror_global {
            if let Err(e) = self.broadcaster.broadcast(GLOBAL_ROOM, message) {
                warn!(id = %message.id, error = %e, "global mirror failed");
            }
        }

        match self.store.persist(message) {
            Ok(()) => report.persisted += 1,
            Err(e) => {
                report.persist_failures += 1;
                warn!(id = %message.id, error = %e, "persist failed");
            }
        }
    }

    /// Tick on a fixed cadence until `stop` is set.
    ///
    /// Deadlines are absolute, so slow ticks do not stretch the period. When a
    /// tick overruns its slot the schedule restarts from now instead of
    /// bursting to catch up.
    pub fn run(&self, stop: &AtomicBool) {
        let interval = self.settings.interval();
        let mut next = Instant::now();

        while !stop.load(Ordering::Acquire) {
            let report = self.tick();
            if report.drained > 0 || report.corrupt > 0 {
                debug!(?report, "pump tick");
            }

            next += interval;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                next = now;
            }
        }
    }
}

impl<B, S> Pump<B, S>
where
    B: Broadcaster + 'static,
    S: MessageStore + 'static,
{
    /// Run the pump on its own thread.
    ///
    /// Fails with `AlreadyRunning` while another spawned pump is alive in
    /// this process.
    pub fn spawn(self) -> Result<PumpHandle, PumpError> {
        if PUMP_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PumpError::AlreadyRunning);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let spawned = thread::Builder::new()
            .name("crosschat-pump".into())
            .spawn(move || {
                let _active = ActiveFlag;
                info!(interval_ms = self.settings.interval_ms, batch = self.settings.batch_size, "pump started");
                self.run(&thread_stop);
                info!("pump stopped");
            });

        match spawned {
            Ok(thread) => Ok(PumpHandle {
                stop,
                thread: Some(thread),
            }),
            Err(e) => {
                PUMP_ACTIVE.store(false, Ordering::Release);
                Err(PumpError::Spawn(e))
            }
        }
    }
}

/// Clears `PUMP_ACTIVE` when the pump thread exits, panics included.
struct ActiveFlag;

impl Drop for ActiveFlag {
    fn drop(&mut self) {
        PUMP_ACTIVE.store(false, Ordering::Release);
    }
}

/// Owner of a spawned pump. Dropping it stops and joins the thread.
pub struct PumpHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PumpHandle {
    /// Ask the pump to exit after its current tick.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the pump and wait for its thread.
    pub fn join(mut self) -> thread::Result<()> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread.join(),
            None => Ok(()),
        }
    }
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
