//! One producer worker per platform, started on first use.
//!
//! Workers share nothing with the dispatcher except the region handle: each
//! one attaches its own mapping and runs its own `Producer`. Payloads reach a
//! worker through its inbox channel.

use std::collections::HashMap;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ProducerSettings;
use crate::error::DispatchError;
use crate::Core::region::{RegionHandle, SharedRegion};
use crate::Relay::diagnostics::DiagnosticSender;
use crate::Relay::producer::Producer;
use crate::Relay::Structs::{InboundPayload, Platform};

struct Worker {
    inbox: mpsc::Sender<InboundPayload>,
    thread: JoinHandle<()>,
}

pub struct ProducerPool {
    // Keeps an anonymous region's descriptor open while workers attach to it
    _region: Arc<SharedRegion>,
    handle: RegionHandle,
    settings: ProducerSettings,
    diagnostics: DiagnosticSender,
    workers: Mutex<HashMap<Platform, Worker>>,
}

impl ProducerPool {
    pub fn new(region: Arc<SharedRegion>, settings: ProducerSettings, diagnostics: DiagnosticSender) -> Self {
        let handle = region.handle();
        Self {
            _region: region,
            handle,
            settings,
            diagnostics,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Hand a payload to `platform`'s worker, starting it if needed.
    ///
    /// A worker that has died is replaced once and the payload re-sent to the
    /// replacement. Delivery to the queue is asynchronous; drops surface on
    /// the diagnostic channel.
    pub fn dispatch(&self, platform: Platform, payload: InboundPayload) -> Result<(), DispatchError> {
        let mut workers = self.workers.lock();

        let worker = match workers.remove(&platform) {
            Some(worker) => worker,
            None => self.spawn_worker(platform)?,
        };

        match worker.inbox.send(payload) {
            Ok(()) => {
                workers.insert(platform, worker);
                Ok(())
            }
            Err(mpsc::SendError(payload)) => {
                warn!(%platform, "producer worker is gone, respawning");
                let _ = worker.thread.join();

                let replacement = self.spawn_worker(platform)?;
                let sent = replacement
                    .inbox
                    .send(payload)
                    .map_err(|_| DispatchError::WorkerUnavailable(platform));
                workers.insert(platform, replacement);
                sent
            }
        }
    }

    /// Platforms with a running worker.
    pub fn active(&self) -> Vec<Platform> {
        let mut active: Vec<_> = self
            .workers
            .lock()
            .iter()
            .filter(|(_, w)| !w.thread.is_finished())
            .map(|(p, _)| *p)
            .collect();
        active.sort();
        active
    }

    /// Close every inbox and wait for the workers to finish what they hold.
    pub fn shutdown(&self) {
        let workers: Vec<_> = self.workers.lock().drain().collect();
        for (platform, worker) in workers {
            drop(worker.inbox);
            if worker.thread.join().is_err() {
                warn!(%platform, "producer worker panicked");
            }
        }
    }

    fn spawn_worker(&self, platform: Platform) -> Result<Worker, DispatchError> {
        let (inbox, rx) = mpsc::channel::<InboundPayload>();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let handle = self.handle.clone();
        let settings = self.settings.clone();
        let diagnostics = self.diagnostics.clone();

        let thread = thread::Builder::new()
            .name(format!("producer-{}", platform.route()))
            .spawn(move || {
                let region = match SharedRegion::attach(&handle) {
                    Ok(region) => region,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                let producer = Producer::new(Arc::new(region), settings, diagnostics);
                for payload in rx {
                    producer.submit(platform, payload);
                }
                debug!(%platform, "producer worker exiting");
            })
            .map_err(DispatchError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(%platform, "producer worker started");
                Ok(Worker { inbox, thread })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(DispatchError::Region(e))
            }
            Err(_) => {
                let _ = thread.join();
                Err(DispatchError::WorkerUnavailable(platform))
            }
        }
    }
}

impl Drop for ProducerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn payload(text: &str) -> InboundPayload {
        InboundPayload {
            streamer_id: Some("s".into()),
            user: "u".into(),
            text: text.into(),
            ..Default::default()
        }
    }

    fn wait_for_len(region: &SharedRegion, len: u32) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if region.lock_queue(Duration::from_millis(100)).unwrap().len() == len {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("queue never reached {len} messages");
    }

    #[test]
    fn workers_start_lazily_per_platform() {
        let region = Arc::new(SharedRegion::anonymous(16, 512).unwrap());
        let pool = ProducerPool::new(Arc::clone(&region), ProducerSettings::default(), DiagnosticSender::discard());
        assert!(pool.active().is_empty());

        pool.dispatch(Platform::Twitch, payload("a")).unwrap();
        pool.dispatch(Platform::Trovo, payload("b")).unwrap();
        pool.dispatch(Platform::Twitch, payload("c")).unwrap();

        assert_eq!(pool.active(), vec![Platform::Twitch, Platform::Trovo]);
        wait_for_len(&region, 3);
        pool.shutdown();
        assert!(pool.active().is_empty());
    }

    #[test]
    fn dead_worker_is_replaced_and_payload_resent() {
        let region = Arc::new(SharedRegion::anonymous(16, 512).unwrap());
        let pool = ProducerPool::new(Arc::clone(&region), ProducerSettings::default(), DiagnosticSender::discard());
        pool.dispatch(Platform::YouTube, payload("first")).unwrap();
        wait_for_len(&region, 1);

        // Swap in an inbox nobody reads; the first worker sees its channel close and exits
        {
            let mut workers = pool.workers.lock();
            let worker = workers.get_mut(&Platform::YouTube).unwrap();
            let (dead_tx, dead_rx) = mpsc::channel();
            drop(dead_rx);
            drop(std::mem::replace(&mut worker.inbox, dead_tx));
        }

        pool.dispatch(Platform::YouTube, payload("second")).unwrap();
        wait_for_len(&region, 2);

        let texts: Vec<_> = region
            .lock_queue(Duration::from_millis(100))
            .unwrap()
            .snapshot()
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["first", "second"]);
    }
}
