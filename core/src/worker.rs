//! Persistence worker: the single consumer of the capture queue.
//!
//! Lifetime: spawned once by the engine, stopped on shutdown.
//! Per frame: pixels under `{prefix}{id}`, `"{w}x{h}"` under
//! `{prefix}{id}_meta`, both with the frame TTL. Only when BOTH writes
//! succeed does the id enter the action window. A failed write drops the
//! frame; nothing is retried.
//!
//! The worker owns the store. On exit it hands the store back through
//! the completion channel, so the connection can only be closed after
//! the last write has returned.

use crate::{
    config::HarnessConfig,
    error::HarnessResult,
    frame::FrameRecord,
    prefix::KeyPrefix,
    queue::CaptureQueue,
    store::FrameStore,
    tracker::ActionWindowTracker,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct WorkerCounters {
    persisted: AtomicU64,
    failed:    AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub persisted: u64,
    pub failed:    u64,
}

impl WorkerCounters {
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            persisted: self.persisted.load(Ordering::Relaxed),
            failed:    self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Everything one worker iteration needs. Also drivable synchronously
/// from tests through `persist_next`.
pub struct PersistenceWorker {
    queue:          Arc<CaptureQueue>,
    tracker:        Arc<ActionWindowTracker>,
    store:          Box<dyn FrameStore>,
    prefix:         KeyPrefix,
    ttl:            Duration,
    idle:           Duration,
    purge_interval: Duration,
    last_purge:     Instant,
    counters:       Arc<WorkerCounters>,
}

impl PersistenceWorker {
    pub fn new(
        queue: Arc<CaptureQueue>,
        tracker: Arc<ActionWindowTracker>,
        store: Box<dyn FrameStore>,
        prefix: KeyPrefix,
        config: &HarnessConfig,
    ) -> Self {
        Self {
            queue,
            tracker,
            store,
            prefix,
            ttl:            config.frame_ttl(),
            idle:           config.worker_idle(),
            purge_interval: config.purge_interval(),
            last_purge:     Instant::now(),
            counters:       Arc::new(WorkerCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<WorkerCounters> {
        Arc::clone(&self.counters)
    }

    /// Pop and persist at most one frame, waiting up to the idle timeout
    /// for one to arrive. Returns false when the queue stayed empty.
    pub fn persist_next(&mut self) -> bool {
        let Some(record) = self.queue.pop_timeout(self.idle) else {
            self.maybe_purge();
            return false;
        };
        match self.write_frame(&record) {
            Ok(()) => {
                self.tracker.append(record.frame_id);
                self.counters.persisted.fetch_add(1, Ordering::Relaxed);
                log::debug!("frame {} persisted", record.frame_id);
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("frame {} dropped, store write failed: {e}", record.frame_id);
            }
        }
        self.queue.complete();
        true
    }

    fn write_frame(&mut self, record: &FrameRecord) -> HarnessResult<()> {
        self.store
            .set_bytes(&self.prefix.frame_key(record.frame_id), &record.pixels, self.ttl)?;
        self.store
            .set_string(&self.prefix.meta_key(record.frame_id), &record.meta(), self.ttl)?;
        Ok(())
    }

    fn maybe_purge(&mut self) {
        if self.last_purge.elapsed() < self.purge_interval {
            return;
        }
        self.last_purge = Instant::now();
        match self.store.purge_expired() {
            Ok(0) => {}
            Ok(n) => log::debug!("purged {n} expired keys"),
            Err(e) => log::warn!("expired key purge failed: {e}"),
        }
    }

    /// Give the store back, e.g. to read what was written.
    pub fn into_store(self) -> Box<dyn FrameStore> {
        self.store
    }

    /// Run the loop on a dedicated thread until the handle is shut down.
    pub fn spawn(self) -> std::io::Result<WorkerHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let counters = self.counters();
        let queue = Arc::clone(&self.queue);
        let (done_tx, done_rx) = mpsc::sync_channel(1);
        let thread_stop = Arc::clone(&stop);

        let join = thread::Builder::new()
            .name("frame-persistence".to_string())
            .spawn(move || {
                let mut worker = self;
                while !thread_stop.load(Ordering::Acquire) {
                    worker.persist_next();
                }
                let abandoned = worker.queue.len();
                if abandoned > 0 {
                    log::info!("persistence worker stopping with {abandoned} frames unwritten");
                }
                let _ = done_tx.send(worker.into_store());
            })?;

        Ok(WorkerHandle { stop, queue, counters, done_rx, join: Some(join) })
    }
}

pub struct WorkerHandle {
    stop:     Arc<AtomicBool>,
    queue:    Arc<CaptureQueue>,
    counters: Arc<WorkerCounters>,
    done_rx:  Receiver<Box<dyn FrameStore>>,
    join:     Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn stats(&self) -> WorkerStats {
        self.counters.stats()
    }

    /// Signal stop and wait up to `timeout` for the loop to exit.
    ///
    /// Returns the store on a clean exit. On timeout the thread is
    /// detached still owning the store, so no write can race a close.
    pub fn shutdown(mut self, timeout: Duration) -> Option<Box<dyn FrameStore>> {
        self.stop.store(true, Ordering::Release);
        self.queue.wake();
        match self.done_rx.recv_timeout(timeout) {
            Ok(store) => {
                if let Some(join) = self.join.take() {
                    if join.join().is_err() {
                        log::error!("persistence worker panicked during shutdown");
                    }
                }
                Some(store)
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("persistence worker did not stop within {timeout:?}, detaching");
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("persistence worker exited without returning the store");
                None
            }
        }
    }
}
