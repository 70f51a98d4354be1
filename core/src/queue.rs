//! Bounded capture queue: single producer, single consumer.
//!
//! OVERFLOW: pushing onto a full queue discards the OLDEST frame, never
//! the newest.
//!
//! The queue also counts frames the consumer has popped but not yet
//! finished (`in_flight`), so the pause drain-wait can tell "empty" from
//! "done".

use crate::{frame::FrameRecord, types::FrameId};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The frame was queued and the given oldest frame was discarded.
    DroppedOldest(FrameId),
}

struct Inner {
    frames:    VecDeque<FrameRecord>,
    in_flight: usize,
}

pub struct CaptureQueue {
    inner:    Mutex<Inner>,
    ready:    Condvar,
    capacity: usize,
}

impl CaptureQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                frames:    VecDeque::with_capacity(capacity + 1),
                in_flight: 0,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueue; on overflow drop the head. Never blocks on the consumer.
    pub fn push(&self, record: FrameRecord) -> PushOutcome {
        let mut inner = self.inner.lock();
        inner.frames.push_back(record);
        let outcome = if inner.frames.len() > self.capacity {
            match inner.frames.pop_front() {
                Some(dropped) => PushOutcome::DroppedOldest(dropped.frame_id),
                None => PushOutcome::Queued,
            }
        } else {
            PushOutcome::Queued
        };
        drop(inner);
        self.ready.notify_one();
        outcome
    }

    /// Pop the head if present. The caller must call `complete()` once it
    /// is done with a returned frame.
    pub fn try_pop(&self) -> Option<FrameRecord> {
        let mut inner = self.inner.lock();
        let record = inner.frames.pop_front()?;
        inner.in_flight += 1;
        Some(record)
    }

    /// Like `try_pop`, but waits up to `timeout` for a push when empty.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<FrameRecord> {
        let mut inner = self.inner.lock();
        if inner.frames.is_empty() {
            self.ready.wait_for(&mut inner, timeout);
        }
        let record = inner.frames.pop_front()?;
        inner.in_flight += 1;
        Some(record)
    }

    /// Mark one popped frame as fully handled (written or dropped).
    pub fn complete(&self) {
        let mut inner = self.inner.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
    }

    /// Wake a consumer blocked in `pop_timeout` (used on shutdown).
    pub fn wake(&self) {
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }

    /// Nothing queued and nothing being written.
    pub fn is_drained(&self) -> bool {
        let inner = self.inner.lock();
        inner.frames.is_empty() && inner.in_flight == 0
    }

    /// Queued plus in-flight frames.
    pub fn pending(&self) -> usize {
        let inner = self.inner.lock();
        inner.frames.len() + inner.in_flight
    }

    /// Frame ids in queue order, oldest first.
    pub fn frame_ids(&self) -> Vec<FrameId> {
        self.inner.lock().frames.iter().map(|f| f.frame_id).collect()
    }
}
