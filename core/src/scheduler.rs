//! Capture scheduler: runs on every frame update, never on the fixed step.
//!
//! RULE: capture is best-effort. A failed snapshot is logged and skipped;
//! the update cycle never blocks or fails because of it.

use crate::{
    error::HarnessError,
    frame::FrameRecord,
    queue::{CaptureQueue, PushOutcome},
    renderer::Renderer,
    types::FrameId,
};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Interval not yet elapsed, or no store to write to.
    NotDue,
    Queued { frame_id: FrameId },
    QueuedDroppingOldest { frame_id: FrameId, dropped: FrameId },
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct CaptureScheduler {
    interval:     Duration,
    last_capture: Duration,
}

impl CaptureScheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_capture: Duration::ZERO }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, now: Duration) -> bool {
        now.saturating_sub(self.last_capture) >= self.interval
    }

    /// `now` is host time since start. A failed attempt still counts
    /// toward the interval.
    pub fn on_update(
        &mut self,
        now: Duration,
        frame_id: FrameId,
        store_live: bool,
        renderer: &mut dyn Renderer,
        queue: &CaptureQueue,
    ) -> CaptureOutcome {
        if !store_live || !self.is_due(now) {
            return CaptureOutcome::NotDue;
        }
        self.last_capture = now;

        let record = match snapshot(renderer, frame_id) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("capture skipped at frame {frame_id}: {e}");
                return CaptureOutcome::Failed { reason: e.to_string() };
            }
        };

        match queue.push(record) {
            PushOutcome::Queued => CaptureOutcome::Queued { frame_id },
            PushOutcome::DroppedOldest(dropped) => {
                log::info!(
                    "capture queue full ({}), dropped oldest frame {dropped}",
                    queue.capacity()
                );
                CaptureOutcome::QueuedDroppingOldest { frame_id, dropped }
            }
        }
    }
}

fn snapshot(renderer: &mut dyn Renderer, frame_id: FrameId) -> Result<FrameRecord, HarnessError> {
    let (width, height) = renderer.resolution();
    let pixels = renderer.capture()?;
    let expected = FrameRecord::expected_len(width, height);
    if pixels.len() != expected {
        return Err(HarnessError::FrameSizeMismatch { expected, actual: pixels.len() });
    }
    Ok(FrameRecord::new(frame_id, width, height, pixels))
}
