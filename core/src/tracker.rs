//! Action window tracker.
//!
//! RULE: a frame id enters the window only after its store write
//! succeeded. The worker appends, the simulation thread snapshots,
//! and only `resume` clears.

use crate::types::FrameId;
use parking_lot::Mutex;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
struct ActionWindow {
    start_frame: FrameId,
    persisted:   BTreeSet<FrameId>,
}

#[derive(Debug, Default)]
pub struct ActionWindowTracker {
    window: Mutex<ActionWindow>,
}

impl ActionWindowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a persisted frame. The window start is the last frame of the
    /// previous window, so ids at or below it are rejected. The first
    /// window starts at 0 and frame ids start at 1.
    pub fn append(&self, frame_id: FrameId) -> bool {
        let mut window = self.window.lock();
        if frame_id <= window.start_frame {
            log::debug!(
                "frame {frame_id} persisted after its window closed (window starts after {})",
                window.start_frame
            );
            return false;
        }
        window.persisted.insert(frame_id)
    }

    /// Sorted copy of the persisted ids. Never a live view.
    pub fn snapshot(&self) -> Vec<FrameId> {
        self.window.lock().persisted.iter().copied().collect()
    }

    /// Start a new, empty window at `start_frame`.
    pub fn clear(&self, start_frame: FrameId) {
        let mut window = self.window.lock();
        window.start_frame = start_frame;
        window.persisted.clear();
    }

    pub fn start_frame(&self) -> FrameId {
        self.window.lock().start_frame
    }

    pub fn len(&self) -> usize {
        self.window.lock().persisted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.lock().persisted.is_empty()
    }
}
