//! What the engine reports back to its host after each operation.

use crate::types::{FrameId, Step};
use serde::{Deserialize, Serialize};

/// Variants are appended over time, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HarnessEvent {
    // ── Capture ────────────────────────────────────
    FrameCaptured {
        frame_id: FrameId,
    },
    /// Queue overflow discarded the oldest pending frame.
    FrameDropped {
        frame_id: FrameId,
    },
    CaptureFailed {
        frame_id: FrameId,
        reason: String,
    },

    // ── Pause / resume ─────────────────────────────
    PauseTriggered {
        step: Step,
        start_frame: FrameId,
        end_frame: FrameId,
    },
    /// The drain wait gave up with frames still pending.
    DrainTimedOut {
        step: Step,
        pending: usize,
    },
    NotificationDispatched {
        step: Step,
        frames: usize,
    },
    NotificationSkipped {
        step: Step,
    },
    Resumed {
        step: Step,
        start_frame: FrameId,
    },
    PauseDurationChanged {
        steps: Step,
    },
    /// Host forced time forward while paused; state rebound to running.
    TimeScaleReconciled {
        step: Step,
        time_scale: f32,
    },
}
