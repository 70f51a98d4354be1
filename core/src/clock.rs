//! Simulation clock: owns the step counter, the pause/resume state
//! machine and the time scale the host applies to simulation time.
//!
//! Touched only from the simulation thread; nothing here is locked.

use crate::types::{FrameId, Step};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PauseState {
    Running,
    Paused,
}

/// Emitted by `tick()` on the Running → Paused edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseTransition {
    pub step:        Step,
    pub start_frame: FrameId,
    pub end_frame:   FrameId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub step_counter:       Step,
    pub last_pause_step:    Step,
    pub pause_duration:     Step,
    pub state:              PauseState,
    pub current_frame:      FrameId,
    pub action_start_frame: FrameId,
    /// Multiplier the host applies to simulation time. 0 while frozen.
    pub time_scale:         f32,
    /// Scale restored on resume.
    resume_time_scale:      f32,
}

impl SimClock {
    pub fn new(pause_duration: Step) -> Self {
        Self {
            step_counter:       0,
            last_pause_step:    0,
            pause_duration:     pause_duration.max(1),
            state:              PauseState::Running,
            current_frame:      0,
            action_start_frame: 0,
            time_scale:         1.0,
            resume_time_scale:  1.0,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state == PauseState::Paused
    }

    /// Advance one fixed step. No-op while paused.
    ///
    /// Returns the transition when this step closes the action window.
    /// The caller owns the side effects (drain wait, notification).
    pub fn tick(&mut self) -> Option<PauseTransition> {
        if self.is_paused() {
            return None;
        }
        self.step_counter += 1;
        if self.step_counter - self.last_pause_step < self.pause_duration {
            return None;
        }
        self.pause();
        Some(PauseTransition {
            step:        self.step_counter,
            start_frame: self.action_start_frame,
            end_frame:   self.current_frame,
        })
    }

    /// Count one rendered frame. Returns the new frame id.
    pub fn advance_frame(&mut self) -> FrameId {
        self.current_frame += 1;
        self.current_frame
    }

    fn pause(&mut self) {
        self.state = PauseState::Paused;
        self.last_pause_step = self.step_counter;
        if self.time_scale > 0.0 {
            self.resume_time_scale = self.time_scale;
        }
        self.time_scale = 0.0;
    }

    /// Open a new action window starting at the current frame.
    /// Valid in either state. Clearing the tracker is the caller's job.
    pub fn resume(&mut self) -> FrameId {
        self.action_start_frame = self.current_frame;
        self.state = PauseState::Running;
        self.time_scale = self.resume_time_scale;
        self.action_start_frame
    }

    /// Takes effect on the next `tick()`. Zero is clamped to one step.
    pub fn set_pause_duration(&mut self, steps: Step) {
        if steps == 0 {
            log::warn!("pause duration 0 requested, clamping to 1");
        }
        self.pause_duration = steps.max(1);
    }

    /// Host-side time scale override.
    ///
    /// A positive scale while paused rebinds the state to Running without
    /// opening a new action window. Returns true when that happened.
    pub fn set_time_scale(&mut self, scale: f32) -> bool {
        if !scale.is_finite() {
            log::warn!("ignoring non-finite time scale {scale}");
            return false;
        }
        let scale = scale.max(0.0);
        self.time_scale = scale;
        if scale > 0.0 {
            self.resume_time_scale = scale;
            if self.is_paused() {
                self.state = PauseState::Running;
                return true;
            }
        }
        false
    }
}
