use crate::{
    clock::PauseState,
    types::{FrameId, Step},
    worker::WorkerStats,
};
use serde::{Deserialize, Serialize};

/// Commands an external controller may issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControllerCommand {
    Resume,
    SetPauseDuration { steps: Step },
    GetCurrentStep,
    GetCurrentFrame,
    GetState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum CommandReply {
    Resumed { start_frame: FrameId },
    PauseDurationSet { steps: Step },
    CurrentStep { step: Step },
    CurrentFrame { frame: FrameId },
    State(HarnessState),
}

/// Point-in-time view of the engine for controllers and the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessState {
    pub session_id:       String,
    pub key_prefix:       String,
    pub state:            PauseState,
    pub current_step:     Step,
    pub current_frame:    FrameId,
    pub last_pause_step:  Step,
    pub pause_duration:   Step,
    pub window_frames:    usize,
    pub queued_frames:    usize,
    pub persistence_live: bool,
    pub worker:           WorkerStats,
}
