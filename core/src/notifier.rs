//! Pause notifier. Tells the external controller a window closed.
//!
//! Fire-and-forget: delivery runs on its own thread, the outcome is only
//! logged, and the simulation never waits on or reacts to the response.

use crate::{
    error::HarnessResult,
    prefix::KeyPrefix,
    tracker::ActionWindowTracker,
    types::{FrameId, Step},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Path appended to the controller base URL.
pub const ON_PAUSE_PATH: &str = "/ai/on-pause";

/// JSON body posted to the controller. Field names are the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PausePayload {
    pub current_step:     Step,
    pub start_frame:      FrameId,
    pub end_frame:        FrameId,
    pub start_screenshot: String,
    pub end_screenshot:   String,
    pub key_prefix:       String,
    pub available_frames: Vec<FrameId>,
}

impl PausePayload {
    /// `None` when no frame was persisted during the window.
    pub fn build(
        step: Step,
        start_frame: FrameId,
        end_frame: FrameId,
        prefix: &KeyPrefix,
        mut frames: Vec<FrameId>,
    ) -> Option<Self> {
        frames.sort_unstable();
        frames.dedup();
        let first = *frames.first()?;
        let last = *frames.last()?;
        Some(Self {
            current_step:     step,
            start_frame,
            end_frame,
            start_screenshot: prefix.frame_key(first),
            end_screenshot:   prefix.frame_key(last),
            key_prefix:       prefix.as_str().to_string(),
            available_frames: frames,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub status: u16,
    pub body:   String,
}

/// Delivery collaborator. Called off the simulation thread.
pub trait Notifier: Send + Sync {
    fn deliver(&self, payload: &PausePayload) -> HarnessResult<DeliveryReport>;
}

/// POSTs the payload as JSON to `{base_url}/ai/on-pause`.
pub struct HttpNotifier {
    client: reqwest::blocking::Client,
    url:    String,
}

impl HttpNotifier {
    pub fn new(base_url: &str, timeout: Duration) -> HarnessResult<Self> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}{ON_PAUSE_PATH}", base_url.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Notifier for HttpNotifier {
    fn deliver(&self, payload: &PausePayload) -> HarnessResult<DeliveryReport> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(payload)
            .send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(DeliveryReport { status, body })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseNotice {
    /// Nothing persisted this window; nothing sent.
    Skipped,
    Dispatched { frames: usize },
}

pub struct PauseNotifier {
    notifier: Arc<dyn Notifier>,
    prefix:   KeyPrefix,
}

impl PauseNotifier {
    pub fn new(notifier: Arc<dyn Notifier>, prefix: KeyPrefix) -> Self {
        Self { notifier, prefix }
    }

    /// Read the window and dispatch. Returns the delivery thread's handle
    /// so callers that care (tests) can join it; the engine drops it.
    pub fn notify(
        &self,
        step: Step,
        start_frame: FrameId,
        end_frame: FrameId,
        tracker: &ActionWindowTracker,
    ) -> (PauseNotice, Option<JoinHandle<()>>) {
        let frames = tracker.snapshot();
        let Some(payload) = PausePayload::build(step, start_frame, end_frame, &self.prefix, frames)
        else {
            log::warn!("pause at step {step}: no frames persisted in window {start_frame}..{end_frame}, not notifying");
            return (PauseNotice::Skipped, None);
        };
        let frames = payload.available_frames.len();
        let handle = dispatch(Arc::clone(&self.notifier), payload);
        (PauseNotice::Dispatched { frames }, handle)
    }
}

fn dispatch(notifier: Arc<dyn Notifier>, payload: PausePayload) -> Option<JoinHandle<()>> {
    let step = payload.current_step;
    let spawned = thread::Builder::new()
        .name(format!("pause-notify-{step}"))
        .spawn(move || match notifier.deliver(&payload) {
            Ok(report) => log::info!(
                "pause notification for step {step} delivered: status={} body={}",
                report.status,
                report.body
            ),
            Err(e) => log::warn!("pause notification for step {step} failed: {e}"),
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("could not spawn notification thread for step {step}: {e}");
            None
        }
    }
}
