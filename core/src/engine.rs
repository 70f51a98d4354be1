//! The harness engine: one context object holding everything the
//! simulation thread touches.
//!
//! HOST CONTRACT:
//!   - `tick()` once per fixed simulation step.
//!   - `update(now)` once per rendered frame, `now` = host time since start.
//!   - Apply `time_scale()` to simulation time; it is 0 while paused.
//!
//! THREADS:
//!   - Simulation thread: clock, scheduler, pause handling.
//!   - One persistence worker thread, owning the store.
//!   - One short-lived thread per pause notification.
//!
//! The only blocking call on the simulation thread is the bounded
//! drain-wait when a window closes.

use crate::{
    clock::{PauseState, PauseTransition, SimClock},
    command::{CommandReply, ControllerCommand, HarnessState},
    config::HarnessConfig,
    error::HarnessResult,
    event::HarnessEvent,
    notifier::{Notifier, PauseNotice, PauseNotifier},
    prefix::KeyPrefix,
    queue::CaptureQueue,
    renderer::Renderer,
    scheduler::{CaptureOutcome, CaptureScheduler},
    store::{FrameStore, SqliteFrameStore},
    tracker::ActionWindowTracker,
    types::{FrameId, SessionId, Step},
    worker::{PersistenceWorker, WorkerCounters, WorkerHandle, WorkerStats},
};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub struct HarnessEngine {
    pub session_id: SessionId,
    pub clock:      SimClock,
    config:         HarnessConfig,
    prefix:         KeyPrefix,
    scheduler:      CaptureScheduler,
    queue:          Arc<CaptureQueue>,
    tracker:        Arc<ActionWindowTracker>,
    renderer:       Box<dyn Renderer>,
    pause_notifier: PauseNotifier,
    worker:         Option<WorkerHandle>,
    counters:       Arc<WorkerCounters>,
    last_dispatch:  Option<JoinHandle<()>>,
}

impl HarnessEngine {
    /// Wire up every component and start the persistence worker.
    ///
    /// `store = None` means the store was unreachable: the simulation runs,
    /// but nothing is captured or persisted. An invalid config is rejected
    /// before any thread starts.
    pub fn build(
        config: HarnessConfig,
        store: Option<Box<dyn FrameStore>>,
        renderer: Box<dyn Renderer>,
        notifier: Arc<dyn Notifier>,
    ) -> HarnessResult<Self> {
        config.validate()?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let prefix = KeyPrefix::generate(config.prefix_seed);
        let queue = Arc::new(CaptureQueue::new(config.queue_capacity));
        let tracker = Arc::new(ActionWindowTracker::new());

        let mut counters = Arc::new(WorkerCounters::default());
        let worker = store.and_then(|store| {
            let worker = PersistenceWorker::new(
                Arc::clone(&queue),
                Arc::clone(&tracker),
                store,
                prefix.clone(),
                &config,
            );
            counters = worker.counters();
            match worker.spawn() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    log::error!("could not start persistence worker, capture disabled: {e}");
                    None
                }
            }
        });

        let (width, height) = renderer.resolution();
        log::info!(
            "harness session {session_id} started: prefix={prefix} capture={width}x{height} every {}ms, \
             pause every {} steps, persistence {}",
            config.capture_interval_ms,
            config.pause_duration,
            if worker.is_some() { "on" } else { "off" },
        );

        Ok(Self {
            session_id,
            clock: SimClock::new(config.pause_duration),
            scheduler: CaptureScheduler::new(config.capture_interval()),
            pause_notifier: PauseNotifier::new(notifier, prefix.clone()),
            prefix,
            queue,
            tracker,
            renderer,
            worker,
            counters,
            last_dispatch: None,
            config,
        })
    }

    /// In-memory store and `HarnessConfig::default_test()`.
    pub fn build_test(
        renderer: Box<dyn Renderer>,
        notifier: Arc<dyn Notifier>,
    ) -> HarnessResult<Self> {
        let store = SqliteFrameStore::in_memory()?;
        Self::build(HarnessConfig::default_test(), Some(Box::new(store)), renderer, notifier)
    }

    /// Open the SQLite store, or log why not. A failure here disables
    /// persistence only.
    pub fn connect_store(path: &str) -> Option<Box<dyn FrameStore>> {
        match SqliteFrameStore::open(path) {
            Ok(store) => Some(Box::new(store)),
            Err(e) => {
                log::error!("frame store at {path} unavailable, running without capture: {e}");
                None
            }
        }
    }

    // ── Simulation hooks ───────────────────────────────────────

    /// One fixed simulation step.
    pub fn tick(&mut self) -> Vec<HarnessEvent> {
        match self.clock.tick() {
            Some(transition) => self.on_pause(transition),
            None => Vec::new(),
        }
    }

    /// One rendered frame. Captures when due and the clock is running.
    pub fn update(&mut self, now: Duration) -> Vec<HarnessEvent> {
        let frame_id = self.clock.advance_frame();
        if self.clock.is_paused() {
            return Vec::new();
        }
        let outcome = self.scheduler.on_update(
            now,
            frame_id,
            self.worker.is_some(),
            self.renderer.as_mut(),
            &self.queue,
        );
        match outcome {
            CaptureOutcome::NotDue => Vec::new(),
            CaptureOutcome::Queued { frame_id } => vec![HarnessEvent::FrameCaptured { frame_id }],
            CaptureOutcome::QueuedDroppingOldest { frame_id, dropped } => vec![
                HarnessEvent::FrameCaptured { frame_id },
                HarnessEvent::FrameDropped { frame_id: dropped },
            ],
            CaptureOutcome::Failed { reason } => {
                vec![HarnessEvent::CaptureFailed { frame_id, reason }]
            }
        }
    }

    fn on_pause(&mut self, transition: PauseTransition) -> Vec<HarnessEvent> {
        let PauseTransition { step, start_frame, end_frame } = transition;
        log::info!("paused at step {step}, window frames {start_frame}..{end_frame}");
        let mut events = vec![HarnessEvent::PauseTriggered { step, start_frame, end_frame }];

        if let Some(pending) = self.wait_for_drain() {
            events.push(HarnessEvent::DrainTimedOut { step, pending });
        }

        let (notice, handle) =
            self.pause_notifier
                .notify(step, start_frame, end_frame, &self.tracker);
        self.last_dispatch = handle;
        events.push(match notice {
            PauseNotice::Skipped => HarnessEvent::NotificationSkipped { step },
            PauseNotice::Dispatched { frames } => {
                HarnessEvent::NotificationDispatched { step, frames }
            }
        });
        events
    }

    /// Poll until the worker has nothing queued or in flight, up to
    /// `drain_max_polls`. Returns the pending count on timeout.
    fn wait_for_drain(&self) -> Option<usize> {
        if self.worker.is_none() {
            return None;
        }
        for _ in 0..self.config.drain_max_polls {
            if self.queue.is_drained() {
                return None;
            }
            std::thread::sleep(self.config.drain_poll_interval());
        }
        if self.queue.is_drained() {
            return None;
        }
        let pending = self.queue.pending();
        log::info!(
            "drain wait expired after {} polls, {pending} frames left out of this window",
            self.config.drain_max_polls
        );
        Some(pending)
    }

    // ── Controller operations ──────────────────────────────────

    /// Start a new action window. Valid in either state.
    pub fn resume(&mut self) -> Vec<HarnessEvent> {
        let start_frame = self.clock.resume();
        self.tracker.clear(start_frame);
        let step = self.clock.step_counter;
        log::info!("resumed at step {step}, new window from frame {start_frame}");
        vec![HarnessEvent::Resumed { step, start_frame }]
    }

    pub fn set_pause_duration(&mut self, steps: Step) -> Vec<HarnessEvent> {
        self.clock.set_pause_duration(steps);
        log::info!("pause duration set to {}", self.clock.pause_duration);
        vec![HarnessEvent::PauseDurationChanged { steps: self.clock.pause_duration }]
    }

    pub fn current_step(&self) -> Step {
        self.clock.step_counter
    }

    pub fn current_frame(&self) -> FrameId {
        self.clock.current_frame
    }

    pub fn pause_state(&self) -> PauseState {
        self.clock.state
    }

    /// Scale the host must apply to simulation time.
    pub fn time_scale(&self) -> f32 {
        self.clock.time_scale
    }

    /// Host-side time scale override. Forcing time forward while paused
    /// rebinds to running but keeps the current window open.
    pub fn set_time_scale(&mut self, scale: f32) -> Vec<HarnessEvent> {
        if !self.clock.set_time_scale(scale) {
            return Vec::new();
        }
        let step = self.clock.step_counter;
        log::warn!(
            "time scale forced to {scale} while paused at step {step}; running again without resume"
        );
        vec![HarnessEvent::TimeScaleReconciled { step, time_scale: self.clock.time_scale }]
    }

    pub fn apply_command(&mut self, command: ControllerCommand) -> (CommandReply, Vec<HarnessEvent>) {
        match command {
            ControllerCommand::Resume => {
                let events = self.resume();
                (CommandReply::Resumed { start_frame: self.clock.action_start_frame }, events)
            }
            ControllerCommand::SetPauseDuration { steps } => {
                let events = self.set_pause_duration(steps);
                (CommandReply::PauseDurationSet { steps: self.clock.pause_duration }, events)
            }
            ControllerCommand::GetCurrentStep => {
                (CommandReply::CurrentStep { step: self.current_step() }, Vec::new())
            }
            ControllerCommand::GetCurrentFrame => {
                (CommandReply::CurrentFrame { frame: self.current_frame() }, Vec::new())
            }
            ControllerCommand::GetState => (CommandReply::State(self.state()), Vec::new()),
        }
    }

    // ── Introspection ──────────────────────────────────────────

    pub fn state(&self) -> HarnessState {
        HarnessState {
            session_id:       self.session_id.clone(),
            key_prefix:       self.prefix.as_str().to_string(),
            state:            self.clock.state,
            current_step:     self.clock.step_counter,
            current_frame:    self.clock.current_frame,
            last_pause_step:  self.clock.last_pause_step,
            pause_duration:   self.clock.pause_duration,
            window_frames:    self.tracker.len(),
            queued_frames:    self.queue.len(),
            persistence_live: self.worker.is_some(),
            worker:           self.worker_stats(),
        }
    }

    pub fn prefix(&self) -> &KeyPrefix {
        &self.prefix
    }

    pub fn tracker(&self) -> &ActionWindowTracker {
        &self.tracker
    }

    pub fn queue(&self) -> &CaptureQueue {
        &self.queue
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn worker_stats(&self) -> WorkerStats {
        self.counters.stats()
    }

    pub fn persistence_live(&self) -> bool {
        self.worker.is_some()
    }

    /// Handle of the most recent notification thread, if any.
    pub fn take_last_dispatch(&mut self) -> Option<JoinHandle<()>> {
        self.last_dispatch.take()
    }

    // ── Shutdown ───────────────────────────────────────────────

    /// Stop the worker (bounded wait) and hand back the store.
    /// Dropping the returned store closes the connection.
    pub fn shutdown(&mut self) -> Option<Box<dyn FrameStore>> {
        let worker = self.worker.take()?;
        let store = worker.shutdown(self.config.worker_shutdown_timeout());
        let stats = self.counters.stats();
        log::info!(
            "harness session {} shut down: {} frames persisted, {} failed",
            self.session_id,
            stats.persisted,
            stats.failed
        );
        store
    }
}

impl Drop for HarnessEngine {
    fn drop(&mut self) {
        if self.worker.is_some() {
            drop(self.shutdown());
        }
    }
}
