//! End-to-end harness tests: capture → persist → pause → notify → resume.

use capture_harness_core::{
    clock::PauseState,
    command::{CommandReply, ControllerCommand},
    config::HarnessConfig,
    engine::HarnessEngine,
    error::{HarnessError, HarnessResult},
    event::HarnessEvent,
    notifier::{DeliveryReport, Notifier, PausePayload},
    prefix::KeyPrefix,
    renderer::{Renderer, SyntheticRenderer},
    store::FrameStore,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingNotifier {
    delivered: Mutex<Vec<PausePayload>>,
}

impl Notifier for RecordingNotifier {
    fn deliver(&self, payload: &PausePayload) -> HarnessResult<DeliveryReport> {
        self.delivered.lock().unwrap().push(payload.clone());
        Ok(DeliveryReport { status: 200, body: String::new() })
    }
}

impl RecordingNotifier {
    fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }

    fn last(&self) -> Option<PausePayload> {
        self.delivered.lock().unwrap().last().cloned()
    }
}

struct BrokenRenderer;

impl Renderer for BrokenRenderer {
    fn resolution(&self) -> (u32, u32) {
        (8, 6)
    }

    fn capture(&mut self) -> HarnessResult<Vec<u8>> {
        Err(HarnessError::Capture { reason: "surface lost".to_string() })
    }
}

/// Store whose pixel writes for selected keys take `delay` to return.
struct SlowStore {
    slow_keys: HashSet<String>,
    delay:     Duration,
    values:    HashMap<String, Vec<u8>>,
}

impl FrameStore for SlowStore {
    fn set_bytes(&mut self, key: &str, value: &[u8], _ttl: Duration) -> HarnessResult<()> {
        if self.slow_keys.contains(key) {
            std::thread::sleep(self.delay);
        }
        self.values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn set_string(&mut self, key: &str, value: &str, _ttl: Duration) -> HarnessResult<()> {
        self.values.insert(key.to_string(), value.as_bytes().to_vec());
        Ok(())
    }

    fn get_bytes(&self, key: &str) -> HarnessResult<Option<Vec<u8>>> {
        Ok(self.values.get(key).cloned())
    }
}

/// Drain wait capped at 20 polls of 5ms; slow writes take 600ms.
fn build_with_slow_frames(slow_frames: &[u64]) -> (HarnessEngine, Arc<RecordingNotifier>) {
    let config = HarnessConfig {
        drain_poll_interval_ms: 5,
        drain_max_polls: 20,
        ..HarnessConfig::default_test()
    };
    let prefix = KeyPrefix::generate(config.prefix_seed);
    let store = SlowStore {
        slow_keys: slow_frames.iter().map(|id| prefix.frame_key(*id)).collect(),
        delay:     Duration::from_millis(600),
        values:    HashMap::new(),
    };
    let recorder = Arc::new(RecordingNotifier::default());
    let renderer = SyntheticRenderer::new(config.capture_width, config.capture_height);
    let engine = HarnessEngine::build(config, Some(Box::new(store)), Box::new(renderer), recorder.clone())
        .expect("engine");
    assert_eq!(engine.prefix(), &prefix);
    (engine, recorder)
}

fn build() -> (HarnessEngine, Arc<RecordingNotifier>) {
    let recorder = Arc::new(RecordingNotifier::default());
    let config = HarnessConfig::default_test();
    let renderer = SyntheticRenderer::new(config.capture_width, config.capture_height);
    let engine = HarnessEngine::build_test(Box::new(renderer), recorder.clone()).expect("engine");
    (engine, recorder)
}

/// Drive `frames` updates 100ms apart (every other one is a capture at 5 Hz).
fn run_frames(engine: &mut HarnessEngine, clock_ms: &mut u64, frames: u32) -> Vec<HarnessEvent> {
    let mut events = Vec::new();
    for _ in 0..frames {
        *clock_ms += 100;
        events.extend(engine.update(Duration::from_millis(*clock_ms)));
    }
    events
}

fn captured(events: &[HarnessEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            HarnessEvent::FrameCaptured { frame_id } => Some(*frame_id),
            _ => None,
        })
        .collect()
}

#[test]
fn window_frames_are_reported_on_pause() {
    let (mut engine, recorder) = build();
    let mut now = 0;
    engine.resume();

    let events = run_frames(&mut engine, &mut now, 10);
    let frames = captured(&events);
    assert_eq!(frames, vec![2, 4, 6, 8, 10], "5 Hz capture with 10 Hz updates");

    let mut pause_events = Vec::new();
    for _ in 0..5 {
        pause_events.extend(engine.tick());
    }
    assert_eq!(engine.pause_state(), PauseState::Paused);
    assert!(pause_events.contains(&HarnessEvent::PauseTriggered { step: 5, start_frame: 0, end_frame: 10 }));
    assert!(pause_events.contains(&HarnessEvent::NotificationDispatched { step: 5, frames: 5 }));
    assert!(!pause_events.iter().any(|e| matches!(e, HarnessEvent::DrainTimedOut { .. })));

    engine.take_last_dispatch().expect("dispatch thread").join().unwrap();
    let payload = recorder.last().expect("payload delivered");
    assert_eq!(payload.available_frames, frames);
    assert_eq!(payload.start_screenshot, engine.prefix().frame_key(2));
    assert_eq!(payload.end_screenshot, engine.prefix().frame_key(10));
    assert_eq!(payload.current_step, 5);

    let store = engine.shutdown().expect("store returned");
    let meta = store.get_string(&engine.prefix().meta_key(10)).unwrap();
    assert_eq!(meta.as_deref(), Some("8x6"));
    let pixels = store.get_bytes(&engine.prefix().frame_key(2)).unwrap().expect("pixels");
    assert_eq!(pixels, SyntheticRenderer::frame_bytes(8, 6, 0));
}

#[test]
fn nothing_is_captured_or_ticked_while_paused() {
    let (mut engine, recorder) = build();
    for _ in 0..5 {
        engine.tick();
    }
    assert_eq!(engine.pause_state(), PauseState::Paused);
    assert_eq!(engine.time_scale(), 0.0);
    assert_eq!(recorder.count(), 0, "empty window must not notify");

    let mut now = 0;
    let events = run_frames(&mut engine, &mut now, 10);
    assert!(captured(&events).is_empty());
    assert!(engine.tick().is_empty());
    assert_eq!(engine.current_step(), 5);
    assert_eq!(engine.current_frame(), 10, "frames keep counting while paused");
}

#[test]
fn resume_clears_the_window() {
    let (mut engine, _recorder) = build();
    let mut now = 0;
    run_frames(&mut engine, &mut now, 6);
    for _ in 0..5 {
        engine.tick();
    }
    assert!(!engine.tracker().snapshot().is_empty());

    let events = engine.resume();
    assert_eq!(events, vec![HarnessEvent::Resumed { step: 5, start_frame: 6 }]);
    assert!(engine.tracker().snapshot().is_empty());
    assert_eq!(engine.pause_state(), PauseState::Running);
    assert_eq!(engine.time_scale(), 1.0);
}

#[test]
fn second_window_only_reports_its_own_frames() {
    let (mut engine, recorder) = build();
    let mut now = 0;
    run_frames(&mut engine, &mut now, 4);
    for _ in 0..5 {
        engine.tick();
    }
    if let Some(first) = engine.take_last_dispatch() {
        first.join().unwrap();
    }

    engine.resume();
    let frames = captured(&run_frames(&mut engine, &mut now, 4));
    for _ in 0..5 {
        engine.tick();
    }
    engine.take_last_dispatch().expect("second dispatch").join().unwrap();

    assert_eq!(recorder.count(), 2);
    let payload = recorder.last().unwrap();
    assert_eq!(payload.available_frames, frames);
    assert_eq!((payload.start_frame, payload.end_frame), (4, 8));
    assert_eq!(payload.current_step, 10);
}

#[test]
fn capture_failures_are_skipped_without_stopping_the_loop() {
    let recorder = Arc::new(RecordingNotifier::default());
    let mut engine = HarnessEngine::build_test(Box::new(BrokenRenderer), recorder.clone()).unwrap();
    let mut now = 0;
    let events = run_frames(&mut engine, &mut now, 4);

    let failures = events
        .iter()
        .filter(|e| matches!(e, HarnessEvent::CaptureFailed { .. }))
        .count();
    assert_eq!(failures, 2, "one attempt per capture interval");
    for _ in 0..5 {
        engine.tick();
    }
    assert_eq!(engine.pause_state(), PauseState::Paused);
    assert_eq!(recorder.count(), 0);
}

#[test]
fn missing_store_disables_capture_but_not_simulation() {
    let recorder = Arc::new(RecordingNotifier::default());
    let mut engine = HarnessEngine::build(
        HarnessConfig::default_test(),
        None,
        Box::new(SyntheticRenderer::new(8, 6)),
        recorder.clone(),
    )
    .expect("engine");
    assert!(!engine.persistence_live());

    let mut now = 0;
    assert!(captured(&run_frames(&mut engine, &mut now, 10)).is_empty());
    let mut events = Vec::new();
    for _ in 0..5 {
        events.extend(engine.tick());
    }
    assert!(events.contains(&HarnessEvent::NotificationSkipped { step: 5 }));
    assert!(engine.shutdown().is_none());
}

#[test]
fn unreachable_store_path_yields_no_store() {
    assert!(HarnessEngine::connect_store("/nonexistent-dir/for/sure/frames.db").is_none());
}

#[test]
fn forced_time_scale_resumes_without_new_window() {
    let (mut engine, _recorder) = build();
    let mut now = 0;
    run_frames(&mut engine, &mut now, 4);
    for _ in 0..5 {
        engine.tick();
    }
    let window_before = engine.tracker().snapshot();

    let events = engine.set_time_scale(1.0);
    assert_eq!(events, vec![HarnessEvent::TimeScaleReconciled { step: 5, time_scale: 1.0 }]);
    assert_eq!(engine.pause_state(), PauseState::Running);
    assert_eq!(engine.tracker().snapshot(), window_before, "window survives reconciliation");
    assert!(engine.set_time_scale(2.0).is_empty(), "already running");
}

#[test]
fn controller_commands_map_to_operations() {
    let (mut engine, _recorder) = build();
    let mut now = 0;
    run_frames(&mut engine, &mut now, 3);

    let (reply, _) = engine.apply_command(ControllerCommand::SetPauseDuration { steps: 2 });
    assert_eq!(reply, CommandReply::PauseDurationSet { steps: 2 });
    engine.tick();
    engine.tick();
    assert_eq!(engine.pause_state(), PauseState::Paused);

    let (reply, _) = engine.apply_command(ControllerCommand::GetCurrentStep);
    assert_eq!(reply, CommandReply::CurrentStep { step: 2 });
    let (reply, _) = engine.apply_command(ControllerCommand::GetCurrentFrame);
    assert_eq!(reply, CommandReply::CurrentFrame { frame: 3 });

    let (reply, events) = engine.apply_command(ControllerCommand::Resume);
    assert_eq!(reply, CommandReply::Resumed { start_frame: 3 });
    assert_eq!(events.len(), 1);

    let (reply, _) = engine.apply_command(ControllerCommand::GetState);
    let CommandReply::State(state) = reply else { panic!("expected state reply") };
    assert_eq!(state.state, PauseState::Running);
    assert_eq!(state.pause_duration, 2);
    assert_eq!(state.last_pause_step, 2);
    assert_eq!(state.window_frames, 0);
    assert!(state.persistence_live);
}

#[test]
fn commands_parse_from_controller_json() {
    let cmd: ControllerCommand = serde_json::from_str(r#"{"cmd":"set_pause_duration","steps":12}"#).unwrap();
    assert_eq!(cmd, ControllerCommand::SetPauseDuration { steps: 12 });
    let cmd: ControllerCommand = serde_json::from_str(r#"{"cmd":"resume"}"#).unwrap();
    assert_eq!(cmd, ControllerCommand::Resume);
}

/// Frame 4's write outlives the drain wait: the pause reports only frame 2,
/// and frame 4 stays out of the payload even once it lands.
#[test]
fn frames_written_after_the_drain_wait_are_left_out() {
    let (mut engine, recorder) = build_with_slow_frames(&[4]);
    let mut now = 0;
    assert_eq!(captured(&run_frames(&mut engine, &mut now, 4)), vec![2, 4]);

    let mut events = Vec::new();
    for _ in 0..5 {
        events.extend(engine.tick());
    }
    assert!(events.contains(&HarnessEvent::DrainTimedOut { step: 5, pending: 1 }), "events: {events:?}");
    assert!(events.contains(&HarnessEvent::NotificationDispatched { step: 5, frames: 1 }));

    engine.take_last_dispatch().expect("dispatch thread").join().unwrap();
    let payload = recorder.last().expect("payload delivered");
    assert_eq!(payload.available_frames, vec![2]);
    assert_eq!(payload.end_screenshot, engine.prefix().frame_key(2));

    let store = engine.shutdown().expect("worker finishes the slow write");
    assert!(store.get_bytes(&engine.prefix().frame_key(4)).unwrap().is_some());
    assert_eq!(recorder.count(), 1, "a late write never triggers a second notification");
}

/// Nothing written before the drain wait expires: both frames pending, no notification.
#[test]
fn drain_timeout_with_nothing_written_skips_the_notification() {
    let (mut engine, recorder) = build_with_slow_frames(&[2]);
    let mut now = 0;
    run_frames(&mut engine, &mut now, 4);

    let mut events = Vec::new();
    for _ in 0..5 {
        events.extend(engine.tick());
    }
    assert!(events.contains(&HarnessEvent::DrainTimedOut { step: 5, pending: 2 }), "events: {events:?}");
    assert!(events.contains(&HarnessEvent::NotificationSkipped { step: 5 }));
    assert!(engine.take_last_dispatch().is_none());
    assert_eq!(recorder.count(), 0);
}

#[test]
fn invalid_config_is_rejected_at_build() {
    let config = HarnessConfig { capture_width: 0, ..HarnessConfig::default_test() };
    let result = HarnessEngine::build(
        config,
        None,
        Box::new(SyntheticRenderer::new(0, 6)),
        Arc::new(RecordingNotifier::default()),
    );
    assert!(matches!(result, Err(HarnessError::InvalidConfig(_))));
}

#[test]
fn non_finite_time_scale_leaves_the_host_scale_usable() {
    let (mut engine, _recorder) = build();
    for _ in 0..5 {
        engine.tick();
    }
    assert!(engine.set_time_scale(f32::INFINITY).is_empty());
    assert_eq!(engine.pause_state(), PauseState::Paused);
    assert_eq!(engine.time_scale(), 0.0);

    engine.resume();
    assert!(engine.set_time_scale(f32::NAN).is_empty());
    let scale = engine.time_scale();
    assert!(scale.is_finite());
    // What the runner does with the scale each frame.
    let _ = Duration::from_millis(16).mul_f32(scale);
}
