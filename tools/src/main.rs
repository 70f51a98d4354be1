//! harness-runner: headless simulation host for the capture harness.
//!
//! Usage:
//!   harness-runner --pause-duration 50 --steps 500 --db frames.db
//!   harness-runner --config harness.json --notify-url http://127.0.0.1:8000 --ipc-mode

use anyhow::Result;
use capture_harness_core::{
    command::ControllerCommand,
    config::HarnessConfig,
    engine::HarnessEngine,
    event::HarnessEvent,
    notifier::HttpNotifier,
    renderer::SyntheticRenderer,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 50 Hz fixed simulation step.
const FIXED_STEP: Duration = Duration::from_millis(20);
/// ~60 Hz render loop.
const FRAME_BUDGET: Duration = Duration::from_micros(16_667);

/// Host-only commands, accepted next to the controller commands.
#[derive(serde::Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum HostCommand {
    SetTimeScale { scale: f32 },
    Quit,
}

#[derive(serde::Serialize)]
#[serde(untagged)]
enum IpcOut<'a> {
    Event { event: &'a HarnessEvent },
    Reply { reply: &'a capture_harness_core::command::CommandReply },
    Error { error: String },
}

/// Fixed-step accumulator driven by real time scaled by the engine.
struct HostLoop {
    started:     Instant,
    last_frame:  Instant,
    accumulator: Duration,
}

impl HostLoop {
    fn new() -> Self {
        let now = Instant::now();
        Self { started: now, last_frame: now, accumulator: Duration::ZERO }
    }

    /// One rendered frame: catch up on fixed steps, then update.
    fn frame(&mut self, engine: &mut HarnessEngine) -> Vec<HarnessEvent> {
        let frame_start = Instant::now();
        let dt = frame_start - self.last_frame;
        self.last_frame = frame_start;
        self.accumulator += dt.mul_f32(engine.time_scale());

        let mut events = Vec::new();
        while self.accumulator >= FIXED_STEP {
            self.accumulator -= FIXED_STEP;
            events.extend(engine.tick());
            if engine.clock.is_paused() {
                self.accumulator = Duration::ZERO;
                break;
            }
        }
        events.extend(engine.update(frame_start - self.started));

        thread::sleep(FRAME_BUDGET.saturating_sub(frame_start.elapsed()));
        events
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let steps = parse_arg(&args, "--steps", 250u64);
    let db = str_arg(&args, "--db").unwrap_or(":memory:");

    let mut config = match str_arg(&args, "--config") {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    config.pause_duration = parse_arg(&args, "--pause-duration", config.pause_duration);
    if let Some(url) = str_arg(&args, "--notify-url") {
        config.notify_base_url = url.to_string();
    }
    if let Some(seed) = str_arg(&args, "--seed").and_then(|s| s.parse().ok()) {
        config.prefix_seed = Some(seed);
    }
    if !ipc_mode {
        println!("capture harness: harness-runner");
        println!("  pause every: {} steps", config.pause_duration);
        println!("  steps:       {steps}");
        println!("  db:          {db}");
        println!("  controller:  {}", config.notify_base_url);
        println!();
    }

    let store = HarnessEngine::connect_store(db);
    let renderer = SyntheticRenderer::new(config.capture_width, config.capture_height);
    let notifier = Arc::new(HttpNotifier::new(&config.notify_base_url, config.notify_timeout())?);
    let mut engine = HarnessEngine::build(config, store, Box::new(renderer), notifier)?;
    let started_at = chrono::Utc::now();

    if ipc_mode {
        run_ipc_loop(&mut engine)?;
    } else {
        run_headless(&mut engine, steps);
    }

    print_summary(&engine, started_at, ipc_mode);
    drop(engine.shutdown());
    Ok(())
}

/// Auto-resume after every pause until `steps` steps have run.
fn run_headless(engine: &mut HarnessEngine, steps: u64) {
    let mut host = HostLoop::new();
    while engine.current_step() < steps {
        for event in host.frame(engine) {
            log::debug!("{event:?}");
            if let HarnessEvent::PauseTriggered { step, start_frame, end_frame } = event {
                println!("  paused at step {step} (frames {start_frame}..{end_frame})");
            }
        }
        if engine.clock.is_paused() && engine.current_step() < steps {
            engine.resume();
        }
    }
}

/// Controller commands arrive as JSON lines on stdin; replies and events
/// leave as JSON lines on stdout. The simulation keeps running between
/// commands.
fn run_ipc_loop(engine: &mut HarnessEngine) -> Result<()> {
    let commands = spawn_stdin_reader()?;
    let mut stdout = io::stdout();
    let mut host = HostLoop::new();

    loop {
        loop {
            let line = match commands.try_recv() {
                Ok(line) => line,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            };
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(cmd) = serde_json::from_str::<ControllerCommand>(&line) {
                let (reply, events) = engine.apply_command(cmd);
                write_out(&mut stdout, &IpcOut::Reply { reply: &reply })?;
                for event in &events {
                    write_out(&mut stdout, &IpcOut::Event { event })?;
                }
                continue;
            }
            match serde_json::from_str::<HostCommand>(&line) {
                Ok(HostCommand::Quit) => return Ok(()),
                Ok(HostCommand::SetTimeScale { scale }) => {
                    for event in &engine.set_time_scale(scale) {
                        write_out(&mut stdout, &IpcOut::Event { event })?;
                    }
                }
                Err(e) => write_out(&mut stdout, &IpcOut::Error { error: e.to_string() })?,
            }
        }

        for event in &host.frame(engine) {
            if !matches!(event, HarnessEvent::FrameCaptured { .. }) {
                write_out(&mut stdout, &IpcOut::Event { event })?;
            }
        }
    }
}

fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

fn write_out(stdout: &mut io::Stdout, out: &IpcOut<'_>) -> Result<()> {
    writeln!(stdout, "{}", serde_json::to_string(out)?)?;
    stdout.flush()?;
    Ok(())
}

fn print_summary(engine: &HarnessEngine, started_at: chrono::DateTime<chrono::Utc>, ipc_mode: bool) {
    let state = engine.state();
    let elapsed = chrono::Utc::now() - started_at;
    let text = format!(
        "=== RUN SUMMARY ===\n  session:    {}\n  prefix:     {}\n  started:    {}\n  wall time:  {:.1}s\n  \
         final step: {}\n  frames:     {}\n  persisted:  {}\n  failed:     {}\n  store:      {}",
        state.session_id,
        state.key_prefix,
        started_at.to_rfc3339(),
        elapsed.num_milliseconds() as f64 / 1000.0,
        state.current_step,
        state.current_frame,
        state.worker.persisted,
        state.worker.failed,
        if state.persistence_live { "live" } else { "unavailable" },
    );
    if ipc_mode {
        // stdout carries the protocol in IPC mode.
        eprintln!("{text}");
    } else {
        println!("{text}");
    }
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    str_arg(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
