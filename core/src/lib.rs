//! Frame capture and pause/resume harness for driving a simulation from an
//! external controller.
//!
//! The simulation thread captures frames at a fixed rate and pauses after
//! a bounded run of steps. A background worker persists frames to the
//! store, and each pause notifies the controller which frames it can read.

pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod frame;
pub mod notifier;
pub mod prefix;
pub mod queue;
pub mod renderer;
pub mod scheduler;
pub mod store;
pub mod tracker;
pub mod types;
pub mod worker;
