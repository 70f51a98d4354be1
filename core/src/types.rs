//! Shared primitive types used across the entire harness.

/// A fixed simulation step. Incremented once per `tick()` while running.
pub type Step = u64;

/// A rendered-frame counter. Incremented once per `update()`.
pub type FrameId = u64;

/// The canonical session identifier (one per process).
pub type SessionId = String;
