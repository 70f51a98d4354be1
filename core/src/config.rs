//! Harness configuration.
//!
//! Every field has a default so a partial JSON file is enough:
//! `{ "pause_duration": 20, "notify_base_url": "http://controller:9000" }`.

use crate::{error::{HarnessError, HarnessResult}, types::Step};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Minimum wall-clock gap between two captures.
    pub capture_interval_ms: u64,
    /// Steps per action window before the simulation pauses.
    pub pause_duration: Step,
    /// Capture queue capacity. Overflow drops the oldest frame.
    pub queue_capacity: usize,
    /// Expiry applied to both the frame key and its `_meta` key.
    pub frame_ttl_secs: u64,
    pub drain_poll_interval_ms: u64,
    pub drain_max_polls: u32,
    /// Consumer wait ceiling when the queue is empty.
    pub worker_idle_ms: u64,
    pub worker_shutdown_timeout_ms: u64,
    pub purge_interval_secs: u64,
    pub notify_base_url: String,
    pub notify_timeout_secs: u64,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Fixed seed for the key prefix. `None` draws from entropy.
    pub prefix_seed: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            capture_interval_ms:        200,
            pause_duration:             50,
            queue_capacity:             30,
            frame_ttl_secs:             300,
            drain_poll_interval_ms:     10,
            drain_max_polls:            50,
            worker_idle_ms:             5,
            worker_shutdown_timeout_ms: 2000,
            purge_interval_secs:        60,
            notify_base_url:            "http://127.0.0.1:8000".to_string(),
            notify_timeout_secs:        10,
            capture_width:              640,
            capture_height:             480,
            prefix_seed:                None,
        }
    }
}

impl HarnessConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &str) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| HarnessError::ConfigRead { path: path.to_string(), source })?;
        let config: HarnessConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Small frames and a fixed prefix seed. Used by tests.
    pub fn default_test() -> Self {
        Self {
            pause_duration: 5,
            capture_width:  8,
            capture_height: 6,
            prefix_seed:    Some(0x5EED),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.queue_capacity == 0 {
            return Err(HarnessError::InvalidConfig("queue_capacity must be > 0".into()));
        }
        if self.capture_interval_ms == 0 {
            return Err(HarnessError::InvalidConfig("capture_interval_ms must be > 0".into()));
        }
        if self.notify_base_url.trim().is_empty() {
            return Err(HarnessError::InvalidConfig("notify_base_url is empty".into()));
        }
        if self.capture_width == 0 || self.capture_height == 0 {
            return Err(HarnessError::InvalidConfig("capture resolution must be non-zero".into()));
        }
        Ok(())
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn frame_ttl(&self) -> Duration {
        Duration::from_secs(self.frame_ttl_secs)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    pub fn worker_idle(&self) -> Duration {
        Duration::from_millis(self.worker_idle_ms)
    }

    pub fn worker_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_shutdown_timeout_ms)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}
