//! Process-unique key prefix for every frame written to the store.
//!
//! Concurrent sessions may share one store, so keys are namespaced by
//! an 8-character token drawn once at startup.

use crate::types::FrameId;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

const TOKEN_LEN: usize = 8;
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPrefix(String);

impl KeyPrefix {
    /// Draw a fresh prefix. A seed makes it reproducible.
    pub fn generate(seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(s) => Pcg64Mcg::seed_from_u64(s),
            None => Pcg64Mcg::from_entropy(),
        };
        let token: String = (0..TOKEN_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(format!("{token}_"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{prefix}{frame_id}`: raw pixel bytes.
    pub fn frame_key(&self, frame_id: FrameId) -> String {
        format!("{}{frame_id}", self.0)
    }

    /// `{prefix}{frame_id}_meta`: `"{width}x{height}"`.
    pub fn meta_key(&self, frame_id: FrameId) -> String {
        format!("{}{frame_id}_meta", self.0)
    }
}

impl std::fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
