//! Renderer collaborator: produces raw RGB snapshots of the surface.

use crate::{error::HarnessResult, frame::FrameRecord};

pub trait Renderer {
    /// Output resolution, fixed for the renderer's lifetime.
    fn resolution(&self) -> (u32, u32);

    /// One raw RGB snapshot, `width * height * 3` bytes.
    fn capture(&mut self) -> HarnessResult<Vec<u8>>;
}

/// Headless renderer: a diagonal gradient that scrolls one pixel per
/// capture, so consecutive frames differ and every byte is predictable.
pub struct SyntheticRenderer {
    width:    u32,
    height:   u32,
    captures: u64,
}

impl SyntheticRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, captures: 0 }
    }

    /// The buffer the `n`-th capture (0-based) returns.
    pub fn frame_bytes(width: u32, height: u32, n: u64) -> Vec<u8> {
        let mut pixels = Vec::with_capacity(FrameRecord::expected_len(width, height));
        for y in 0..height as u64 {
            for x in 0..width as u64 {
                let shade = (x + y + n) % 256;
                pixels.push(shade as u8);
                pixels.push((shade / 2) as u8);
                pixels.push((255 - shade) as u8);
            }
        }
        pixels
    }
}

impl Renderer for SyntheticRenderer {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture(&mut self) -> HarnessResult<Vec<u8>> {
        let pixels = Self::frame_bytes(self.width, self.height, self.captures);
        self.captures += 1;
        Ok(pixels)
    }
}
