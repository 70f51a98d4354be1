use crate::types::FrameId;

/// Bytes per pixel of a raw RGB capture.
pub const BYTES_PER_PIXEL: usize = 3;

/// One captured frame. Immutable once built; ownership moves
/// scheduler → queue → worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub frame_id: FrameId,
    pub width:    u32,
    pub height:   u32,
    pub pixels:   Vec<u8>,
}

impl FrameRecord {
    pub fn new(frame_id: FrameId, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self { frame_id, width, height, pixels }
    }

    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }

    /// Metadata value stored next to the pixels: `"{width}x{height}"`.
    pub fn meta(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}
