//! Frame types flowing through the pipeline

use image::RgbaImage;
use std::time::Duration;

/// A decoded RGBA frame, row-major, 8 bits per channel.
///
/// Owned by the orchestrator for one processing step. Sources hand out
/// copies, never shared buffers.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position of the frame in the source
    pub index: u64,
    /// Presentation time relative to the start of the source
    pub timestamp: Duration,
    pub image: RgbaImage,
}

impl Frame {
    pub fn new(index: u64, timestamp: Duration, image: RgbaImage) -> Self {
        Self {
            index,
            timestamp,
            image,
        }
    }

    /// Build a frame from raw RGBA bytes. Returns `None` if the buffer does not
    /// hold exactly `width * height * 4` bytes.
    pub fn from_raw(
        index: u64,
        timestamp: Duration,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> Option<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return None;
        }
        RgbaImage::from_raw(width, height, data).map(|image| Self::new(index, timestamp, image))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// A frame whose alpha channel has been replaced by a binary mask decision.
///
/// Only the compositor constructs these, so alpha is always 0 or 255.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFrame {
    index: u64,
    timestamp: Duration,
    image: RgbaImage,
}

impl OutputFrame {
    pub(crate) fn new(index: u64, timestamp: Duration, image: RgbaImage) -> Self {
        Self {
            index,
            timestamp,
            image,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Raw RGBA bytes, row-major
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Same pixels presented at another time
    pub(crate) fn restamped(&self, timestamp: Duration) -> Self {
        Self {
            index: self.index,
            timestamp,
            image: self.image.clone(),
        }
    }
}
