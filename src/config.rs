//! Pipeline configuration

use crate::error::ConfigError;
use std::time::Duration;

/// Foreground confidence cutoff. Lower values lose hands and other thin
/// structures, higher values erode edges.
pub const DEFAULT_MASK_THRESHOLD: f32 = 0.6;

pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Inputs above this size are likely to take a long time. Informational only.
pub const DEFAULT_SOFT_INPUT_CAP_BYTES: u64 = 500 * 1024 * 1024;

/// Configuration for a background removal run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Confidence at or above which a pixel counts as foreground
    pub mask_threshold: f32,

    /// Output frame rate handed to the recorder
    pub frame_rate: u32,

    /// Soft cap on input size; the core never enforces it
    pub soft_input_cap_bytes: u64,

    /// Sleep between quanta while the source has no new frame
    pub poll_interval: Duration,

    /// Treat segmentation calls running longer than this as "no detection"
    pub segment_timeout: Option<Duration>,

    /// Emit progress and timing stats every N rendered frames
    pub stats_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mask_threshold: DEFAULT_MASK_THRESHOLD,
            frame_rate: DEFAULT_FRAME_RATE,
            soft_input_cap_bytes: DEFAULT_SOFT_INPUT_CAP_BYTES,
            poll_interval: Duration::from_millis(5),
            segment_timeout: None,
            stats_interval: 30,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.mask_threshold > 0.0 && self.mask_threshold <= 1.0) {
            return Err(ConfigError::Threshold(self.mask_threshold));
        }
        if self.frame_rate == 0 {
            return Err(ConfigError::FrameRate);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::PollInterval);
        }
        Ok(())
    }

    /// Whether an input of `size_bytes` exceeds the soft cap
    pub fn exceeds_soft_cap(&self, size_bytes: u64) -> bool {
        size_bytes > self.soft_input_cap_bytes
    }
}
