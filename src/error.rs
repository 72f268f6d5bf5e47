//! Error taxonomy for pipeline runs.
//!
//! Per-frame failures (`SegmentationError`, `CompositeError`) are recovered
//! inside the frame loop. Everything that reaches `PipelineError` ends the run.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Classification carried by the `Errored` run event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    ModelLoadFailure,
    InvalidSourceDimensions,
    SegmentationFailure,
    RecorderStartFailure,
    RecorderWriteFailure,
    RecorderFlushFailure,
    SourceReadFailure,
}

impl ErrorKind {
    /// Whether an error of this kind terminates the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ErrorKind::SegmentationFailure)
    }
}

/// Run-level error. Every variant is terminal for the run that raised it.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to load segmentation model: {0}")]
    ModelLoad(String),

    #[error("Source reported invalid dimensions {width}x{height}")]
    InvalidSourceDimensions { width: u32, height: u32 },

    #[error("Failed to start recorder: {0}")]
    RecorderStart(#[source] RecorderError),

    #[error("Failed to write frame to recorder: {0}")]
    RecorderWrite(#[source] RecorderError),

    #[error("Failed to finalize recording: {0}")]
    RecorderFlush(#[source] RecorderError),

    #[error("Failed to read from source: {0}")]
    SourceRead(#[from] SourceError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::ModelLoad(_) => ErrorKind::ModelLoadFailure,
            PipelineError::InvalidSourceDimensions { .. } => ErrorKind::InvalidSourceDimensions,
            PipelineError::RecorderStart(_) => ErrorKind::RecorderStartFailure,
            PipelineError::RecorderWrite(_) => ErrorKind::RecorderWriteFailure,
            PipelineError::RecorderFlush(_) => ErrorKind::RecorderFlushFailure,
            PipelineError::SourceRead(_) => ErrorKind::SourceReadFailure,
        }
    }
}

/// Failure of a single segmentation call, or of loading the model.
#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model produced unusable output: {0}")]
    InvalidOutput(String),

    #[error("Segmentation timed out after {0:?}")]
    Timeout(Duration),
}

impl SegmentationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SegmentationError::ModelLoad(_) => ErrorKind::ModelLoadFailure,
            _ => ErrorKind::SegmentationFailure,
        }
    }
}

/// Mask derivation or compositing failure for one frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompositeError {
    #[error("Region has zero size")]
    EmptyRegion,

    #[error("Region confidence map has {actual} values, expected {expected}")]
    RegionSizeMismatch { expected: usize, actual: usize },

    #[error("Mask is {mask_width}x{mask_height} but frame is {frame_width}x{frame_height}")]
    DimensionMismatch {
        mask_width: u32,
        mask_height: u32,
        frame_width: u32,
        frame_height: u32,
    },
}

/// Errors raised by a frame source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Decoding failed: {0}")]
    Decode(String),

    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(f64),

    #[error("Frame {index} is {width}x{height}, expected {expected_width}x{expected_height}")]
    InconsistentDimensions {
        index: u64,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a stream recorder.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("Recorder has not been started")]
    NotStarted,

    #[error("Recorder is already started")]
    AlreadyStarted,

    #[error("Frame is {width}x{height}, recorder expects {expected_width}x{expected_height}")]
    FrameSize {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    #[error("Encoder failed: {message}")]
    EncoderFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("Capture task failed: {0}")]
    Capture(String),

    #[error("Recorder produced an empty artifact")]
    EmptyArtifact,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Mask threshold must be in (0, 1], got {0}")]
    Threshold(f32),

    #[error("Frame rate must be greater than zero")]
    FrameRate,

    #[error("Poll interval must be greater than zero")]
    PollInterval,
}

/// Errors from the remote processing worker.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{0}")]
    Worker(String),

    #[error("Worker returned an empty response")]
    EmptyResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
