mod artifact;
mod ffmpeg;
mod surface;
pub(crate) mod timeline;

pub use artifact::{Artifact, Container};
pub use ffmpeg::FfmpegRecorder;
pub use surface::SurfaceRecorder;

use crate::error::RecorderError;
use crate::frame::OutputFrame;
use async_trait::async_trait;

/// Parameters a recorder is started with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingSpec {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

/// Trait for output destinations
///
/// Frames are either pushed explicitly to an encoder, or rendered into a
/// surface that the recorder captures on its own schedule. Either way the
/// orchestrator calls `push` once per rendered frame. Recordings have a
/// constant frame rate; each frame is placed by its timestamp, so dropped
/// source frames do not shorten the output.
#[async_trait]
pub trait StreamRecorder: Send {
    async fn start(&mut self, spec: RecordingSpec) -> Result<(), RecorderError>;

    async fn push(&mut self, frame: &OutputFrame) -> Result<(), RecorderError>;

    /// Finish encoding and return the complete artifact.
    ///
    /// Must not return before every frame pushed so far is reflected in the
    /// artifact.
    async fn stop(&mut self) -> Result<Artifact, RecorderError>;
}

/// Reject frames whose size differs from the recording
pub(crate) fn check_frame_size(
    spec: &RecordingSpec,
    frame: &OutputFrame,
) -> Result<(), RecorderError> {
    let (width, height) = frame.dimensions();
    if (width, height) != (spec.width, spec.height) {
        return Err(RecorderError::FrameSize {
            width,
            height,
            expected_width: spec.width,
            expected_height: spec.height,
        });
    }
    Ok(())
}
