mod clip;
mod clock;
mod file;

pub use clip::ClipSource;
pub use clock::PlaybackClock;
pub use file::VideoFileSource;

use crate::error::SourceError;
use crate::frame::Frame;
use async_trait::async_trait;

/// Result of asking a source for its current frame
#[derive(Debug)]
pub enum FramePoll {
    /// A frame the caller has not seen yet
    Frame(Frame),
    /// Playback has not reached a new frame since the last poll
    NotReady,
    /// Playback is past the last frame
    EndOfStream,
}

/// Trait for video frame sources
///
/// Sources play back at their own real-time cadence once started; polling
/// does not advance them, so frames the caller is too slow to poll are
/// dropped rather than queued.
#[async_trait]
pub trait FrameSource: Send {
    /// Dimensions of every frame this source produces
    fn dimensions(&self) -> (u32, u32);

    /// Native frame rate
    fn frame_rate(&self) -> f64;

    /// Begin real-time playback from the start position
    async fn start(&mut self) -> Result<(), SourceError>;

    /// Frame at the current playback position
    async fn current_frame(&mut self) -> Result<FramePoll, SourceError>;
}
