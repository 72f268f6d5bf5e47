use super::{FramePoll, FrameSource, PlaybackClock};
use crate::error::SourceError;
use crate::frame::Frame;
use async_trait::async_trait;
use image::RgbaImage;

/// In-memory clip played back at a fixed frame rate
pub struct ClipSource {
    frames: Vec<RgbaImage>,
    width: u32,
    height: u32,
    clock: PlaybackClock,
    last_emitted: Option<u64>,
}

impl ClipSource {
    /// Create a clip from decoded frames. All frames must share dimensions;
    /// an empty clip reports 0x0. The frame rate must be finite and positive.
    pub fn new(frames: Vec<RgbaImage>, fps: f64) -> Result<Self, SourceError> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(SourceError::InvalidFrameRate(fps));
        }
        let (width, height) = frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));

        if let Some((index, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.dimensions() != (width, height))
        {
            return Err(SourceError::InconsistentDimensions {
                index: index as u64,
                width: frame.width(),
                height: frame.height(),
                expected_width: width,
                expected_height: height,
            });
        }

        Ok(Self {
            frames,
            width,
            height,
            clock: PlaybackClock::new(fps),
            last_emitted: None,
        })
    }
}

#[async_trait]
impl FrameSource for ClipSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_rate(&self) -> f64 {
        self.clock.fps()
    }

    async fn start(&mut self) -> Result<(), SourceError> {
        self.last_emitted = None;
        self.clock.start();
        Ok(())
    }

    async fn current_frame(&mut self) -> Result<FramePoll, SourceError> {
        let Some(index) = self.clock.current_index() else {
            return Ok(FramePoll::NotReady);
        };
        if index as usize >= self.frames.len() {
            return Ok(FramePoll::EndOfStream);
        }
        if self.last_emitted == Some(index) {
            return Ok(FramePoll::NotReady);
        }

        self.last_emitted = Some(index);
        let image = self.frames[index as usize].clone();
        Ok(FramePoll::Frame(Frame::new(
            index,
            self.clock.timestamp_of(index),
            image,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frames(count: usize) -> Vec<RgbaImage> {
        (0..count).map(|_| RgbaImage::new(4, 4)).collect()
    }

    #[test]
    fn test_rejects_mixed_dimensions() {
        let mut clip = frames(2);
        clip.push(RgbaImage::new(2, 2));
        assert!(matches!(
            ClipSource::new(clip, 30.0),
            Err(SourceError::InconsistentDimensions { index: 2, .. })
        ));
    }

    #[test]
    fn test_rejects_unusable_frame_rate() {
        for fps in [0.0, -30.0, f64::NAN, f64::INFINITY] {
            assert!(
                matches!(
                    ClipSource::new(frames(3), fps),
                    Err(SourceError::InvalidFrameRate(_))
                ),
                "fps {fps} accepted"
            );
        }
    }

    #[test]
    fn test_empty_clip_has_zero_dimensions() {
        let source = ClipSource::new(Vec::new(), 30.0).unwrap();
        assert_eq!(source.dimensions(), (0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_time_playback() {
        let mut source = ClipSource::new(frames(3), 10.0).unwrap();
        assert!(matches!(source.current_frame().await.unwrap(), FramePoll::NotReady));

        source.start().await.unwrap();
        match source.current_frame().await.unwrap() {
            FramePoll::Frame(frame) => assert_eq!(frame.index, 0),
            other => panic!("unexpected {other:?}"),
        }
        // Same position, nothing new
        assert!(matches!(source.current_frame().await.unwrap(), FramePoll::NotReady));

        // Skip past frame 1 entirely: it is dropped, not queued
        tokio::time::sleep(Duration::from_millis(210)).await;
        match source.current_frame().await.unwrap() {
            FramePoll::Frame(frame) => {
                assert_eq!(frame.index, 2);
                assert_eq!(frame.timestamp, Duration::from_millis(200));
            }
            other => panic!("unexpected {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(source.current_frame().await.unwrap(), FramePoll::EndOfStream));
    }
}
