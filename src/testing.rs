//! Test doubles shared by unit tests

use crate::capture::{FramePoll, FrameSource};
use crate::compositing::{composite, Mask};
use crate::error::{RecorderError, SegmentationError, SourceError};
use crate::frame::{Frame, OutputFrame};
use crate::output::timeline::{Placement, SlotTimeline};
use crate::output::{check_frame_size, Artifact, Container, RecordingSpec, StreamRecorder};
use crate::segmentation::{ModelLoader, Region, SegmentationAdapter, SegmentationResult};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use image::{Rgba, RgbaImage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Frame with a per-index color so frames are distinguishable
pub fn image(index: u64, width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([index as u8, 10, 20, 255]))
}

/// Fully opaque output frame presented at `index / 30` seconds
pub fn output_frame(index: u64, width: u32, height: u32) -> OutputFrame {
    let timestamp = Duration::from_secs_f64(index as f64 / 30.0);
    let frame = Frame::new(index, timestamp, image(index, width, height));
    let mask = Mask::from_decisions(width, height, vec![true; (width * height) as usize])
        .expect("mask size");
    composite(frame, &mask).expect("composite")
}

/// One scripted segmentation response
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Whole frame is foreground
    Full,
    /// Top-left square of the given side is foreground
    Square(u32),
    /// No detection
    Nothing,
    /// Inference error
    Fail,
    /// Respond after a delay
    Delay(Duration, Box<Scripted>),
}

impl Scripted {
    fn resolve(&self, width: u32, height: u32) -> Result<SegmentationResult, SegmentationError> {
        match self {
            Scripted::Full => Ok(SegmentationResult::single(Region::uniform(width, height, 1.0))),
            Scripted::Square(side) => {
                let mut values = vec![0.0; (width * height) as usize];
                for y in 0..(*side).min(height) {
                    for x in 0..(*side).min(width) {
                        values[(y * width + x) as usize] = 1.0;
                    }
                }
                Ok(SegmentationResult::single(Region {
                    width,
                    height,
                    confidence: values,
                }))
            }
            Scripted::Nothing => Ok(SegmentationResult::empty()),
            Scripted::Fail => Err(SegmentationError::Inference("scripted failure".into())),
            Scripted::Delay(_, inner) => inner.resolve(width, height),
        }
    }
}

/// Segmenter that replays a script, then repeats a fallback response
pub struct ScriptedSegmenter {
    script: VecDeque<Scripted>,
    fallback: Scripted,
    pub calls: Arc<AtomicUsize>,
    pub resets: Arc<AtomicUsize>,
}

impl ScriptedSegmenter {
    pub fn new(script: Vec<Scripted>, fallback: Scripted) -> Self {
        Self {
            script: script.into(),
            fallback,
            calls: Arc::new(AtomicUsize::new(0)),
            resets: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always(response: Scripted) -> Self {
        Self::new(Vec::new(), response)
    }
}

#[async_trait]
impl SegmentationAdapter for ScriptedSegmenter {
    async fn segment(&mut self, frame: &Frame) -> Result<SegmentationResult, SegmentationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.pop_front().unwrap_or_else(|| self.fallback.clone());
        if let Scripted::Delay(delay, _) = &step {
            tokio::time::sleep(*delay).await;
        }
        let (width, height) = frame.dimensions();
        step.resolve(width, height)
    }

    fn reset_state(&mut self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Hands out a prepared adapter once
pub struct StaticLoader {
    adapter: Mutex<Option<Box<dyn SegmentationAdapter>>>,
}

impl StaticLoader {
    pub fn new(adapter: impl SegmentationAdapter + 'static) -> Self {
        Self {
            adapter: Mutex::new(Some(Box::new(adapter))),
        }
    }
}

#[async_trait]
impl ModelLoader for StaticLoader {
    async fn load(&self) -> Result<Box<dyn SegmentationAdapter>, SegmentationError> {
        self.adapter
            .lock()
            .expect("loader lock")
            .take()
            .ok_or_else(|| SegmentationError::ModelLoad("adapter already taken".into()))
    }
}

/// Loader that always fails
pub struct FailingLoader;

#[async_trait]
impl ModelLoader for FailingLoader {
    async fn load(&self) -> Result<Box<dyn SegmentationAdapter>, SegmentationError> {
        Err(SegmentationError::ModelLoad("weights not found".into()))
    }
}

/// Recorder that keeps pushed frames in memory. The artifact is the raw RGBA
/// bytes of every output slot, laid out like the ffmpeg recorder does.
#[derive(Default)]
pub struct MemoryRecorder {
    pub spec: Option<RecordingSpec>,
    /// Every frame received, in push order
    pub frames: Vec<OutputFrame>,
    pub starts: usize,
    pub stops: usize,
    pub fail_stop: bool,
    pub fail_push: bool,
    recording: bool,
    timeline: Option<SlotTimeline>,
    output: BytesMut,
    slots: u64,
    last_placed: Option<usize>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_stop() -> Self {
        Self {
            fail_stop: true,
            ..Default::default()
        }
    }

    pub fn failing_push() -> Self {
        Self {
            fail_push: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl StreamRecorder for MemoryRecorder {
    async fn start(&mut self, spec: RecordingSpec) -> Result<(), RecorderError> {
        if self.recording {
            return Err(RecorderError::AlreadyStarted);
        }
        self.spec = Some(spec);
        self.starts += 1;
        self.recording = true;
        self.timeline = Some(SlotTimeline::new(spec.frame_rate));
        self.output.clear();
        self.slots = 0;
        self.last_placed = None;
        Ok(())
    }

    async fn push(&mut self, frame: &OutputFrame) -> Result<(), RecorderError> {
        let spec = self.spec.filter(|_| self.recording).ok_or(RecorderError::NotStarted)?;
        check_frame_size(&spec, frame)?;
        if self.fail_push {
            return Err(RecorderError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "encoder went away",
            )));
        }

        let timeline = self.timeline.as_mut().ok_or(RecorderError::NotStarted)?;
        if let Placement::Placed { repeats, .. } = timeline.place(frame.timestamp()) {
            if let Some(last) = self.last_placed.map(|i| &self.frames[i]) {
                for _ in 0..repeats {
                    self.output.extend_from_slice(last.as_bytes());
                }
                self.slots += repeats;
            }
            self.output.extend_from_slice(frame.as_bytes());
            self.slots += 1;
            self.last_placed = Some(self.frames.len());
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    async fn stop(&mut self) -> Result<Artifact, RecorderError> {
        let spec = self.spec.filter(|_| self.recording).ok_or(RecorderError::NotStarted)?;
        self.recording = false;
        self.stops += 1;

        if self.fail_stop {
            return Err(RecorderError::EncoderFailed {
                message: "disk full".into(),
                exit_code: Some(1),
            });
        }

        let data: Bytes = self.output.split().freeze();

        Ok(Artifact {
            data,
            width: spec.width,
            height: spec.height,
            frame_rate: spec.frame_rate,
            frames: self.slots,
            container: Container::Matroska,
        })
    }
}

/// Source that reports valid dimensions but cannot start decoding
pub struct FailingSource {
    width: u32,
    height: u32,
}

impl FailingSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[async_trait]
impl FrameSource for FailingSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_rate(&self) -> f64 {
        30.0
    }

    async fn start(&mut self) -> Result<(), SourceError> {
        Err(SourceError::FfmpegNotFound)
    }

    async fn current_frame(&mut self) -> Result<FramePoll, SourceError> {
        Ok(FramePoll::NotReady)
    }
}
