//! Implicit capture from a shared render surface
//!
//! The orchestrator renders each output frame into a `RenderSurface`. A
//! capture task samples the surface on every frame period and feeds its
//! current contents to an inner recorder, the way a canvas capture stream
//! works: the surface keeps being recorded while nothing new is rendered.

use super::{check_frame_size, Artifact, RecordingSpec, StreamRecorder};
use crate::error::RecorderError;
use crate::frame::OutputFrame;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct SurfaceState {
    generation: u64,
    frame: Option<OutputFrame>,
}

/// Latest rendered output frame, shared between renderer and capturer
#[derive(Clone, Default)]
struct RenderSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl RenderSurface {
    /// Replace the surface contents
    fn render(&self, frame: &OutputFrame) -> Result<(), RecorderError> {
        let mut state = self.lock()?;
        state.generation += 1;
        state.frame = Some(frame.clone());
        Ok(())
    }

    /// Current contents if rendered after `generation`
    fn snapshot_since(&self, generation: u64) -> Result<Option<(u64, OutputFrame)>, RecorderError> {
        let state = self.lock()?;
        Ok(match &state.frame {
            Some(frame) if state.generation > generation => Some((state.generation, frame.clone())),
            _ => None,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SurfaceState>, RecorderError> {
        self.state
            .lock()
            .map_err(|_| RecorderError::Capture("render surface lock poisoned".to_string()))
    }
}

struct CaptureTask {
    spec: RecordingSpec,
    cancel: CancellationToken,
    handle: JoinHandle<Result<Box<dyn StreamRecorder>, RecorderError>>,
}

/// Recorder that captures a render surface instead of receiving frames directly
pub struct SurfaceRecorder {
    surface: RenderSurface,
    inner: Option<Box<dyn StreamRecorder>>,
    capture: Option<CaptureTask>,
}

impl SurfaceRecorder {
    pub fn new(inner: Box<dyn StreamRecorder>) -> Self {
        Self {
            surface: RenderSurface::default(),
            inner: Some(inner),
            capture: None,
        }
    }
}

/// Presentation time of capture tick `tick`
fn tick_time(tick: u64, frame_rate: u32) -> Duration {
    Duration::from_secs_f64(tick as f64 / frame_rate as f64)
}

async fn capture_loop(
    surface: RenderSurface,
    mut inner: Box<dyn StreamRecorder>,
    frame_rate: u32,
    cancel: CancellationToken,
) -> Result<Box<dyn StreamRecorder>, RecorderError> {
    let period = Duration::from_secs_f64(1.0 / frame_rate as f64);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut captured = 0u64;
    let mut current: Option<OutputFrame> = None;
    // Capture time starts at the first tick with something on the surface
    let mut origin: Option<Instant> = None;
    let mut last_tick: Option<u64> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            at = ticker.tick() => {
                if let Some((generation, frame)) = surface.snapshot_since(captured)? {
                    captured = generation;
                    current = Some(frame);
                }
                let Some(frame) = &current else { continue };

                let origin = *origin.get_or_insert(at);
                let tick = ((at - origin).as_secs_f64() * frame_rate as f64).round() as u64;
                inner.push(&frame.restamped(tick_time(tick, frame_rate))).await?;
                last_tick = Some(tick);
            }
        }
    }

    // Anything rendered after the last tick still belongs in the recording
    if let Some((_, frame)) = surface.snapshot_since(captured)? {
        let tick = last_tick.map_or(0, |t| t + 1);
        inner.push(&frame.restamped(tick_time(tick, frame_rate))).await?;
    }

    Ok(inner)
}

#[async_trait]
impl StreamRecorder for SurfaceRecorder {
    async fn start(&mut self, spec: RecordingSpec) -> Result<(), RecorderError> {
        let mut inner = self.inner.take().ok_or(RecorderError::AlreadyStarted)?;
        if let Err(e) = inner.start(spec).await {
            self.inner = Some(inner);
            return Err(e);
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(capture_loop(
            self.surface.clone(),
            inner,
            spec.frame_rate.max(1),
            cancel.clone(),
        ));

        tracing::debug!("Surface capture started at {}fps", spec.frame_rate);
        self.capture = Some(CaptureTask {
            spec,
            cancel,
            handle,
        });
        Ok(())
    }

    async fn push(&mut self, frame: &OutputFrame) -> Result<(), RecorderError> {
        let capture = self.capture.as_ref().ok_or(RecorderError::NotStarted)?;
        check_frame_size(&capture.spec, frame)?;
        self.surface.render(frame)
    }

    async fn stop(&mut self) -> Result<Artifact, RecorderError> {
        let capture = self.capture.take().ok_or(RecorderError::NotStarted)?;
        capture.cancel.cancel();

        let mut inner = capture
            .handle
            .await
            .map_err(|e| RecorderError::Capture(format!("capture task failed: {e}")))??;
        inner.stop().await
    }
}
