use super::state::{RunEvent, RunPhase, RunReport, RunStats};
use crate::capture::{FramePoll, FrameSource};
use crate::compositing::{MaskCompositor, MaskSource, SkipReason, StepOutcome};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, RecorderError, SegmentationError, SourceError};
use crate::frame::Frame;
use crate::output::{RecordingSpec, StreamRecorder};
use crate::segmentation::{ModelLoader, SegmentationAdapter, SegmentationResult};
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

/// Aggregate state of one run, owned by the orchestrator
struct PipelineRun {
    width: u32,
    height: u32,
    last_index: Option<u64>,
    stats: RunStats,
}

impl PipelineRun {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            last_index: None,
            stats: RunStats::default(),
        }
    }

    /// Count a newly seen frame and any source frames skipped before it
    fn observe(&mut self, index: u64) {
        let expected = self.last_index.map_or(0, |last| last + 1);
        self.stats.frames_dropped += index.saturating_sub(expected);
        self.stats.frames_seen += 1;
        self.last_index = Some(index);
    }
}

/// How the frame loop ended
enum LoopExit {
    EndOfStream,
    Aborted,
}

/// Drives one segmentation-compositing-recording run
///
/// Frames are polled from the source at its own cadence; each new frame is
/// segmented (one call at a time), masked and handed to the recorder. Frames
/// that play past while a call is in flight are dropped.
pub struct Orchestrator {
    config: PipelineConfig,
    phase: RunPhase,
    events: Option<UnboundedSender<RunEvent>>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            phase: RunPhase::Idle,
            events: None,
        }
    }

    /// Receive run events. Only the most recent subscriber is served.
    pub fn subscribe(&mut self) -> UnboundedReceiver<RunEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            // A dropped subscriber is not an error for the pipeline
            let _ = events.send(event);
        }
    }

    fn transition(&mut self, next: RunPhase) {
        debug_assert!(
            self.phase.allows(next),
            "illegal transition {:?} -> {:?}",
            self.phase,
            next
        );
        tracing::info!("Run phase: {:?} -> {:?}", self.phase, next);
        let from = std::mem::replace(&mut self.phase, next);
        self.emit(RunEvent::PhaseChanged { from, to: next });
    }

    fn fail(&mut self, error: PipelineError) -> PipelineError {
        tracing::error!("Run failed ({:?}): {}", error.kind(), error);
        self.transition(RunPhase::Errored);
        self.emit(RunEvent::Failed {
            kind: error.kind(),
            message: error.to_string(),
        });
        error
    }

    /// Run the pipeline to completion.
    ///
    /// Consumes the orchestrator: a run happens at most once, and there is no
    /// automatic retry. Cancelling `cancel` during the frame loop finalizes
    /// whatever has been recorded so far.
    pub async fn run(
        mut self,
        source: &mut dyn FrameSource,
        loader: &dyn ModelLoader,
        recorder: &mut dyn StreamRecorder,
        cancel: CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        self.transition(RunPhase::Initializing);

        let mut model = match loader.load().await {
            Ok(model) => model,
            Err(e) => return Err(self.fail(PipelineError::ModelLoad(e.to_string()))),
        };
        tracing::info!("Segmentation model '{}' loaded", model.name());

        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(self.fail(PipelineError::InvalidSourceDimensions { width, height }));
        }
        model.reset_state();
        self.transition(RunPhase::Ready);

        let spec = RecordingSpec {
            width,
            height,
            frame_rate: self.config.frame_rate,
        };
        if let Err(e) = recorder.start(spec).await {
            return Err(self.fail(PipelineError::RecorderStart(e)));
        }
        if let Err(e) = source.start().await {
            abandon_recording(recorder).await;
            return Err(self.fail(e.into()));
        }
        self.transition(RunPhase::Running);

        let mut run = PipelineRun::new(width, height);
        let exit = match self
            .frame_loop(&mut run, source, model.as_mut(), recorder, &cancel)
            .await
        {
            Ok(exit) => exit,
            Err(e) => {
                abandon_recording(recorder).await;
                return Err(self.fail(e));
            }
        };

        let aborted = matches!(exit, LoopExit::Aborted);
        if aborted {
            tracing::info!("Run aborted after {} rendered frames", run.stats.frames_rendered);
        }
        self.transition(RunPhase::Finalizing);

        let artifact = match recorder.stop().await {
            Ok(artifact) if artifact.is_empty() => {
                return Err(self.fail(PipelineError::RecorderFlush(RecorderError::EmptyArtifact)))
            }
            Ok(artifact) => artifact,
            Err(e) => return Err(self.fail(PipelineError::RecorderFlush(e))),
        };

        tracing::info!(
            "Run complete: {} frames rendered, {} skipped, {} dropped, {} bytes",
            run.stats.frames_rendered,
            run.stats.frames_skipped,
            run.stats.frames_dropped,
            artifact.len()
        );
        self.transition(RunPhase::Completed);
        self.emit(RunEvent::Completed {
            bytes: artifact.len(),
            frames: artifact.frames,
        });

        Ok(RunReport {
            artifact,
            stats: run.stats,
            aborted,
        })
    }

    async fn frame_loop(
        &self,
        run: &mut PipelineRun,
        source: &mut dyn FrameSource,
        model: &mut dyn SegmentationAdapter,
        recorder: &mut dyn StreamRecorder,
        cancel: &CancellationToken,
    ) -> Result<LoopExit, PipelineError> {
        let mut compositor = MaskCompositor::new(self.config.mask_threshold);

        tracing::info!(
            "Starting frame loop ({}x{}, threshold {})",
            run.width,
            run.height,
            compositor.threshold()
        );

        loop {
            let poll = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(LoopExit::Aborted),
                poll = source.current_frame() => poll?,
            };

            let frame = match poll {
                FramePoll::EndOfStream => return Ok(LoopExit::EndOfStream),
                FramePoll::NotReady => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(LoopExit::Aborted),
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                    continue;
                }
                FramePoll::Frame(frame) => frame,
            };

            let (width, height) = frame.dimensions();
            if (width, height) != (run.width, run.height) {
                return Err(SourceError::InconsistentDimensions {
                    index: frame.index,
                    width,
                    height,
                    expected_width: run.width,
                    expected_height: run.height,
                }
                .into());
            }
            run.observe(frame.index);

            let segment_start = Instant::now();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(LoopExit::Aborted),
                result = self.segment(model, &frame) => result,
            };
            run.stats.segment_time += segment_start.elapsed();

            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    run.stats.segmentation_failures += 1;
                    tracing::warn!(
                        "Segmentation error on frame {} ({:?}), treating as empty: {}",
                        frame.index,
                        e.kind(),
                        e
                    );
                    SegmentationResult::empty()
                }
            };

            let composite_start = Instant::now();
            let outcome = compositor.process(frame, &result);
            run.stats.composite_time += composite_start.elapsed();

            match outcome {
                StepOutcome::Composited { frame, source } => {
                    let record_start = Instant::now();
                    recorder
                        .push(&frame)
                        .await
                        .map_err(PipelineError::RecorderWrite)?;
                    run.stats.record_time += record_start.elapsed();

                    run.stats.frames_rendered += 1;
                    if source == MaskSource::Cached {
                        run.stats.mask_reuses += 1;
                    }
                    self.report_progress(run);
                }
                StepOutcome::Skipped(reason) => {
                    run.stats.frames_skipped += 1;
                    match reason {
                        SkipReason::NoMaskYet => tracing::debug!(
                            "No mask yet, skipping frame {}",
                            run.last_index.unwrap_or_default()
                        ),
                        SkipReason::Failed(e) => tracing::warn!("Skipping frame: {}", e),
                    }
                }
            }
        }
    }

    /// One segmentation call, bounded by the configured timeout if any
    async fn segment(
        &self,
        model: &mut dyn SegmentationAdapter,
        frame: &Frame,
    ) -> Result<SegmentationResult, SegmentationError> {
        match self.config.segment_timeout {
            Some(limit) => tokio::time::timeout(limit, model.segment(frame))
                .await
                .map_err(|_| SegmentationError::Timeout(limit))?,
            None => model.segment(frame).await,
        }
    }

    fn report_progress(&self, run: &PipelineRun) {
        let stats = &run.stats;
        if self.config.stats_interval == 0 || stats.frames_rendered % self.config.stats_interval != 0 {
            return;
        }

        let segment_ms = stats.avg_segment_ms();
        let composite_ms = stats.avg_composite_ms();
        let record_ms = stats.avg_record_ms();
        let total_ms = segment_ms + composite_ms + record_ms;
        let fps = if total_ms > 0.0 { 1000.0 / total_ms } else { 0.0 };

        tracing::info!(
            "Frame {}: segment={:.1}ms, composite={:.1}ms, record={:.1}ms, total={:.1}ms, fps={:.1}, dropped={}, reused={}",
            stats.frames_rendered,
            segment_ms,
            composite_ms,
            record_ms,
            total_ms,
            fps,
            stats.frames_dropped,
            stats.mask_reuses
        );
        self.emit(RunEvent::Progress(stats.clone()));
    }
}

/// Stop a recorder whose output will not be used
async fn abandon_recording(recorder: &mut dyn StreamRecorder) {
    if let Err(e) = recorder.stop().await {
        tracing::warn!("Failed to stop recorder after error: {}", e);
    }
}
