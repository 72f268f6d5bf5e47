//! Run state machine and events
//!
//! Every phase transition is published as a `RunEvent` so observers (CLI
//! logging, a UI) can follow a run without owning any of its state.

use crate::error::ErrorKind;
use crate::output::Artifact;
use serde::Serialize;
use std::time::Duration;

/// Phase of a processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    /// Waiting for a run request
    #[default]
    Idle,
    /// Loading the segmentation model and checking the source
    Initializing,
    /// Model loaded, source dimensions known
    Ready,
    /// Frame loop active
    Running,
    /// Stopping the recorder and waiting for the flush
    Finalizing,
    /// Artifact handed to the caller
    Completed,
    /// Terminal failure
    Errored,
}

impl RunPhase {
    /// Whether `self -> next` is a legal transition
    pub fn allows(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, Ready)
                | (Ready, Running)
                | (Running, Finalizing)
                | (Finalizing, Completed)
                | (Initializing, Errored)
                | (Ready, Errored)
                | (Running, Errored)
                | (Finalizing, Errored)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Errored)
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    /// Frames obtained from the source
    pub frames_seen: u64,
    /// Frames composited and handed to the recorder
    pub frames_rendered: u64,
    /// Frames with no output (no mask yet, or compositing failed)
    pub frames_skipped: u64,
    /// Source frames played past while the loop was busy
    pub frames_dropped: u64,
    /// Rendered frames that reused the cached mask
    pub mask_reuses: u64,
    /// Segmentation errors and timeouts, each treated as "no detection"
    pub segmentation_failures: u64,
    pub segment_time: Duration,
    pub composite_time: Duration,
    pub record_time: Duration,
}

impl RunStats {
    fn average_ms(total: Duration, count: u64) -> f64 {
        if count == 0 {
            return 0.0;
        }
        total.as_secs_f64() * 1000.0 / count as f64
    }

    pub fn avg_segment_ms(&self) -> f64 {
        Self::average_ms(self.segment_time, self.frames_seen)
    }

    pub fn avg_composite_ms(&self) -> f64 {
        Self::average_ms(self.composite_time, self.frames_seen)
    }

    pub fn avg_record_ms(&self) -> f64 {
        Self::average_ms(self.record_time, self.frames_rendered)
    }
}

/// Notification published by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunEvent {
    PhaseChanged { from: RunPhase, to: RunPhase },
    Progress(RunStats),
    Failed { kind: ErrorKind, message: String },
    Completed { bytes: usize, frames: u64 },
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub artifact: Artifact,
    pub stats: RunStats,
    /// Run was stopped before the source ended
    pub aborted: bool,
}
