//! Frame-synchronous video background removal
//!
//! A source video is played back in real time; each frame is segmented, the
//! background is made fully transparent and the result is recorded into a
//! single video artifact.

pub mod capture;
pub mod compositing;
pub mod config;
pub mod error;
pub mod frame;
pub mod output;
pub mod pipeline;
pub mod remote;
pub mod segmentation;

#[cfg(test)]
mod testing;

pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError};
pub use frame::{Frame, OutputFrame};
pub use pipeline::{Orchestrator, RunEvent, RunPhase, RunReport, RunStats};
