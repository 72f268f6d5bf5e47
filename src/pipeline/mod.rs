//! Frame-synchronous background removal pipeline

mod orchestrator;
pub mod state;

pub use orchestrator::Orchestrator;
pub use state::{RunEvent, RunPhase, RunReport, RunStats};
