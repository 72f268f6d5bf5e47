//! Mask derivation, mask caching and alpha compositing

mod cache;
mod compositor;
mod mask;

pub use cache::MaskCache;
pub use compositor::{composite, MaskCompositor, MaskSource, SkipReason, StepOutcome};
pub use mask::Mask;
