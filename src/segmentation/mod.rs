mod preprocess;
mod rvm;
pub mod types;

pub use preprocess::Preprocessor;
pub use rvm::{OnnxModelLoader, RobustVideoMatting};
pub use types::{ModelLoader, Region, SegmentationAdapter, SegmentationResult};

use std::path::Path;

/// Create the default model loader (RVM)
pub fn default_loader(model_path: impl AsRef<Path>) -> OnnxModelLoader {
    OnnxModelLoader::new(model_path.as_ref())
}
