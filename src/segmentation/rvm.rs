use super::preprocess::Preprocessor;
use super::types::{ModelLoader, Region, SegmentationAdapter, SegmentationResult};
use crate::error::SegmentationError;
use crate::frame::Frame;
use anyhow::{Context, Result};
use async_trait::async_trait;
use image::RgbaImage;
use ndarray::{Array1, ArrayD, IxDyn};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Session and recurrent state, guarded together so inference can run on the
/// blocking pool.
struct RvmState {
    session: Session,
    preprocessor: Preprocessor,
    downsample_ratio: f32,

    // Recurrent hidden states
    // These are updated after each inference and fed back in the next frame
    recurrent: Option<[ArrayD<f32>; 4]>,
}

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
pub struct RobustVideoMatting {
    state: Arc<Mutex<RvmState>>,
    width: u32,
    height: u32,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX file
    ///
    /// # Default Configuration
    /// - Input size: 512x512 (can be adjusted for performance/quality tradeoff)
    /// - Downsample ratio: 0.25
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        // Default to 512x512 input (good balance of quality and performance)
        let width = 512;
        let height = 512;

        let state = RvmState {
            session,
            preprocessor: Preprocessor::new(width, height),
            downsample_ratio: 0.25,
            recurrent: None,
        };

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            width,
            height,
        })
    }

    /// Get the model's input dimensions (width, height)
    pub fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl RvmState {
    /// RVM starts from zero-filled 1x1x1x1 recurrent states
    fn initial_states() -> [ArrayD<f32>; 4] {
        std::array::from_fn(|_| ArrayD::zeros(IxDyn(&[1, 1, 1, 1])))
    }

    fn infer(&mut self, frame: &RgbaImage) -> Result<Vec<f32>> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let [r1, r2, r3, r4] = self.recurrent.take().unwrap_or_else(Self::initial_states);

        let src = Tensor::from_array(self.preprocessor.preprocess(frame))?;
        let ratio = Tensor::from_array(Array1::from_elem(1, self.downsample_ratio))?;

        let infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![
                "src" => src,
                "r1i" => Tensor::from_array(r1)?,
                "r2i" => Tensor::from_array(r2)?,
                "r3i" => Tensor::from_array(r3)?,
                "r4i" => Tensor::from_array(r4)?,
                "downsample_ratio" => ratio,
            ])
            .context("Failed to run inference")?;
        drop(infer_span);

        // Outputs: fgr (foreground), pha (alpha), r1o..r4o
        // We only need pha (the matte) and the updated hidden states
        let (shape, pha) = outputs["pha"].try_extract_tensor::<f32>()?;
        anyhow::ensure!(shape.len() == 4, "unexpected matte rank {}", shape.len());
        let matte_height = shape[2] as u32;
        let matte_width = shape[3] as u32;
        let matte = pha.to_vec();

        let mut next = Vec::with_capacity(4);
        for name in ["r1o", "r2o", "r3o", "r4o"] {
            next.push(outputs[name].try_extract_array::<f32>()?.to_owned());
        }
        self.recurrent = next.try_into().ok();

        let (frame_width, frame_height) = frame.dimensions();
        Preprocessor::postprocess_matte(&matte, matte_width, matte_height, frame_width, frame_height)
    }
}

#[async_trait]
impl SegmentationAdapter for RobustVideoMatting {
    async fn segment(&mut self, frame: &Frame) -> Result<SegmentationResult, SegmentationError> {
        let state = Arc::clone(&self.state);
        let image = frame.image.clone();

        let matte = tokio::task::spawn_blocking(move || {
            let mut state = state
                .lock()
                .map_err(|_| anyhow::anyhow!("RVM state lock poisoned"))?;
            state.infer(&image)
        })
        .await
        .map_err(|e| SegmentationError::Inference(format!("inference task failed: {e}")))?
        .map_err(|e| SegmentationError::Inference(format!("{e:#}")))?;

        let (width, height) = frame.dimensions();
        let region = Region::new(width, height, matte)
            .map_err(|e| SegmentationError::InvalidOutput(e.to_string()))?;
        Ok(SegmentationResult::single(region))
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        if let Ok(mut state) = self.state.lock() {
            state.recurrent = None;
        }
    }

    fn name(&self) -> &str {
        "rvm"
    }
}

/// Loads an RVM model from an ONNX file
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    path: PathBuf,
}

impl OnnxModelLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ModelLoader for OnnxModelLoader {
    async fn load(&self) -> Result<Box<dyn SegmentationAdapter>, SegmentationError> {
        let path = self.path.clone();
        let model = tokio::task::spawn_blocking(move || RobustVideoMatting::new(path))
            .await
            .map_err(|e| SegmentationError::ModelLoad(format!("loader task failed: {e}")))?
            .map_err(|e| SegmentationError::ModelLoad(format!("{e:#}")))?;

        let (width, height) = model.input_size();
        tracing::info!("RVM input size {}x{}", width, height);
        Ok(Box::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_model_is_load_failure() {
        let loader = OnnxModelLoader::new("/nonexistent/rvm.onnx");
        match loader.load().await {
            Err(SegmentationError::ModelLoad(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("loading a missing model should fail"),
        }
    }
}
