use crate::error::{CompositeError, SegmentationError};
use crate::frame::Frame;
use async_trait::async_trait;

/// Foreground confidence for one detected subject.
///
/// Values are in [0, 1], row-major. The map may be coarser than the frame it
/// was computed from; it is sampled nearest-neighbour onto frame pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub width: u32,
    pub height: u32,
    pub confidence: Vec<f32>,
}

impl Region {
    pub fn new(width: u32, height: u32, confidence: Vec<f32>) -> Result<Self, CompositeError> {
        let region = Self {
            width,
            height,
            confidence,
        };
        region.check()?;
        Ok(region)
    }

    /// A region with the same confidence everywhere
    pub fn uniform(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            confidence: vec![value; width as usize * height as usize],
        }
    }

    /// Confirm the confidence map matches the declared size
    pub fn check(&self) -> Result<(), CompositeError> {
        if self.width == 0 || self.height == 0 {
            return Err(CompositeError::EmptyRegion);
        }
        let expected = self.width as usize * self.height as usize;
        if self.confidence.len() != expected {
            return Err(CompositeError::RegionSizeMismatch {
                expected,
                actual: self.confidence.len(),
            });
        }
        Ok(())
    }

    /// Confidence at frame pixel (x, y) for a frame of `frame_width` x `frame_height`
    pub fn confidence_at(&self, x: u32, y: u32, frame_width: u32, frame_height: u32) -> f32 {
        let rx = if self.width == frame_width {
            x
        } else {
            ((x as u64 * self.width as u64) / frame_width as u64) as u32
        };
        let ry = if self.height == frame_height {
            y
        } else {
            ((y as u64 * self.height as u64) / frame_height as u64) as u32
        };
        self.confidence[(ry * self.width + rx) as usize]
    }
}

/// Output of one segmentation call. Empty means "no detection this step".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentationResult {
    pub regions: Vec<Region>,
}

impl SegmentationResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(region: Region) -> Self {
        Self {
            regions: vec![region],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Trait for segmentation backends
/// Allows swapping between different models (RVM, MODNet, MediaPipe, etc.)
#[async_trait]
pub trait SegmentationAdapter: Send {
    /// Segment a frame into foreground regions
    ///
    /// Latency is variable. Errors are per-frame and do not end the run.
    async fn segment(&mut self, frame: &Frame) -> Result<SegmentationResult, SegmentationError>;

    /// Reset internal state (for models with temporal/recurrent components)
    ///
    /// Called once at the start of every run.
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless models
    }

    /// Human-readable backend name for logs
    fn name(&self) -> &str;
}

/// Produces a ready-to-use segmentation adapter
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Box<dyn SegmentationAdapter>, SegmentationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_validation() {
        assert!(Region::new(2, 2, vec![0.0; 4]).is_ok());
        assert_eq!(
            Region::new(2, 2, vec![0.0; 3]),
            Err(CompositeError::RegionSizeMismatch {
                expected: 4,
                actual: 3
            })
        );
        assert_eq!(Region::new(0, 2, vec![]), Err(CompositeError::EmptyRegion));
    }

    #[test]
    fn test_coarse_region_sampling() {
        // 2x2 map over a 4x4 frame: each cell covers a 2x2 block
        let region = Region::new(2, 2, vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(region.confidence_at(0, 0, 4, 4), 0.1);
        assert_eq!(region.confidence_at(1, 1, 4, 4), 0.1);
        assert_eq!(region.confidence_at(3, 0, 4, 4), 0.2);
        assert_eq!(region.confidence_at(0, 3, 4, 4), 0.3);
        assert_eq!(region.confidence_at(3, 3, 4, 4), 0.4);
    }
}
