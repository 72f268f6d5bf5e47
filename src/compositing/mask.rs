use crate::error::CompositeError;
use crate::segmentation::SegmentationResult;

/// Per-pixel binary foreground decision for one frame, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    foreground: Vec<bool>,
}

impl Mask {
    /// Build a mask by thresholding a segmentation result.
    ///
    /// A pixel is foreground when any region reports confidence `>= threshold`.
    /// Returns `Ok(None)` for an empty result.
    pub fn from_result(
        result: &SegmentationResult,
        width: u32,
        height: u32,
        threshold: f32,
    ) -> Result<Option<Self>, CompositeError> {
        if result.is_empty() {
            return Ok(None);
        }
        for region in &result.regions {
            region.check()?;
        }

        let mut foreground = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                foreground.push(
                    result
                        .regions
                        .iter()
                        .any(|r| r.confidence_at(x, y, width, height) >= threshold),
                );
            }
        }

        Ok(Some(Self {
            width,
            height,
            foreground,
        }))
    }

    /// Build a mask from explicit per-pixel decisions
    pub fn from_decisions(
        width: u32,
        height: u32,
        foreground: Vec<bool>,
    ) -> Result<Self, CompositeError> {
        let expected = width as usize * height as usize;
        if foreground.len() != expected {
            return Err(CompositeError::RegionSizeMismatch {
                expected,
                actual: foreground.len(),
            });
        }
        Ok(Self {
            width,
            height,
            foreground,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.foreground[(y * self.width + x) as usize]
    }

    pub fn foreground_count(&self) -> usize {
        self.foreground.iter().filter(|f| **f).count()
    }

    /// Row-major decisions
    pub fn decisions(&self) -> &[bool] {
        &self.foreground
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::Region;

    #[test]
    fn test_empty_result_has_no_mask() {
        let mask = Mask::from_result(&SegmentationResult::empty(), 4, 4, 0.6).unwrap();
        assert!(mask.is_none());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let region = Region::new(3, 1, vec![0.59, 0.6, 0.61]).unwrap();
        let mask = Mask::from_result(&SegmentationResult::single(region), 3, 1, 0.6)
            .unwrap()
            .unwrap();
        assert_eq!(mask.decisions(), &[false, true, true]);
    }

    #[test]
    fn test_nan_confidence_is_background() {
        let region = Region::new(2, 1, vec![f32::NAN, 1.0]).unwrap();
        let mask = Mask::from_result(&SegmentationResult::single(region), 2, 1, 0.6)
            .unwrap()
            .unwrap();
        assert_eq!(mask.decisions(), &[false, true]);
    }

    #[test]
    fn test_regions_are_unioned() {
        let left = Region::new(2, 1, vec![0.9, 0.0]).unwrap();
        let right = Region::new(2, 1, vec![0.0, 0.7]).unwrap();
        let result = SegmentationResult {
            regions: vec![left, right],
        };
        let mask = Mask::from_result(&result, 2, 1, 0.6).unwrap().unwrap();
        assert_eq!(mask.foreground_count(), 2);
    }

    #[test]
    fn test_coarse_region_maps_to_frame_size() {
        let region = Region::new(2, 2, vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        let mask = Mask::from_result(&SegmentationResult::single(region), 4, 4, 0.6)
            .unwrap()
            .unwrap();
        assert_eq!(mask.dimensions(), (4, 4));
        assert_eq!(mask.foreground_count(), 4);
        assert!(mask.is_foreground(1, 1));
        assert!(!mask.is_foreground(2, 0));
    }

    #[test]
    fn test_malformed_region_is_error() {
        let region = Region {
            width: 2,
            height: 2,
            confidence: vec![1.0],
        };
        let err = Mask::from_result(&SegmentationResult::single(region), 2, 2, 0.6).unwrap_err();
        assert_eq!(
            err,
            CompositeError::RegionSizeMismatch {
                expected: 4,
                actual: 1
            }
        );
    }
}
