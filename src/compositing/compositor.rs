use super::cache::MaskCache;
use super::mask::Mask;
use crate::error::CompositeError;
use crate::frame::{Frame, OutputFrame};
use crate::segmentation::SegmentationResult;

/// Where the mask applied to an output frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskSource {
    /// Derived from this step's segmentation result
    Fresh,
    /// Reused from the cache because this step detected nothing
    Cached,
}

/// Why a step produced no output frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing detected and no mask has been produced yet this run
    NoMaskYet,
    /// Mask derivation or compositing failed for this frame
    Failed(CompositeError),
}

#[derive(Debug)]
pub enum StepOutcome {
    Composited {
        frame: OutputFrame,
        source: MaskSource,
    },
    Skipped(SkipReason),
}

/// Turns segmentation output into binary masks and applies them to frames.
///
/// Owns the run's `MaskCache`.
#[derive(Debug)]
pub struct MaskCompositor {
    threshold: f32,
    cache: MaskCache,
}

impl MaskCompositor {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            cache: MaskCache::new(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn cache(&self) -> &MaskCache {
        &self.cache
    }

    /// Process one step.
    ///
    /// A non-empty result replaces the cached mask. An empty result reuses the
    /// cached mask unchanged, or skips the frame if there is none. Failures
    /// skip the frame and leave the cache untouched.
    pub fn process(&mut self, frame: Frame, result: &SegmentationResult) -> StepOutcome {
        let (width, height) = frame.dimensions();

        let source = match Mask::from_result(result, width, height, self.threshold) {
            Ok(Some(mask)) => {
                self.cache.store(mask);
                MaskSource::Fresh
            }
            Ok(None) if self.cache.is_empty() => {
                return StepOutcome::Skipped(SkipReason::NoMaskYet);
            }
            Ok(None) => MaskSource::Cached,
            Err(e) => return StepOutcome::Skipped(SkipReason::Failed(e)),
        };

        let Some(mask) = self.cache.latest() else {
            return StepOutcome::Skipped(SkipReason::NoMaskYet);
        };

        match composite(frame, mask) {
            Ok(frame) => StepOutcome::Composited { frame, source },
            Err(e) => StepOutcome::Skipped(SkipReason::Failed(e)),
        }
    }
}

/// Replace the frame's alpha with the mask decision: 255 for foreground,
/// 0 for background. RGB is left untouched, no feathering at edges.
pub fn composite(frame: Frame, mask: &Mask) -> Result<OutputFrame, CompositeError> {
    let (frame_width, frame_height) = frame.dimensions();
    let (mask_width, mask_height) = mask.dimensions();
    if (frame_width, frame_height) != (mask_width, mask_height) {
        return Err(CompositeError::DimensionMismatch {
            mask_width,
            mask_height,
            frame_width,
            frame_height,
        });
    }

    let Frame {
        index,
        timestamp,
        mut image,
    } = frame;

    for (pixel, foreground) in image.pixels_mut().zip(mask.decisions()) {
        pixel[3] = if *foreground { 255 } else { 0 };
    }

    Ok(OutputFrame::new(index, timestamp, image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::Region;
    use image::{Rgba, RgbaImage};
    use std::time::Duration;

    fn frame(index: u64, width: u32, height: u32) -> Frame {
        let image = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([x as u8, y as u8, index as u8, 128])
        });
        Frame::new(index, Duration::from_millis(index * 33), image)
    }

    fn square(size: u32, side: u32, confidence: f32) -> SegmentationResult {
        let mut values = vec![0.0; (size * size) as usize];
        for y in 0..side {
            for x in 0..side {
                values[(y * size + x) as usize] = confidence;
            }
        }
        SegmentationResult::single(Region::new(size, size, values).unwrap())
    }

    fn alpha(frame: &OutputFrame) -> Vec<u8> {
        frame.image().pixels().map(|p| p[3]).collect()
    }

    #[test]
    fn test_alpha_is_binary_and_rgb_untouched() {
        let mut compositor = MaskCompositor::new(0.6);
        let region = Region::new(4, 1, vec![0.0, 0.3, 0.6, 0.95]).unwrap();
        let input = frame(0, 4, 1);
        let original = input.image.clone();

        let StepOutcome::Composited { frame: out, source } =
            compositor.process(input, &SegmentationResult::single(region))
        else {
            panic!("expected composited frame");
        };

        assert_eq!(source, MaskSource::Fresh);
        assert_eq!(alpha(&out), vec![0, 0, 255, 255]);
        for (a, b) in out.image().pixels().zip(original.pixels()) {
            assert_eq!(a.0[..3], b.0[..3]);
        }
    }

    #[test]
    fn test_no_mask_yet_skips() {
        let mut compositor = MaskCompositor::new(0.6);
        let outcome = compositor.process(frame(0, 8, 8), &SegmentationResult::empty());
        assert!(matches!(
            outcome,
            StepOutcome::Skipped(SkipReason::NoMaskYet)
        ));
        assert!(compositor.cache().is_empty());
    }

    #[test]
    fn test_mask_freeze_across_empty_steps() {
        // 3-frame clip: frame 1 detects a 10x10 top-left square, frames 2 and 3
        // detect nothing and must reuse frame 1's mask exactly.
        let mut compositor = MaskCompositor::new(0.6);
        let mut outputs = Vec::new();

        let results = [square(32, 10, 1.0), SegmentationResult::empty(), SegmentationResult::empty()];
        for (i, result) in results.iter().enumerate() {
            match compositor.process(frame(i as u64, 32, 32), result) {
                StepOutcome::Composited { frame, source } => outputs.push((frame, source)),
                StepOutcome::Skipped(reason) => panic!("frame {i} skipped: {reason:?}"),
            }
        }

        assert_eq!(outputs[0].1, MaskSource::Fresh);
        assert_eq!(outputs[1].1, MaskSource::Cached);
        assert_eq!(outputs[2].1, MaskSource::Cached);

        let first = alpha(&outputs[0].0);
        assert_eq!(first.iter().filter(|a| **a == 255).count(), 100);
        assert_eq!(alpha(&outputs[1].0), first);
        assert_eq!(alpha(&outputs[2].0), first);

        for (x, y) in [(0, 0), (9, 9), (9, 0)] {
            assert_eq!(outputs[2].0.image().get_pixel(x, y)[3], 255);
        }
        assert_eq!(outputs[2].0.image().get_pixel(10, 0)[3], 0);
        assert_eq!(outputs[2].0.image().get_pixel(0, 10)[3], 0);
    }

    #[test]
    fn test_fresh_result_overwrites_cache() {
        let mut compositor = MaskCompositor::new(0.6);
        compositor.process(frame(0, 16, 16), &square(16, 4, 1.0));
        compositor.process(frame(1, 16, 16), &square(16, 8, 1.0));

        let cached = compositor.cache().latest().unwrap();
        assert_eq!(cached.foreground_count(), 64);
    }

    #[test]
    fn test_failure_skips_and_keeps_cache() {
        let mut compositor = MaskCompositor::new(0.6);
        compositor.process(frame(0, 16, 16), &square(16, 4, 1.0));

        let broken = SegmentationResult::single(Region {
            width: 16,
            height: 16,
            confidence: vec![1.0; 3],
        });
        let outcome = compositor.process(frame(1, 16, 16), &broken);
        assert!(matches!(outcome, StepOutcome::Skipped(SkipReason::Failed(_))));
        assert_eq!(compositor.cache().latest().unwrap().foreground_count(), 16);
    }

    #[test]
    fn test_cached_mask_of_wrong_size_is_skipped() {
        let mut compositor = MaskCompositor::new(0.6);
        compositor.process(frame(0, 16, 16), &square(16, 4, 1.0));

        let outcome = compositor.process(frame(1, 8, 8), &SegmentationResult::empty());
        let StepOutcome::Skipped(reason) = outcome else {
            panic!("expected skipped frame");
        };
        assert!(matches!(
            reason,
            SkipReason::Failed(CompositeError::DimensionMismatch { .. })
        ));

        // Skip reasons are plain values that can be kept for reporting
        let kept = reason.clone();
        assert_eq!(kept, reason);
    }
}
