//! Fixed-rate output timeline
//!
//! Recorders encode at a constant frame rate while rendered frames arrive at
//! their source presentation times. Each frame is assigned the output slot
//! `floor(timestamp * frame_rate)`; slots left empty between two frames are
//! filled by repeating the earlier frame, and a frame landing in a slot that
//! is already filled is dropped.

use std::time::Duration;

// Timestamps are truncated to whole nanoseconds, so `k / fps` can land a hair
// below its slot boundary.
const SLOT_EPSILON: f64 = 1e-6;

/// Where a pushed frame lands on the output timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Slot already filled by an earlier frame
    Dropped,
    /// Emit the previous frame `repeats` more times, then this frame
    Placed { slot: u64, repeats: u64 },
}

#[derive(Debug, Clone)]
pub(crate) struct SlotTimeline {
    frame_rate: u32,
    next_slot: Option<u64>,
}

impl SlotTimeline {
    pub(crate) fn new(frame_rate: u32) -> Self {
        Self {
            frame_rate,
            next_slot: None,
        }
    }

    pub(crate) fn slot_of(&self, timestamp: Duration) -> u64 {
        (timestamp.as_secs_f64() * self.frame_rate as f64 + SLOT_EPSILON).floor() as u64
    }

    /// Output starts at the first placed frame's slot
    pub(crate) fn place(&mut self, timestamp: Duration) -> Placement {
        let slot = self.slot_of(timestamp);
        let repeats = match self.next_slot {
            None => 0,
            Some(next) if slot < next => return Placement::Dropped,
            Some(next) => slot - next,
        };
        self.next_slot = Some(slot + 1);
        Placement::Placed { slot, repeats }
    }

    /// Frame period of the output
    pub(crate) fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(index: u64, fps: f64) -> Duration {
        Duration::from_secs_f64(index as f64 / fps)
    }

    #[test]
    fn test_same_rate_is_one_to_one() {
        let mut timeline = SlotTimeline::new(30);
        for i in 0..90 {
            assert_eq!(
                timeline.place(at(i, 30.0)),
                Placement::Placed { slot: i, repeats: 0 }
            );
        }
    }

    #[test]
    fn test_faster_source_drops_colliding_frames() {
        let mut timeline = SlotTimeline::new(30);
        let placed = (0..60)
            .filter(|i| timeline.place(at(*i, 60.0)) != Placement::Dropped)
            .count();
        assert_eq!(placed, 30);
    }

    #[test]
    fn test_gaps_are_filled_by_repeats() {
        let mut timeline = SlotTimeline::new(30);
        assert_eq!(
            timeline.place(at(0, 30.0)),
            Placement::Placed { slot: 0, repeats: 0 }
        );
        // Frames 1..=3 were dropped upstream
        assert_eq!(
            timeline.place(at(4, 30.0)),
            Placement::Placed { slot: 4, repeats: 3 }
        );
        assert_eq!(timeline.place(at(4, 30.0)), Placement::Dropped);
    }

    #[test]
    fn test_starts_at_first_frame() {
        let mut timeline = SlotTimeline::new(30);
        assert_eq!(
            timeline.place(at(12, 30.0)),
            Placement::Placed { slot: 12, repeats: 0 }
        );
        assert_eq!(
            timeline.place(at(13, 30.0)),
            Placement::Placed { slot: 13, repeats: 0 }
        );
    }

    #[test]
    fn test_slower_source_repeats_frames() {
        // 24fps into 30fps: 24 frames cover 30 output slots
        let mut timeline = SlotTimeline::new(30);
        let mut slots = 0;
        let mut last = 0;
        for i in 0..24 {
            if let Placement::Placed { slot, repeats } = timeline.place(at(i, 24.0)) {
                slots += repeats + 1;
                last = slot;
            }
        }
        assert_eq!(last, 28);
        assert_eq!(slots, 29);
    }
}
