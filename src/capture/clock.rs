use std::time::Duration;
use tokio::time::Instant;

/// Maps wall-clock time since playback start to a frame index.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    fps: f64,
    started: Option<Instant>,
}

impl PlaybackClock {
    pub fn new(fps: f64) -> Self {
        Self { fps, started: None }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.started.map(|s| s.elapsed())
    }

    /// Index of the frame that should be on screen now
    pub fn current_index(&self) -> Option<u64> {
        self.elapsed()
            .map(|elapsed| (elapsed.as_secs_f64() * self.fps).floor() as u64)
    }

    /// Presentation time of frame `index`
    pub fn timestamp_of(&self, index: u64) -> Duration {
        if self.fps > 0.0 {
            Duration::from_secs_f64(index as f64 / self.fps)
        } else {
            Duration::ZERO
        }
    }
}
