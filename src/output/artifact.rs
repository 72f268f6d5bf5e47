use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Output container and codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Container {
    /// VP9 with alpha in WebM
    #[default]
    WebM,
    /// Lossless FFV1 with alpha in Matroska
    Matroska,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::WebM => "webm",
            Self::Matroska => "mkv",
        }
    }

    /// ffmpeg output arguments (codec, pixel format, muxer)
    pub fn ffmpeg_args(&self) -> &'static [&'static str] {
        match self {
            Self::WebM => &[
                "-c:v",
                "libvpx-vp9",
                "-pix_fmt",
                "yuva420p",
                "-auto-alt-ref",
                "0",
                "-f",
                "webm",
            ],
            Self::Matroska => &["-c:v", "ffv1", "-pix_fmt", "bgra", "-f", "matroska"],
        }
    }
}

/// Finished, fully flushed output of a run
#[derive(Debug, Clone)]
pub struct Artifact {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Number of frames encoded
    pub frames: u64,
    pub container: Container,
}

impl Artifact {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Media duration implied by frame count and rate
    pub fn duration(&self) -> Duration {
        if self.frame_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / self.frame_rate as f64)
    }

    /// `<basename>_nobg.<ext>` next to the input
    pub fn file_name_for(input: &Path, container: Container) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        input.with_file_name(format!("{stem}_nobg.{}", container.extension()))
    }
}
