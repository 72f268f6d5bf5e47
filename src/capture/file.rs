//! FFmpeg-backed video file source
//!
//! Probes the file with ffprobe, then decodes to raw RGBA on an ffmpeg child
//! process. Decoding is paced by the playback clock: frames the clock has
//! already passed are read and discarded.

use super::{FramePoll, FrameSource, PlaybackClock};
use crate::error::SourceError;
use crate::frame::Frame;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

/// Raw RGBA frames read from a decoder pipe
struct Decoder<R> {
    reader: BufReader<R>,
    /// Decoder process, checked for its exit status at end of stream
    child: Option<Child>,
    frame_size: usize,
    next_index: u64,
}

impl<R: AsyncRead + Unpin> Decoder<R> {
    fn new(reader: R, child: Option<Child>, frame_size: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(frame_size.max(1) * 2, reader),
            child,
            frame_size,
            next_index: 0,
        }
    }

    /// Read the next raw frame. Returns `None` at end of stream.
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        let mut buffer = vec![0u8; self.frame_size];
        let mut filled = 0;
        while filled < self.frame_size {
            let n = self
                .reader
                .read(&mut buffer[filled..])
                .await
                .map_err(|e| SourceError::Decode(format!("Failed to read frame: {e}")))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == self.frame_size {
            return Ok(Some(buffer));
        }

        if let Some(child) = self.child.as_mut() {
            let status = child.wait().await?;
            if !status.success() {
                return Err(SourceError::Decode(format!(
                    "ffmpeg decoder exited with {:?}",
                    status.code()
                )));
            }
        }

        if filled > 0 {
            return Err(SourceError::Decode(format!(
                "Truncated frame {}: {} of {} bytes",
                self.next_index, filled, self.frame_size
            )));
        }
        Ok(None)
    }
}

/// Real-time playback over a decoder
struct Playback<R> {
    width: u32,
    height: u32,
    clock: PlaybackClock,
    decoder: Option<Decoder<R>>,
    last_emitted: Option<u64>,
}

impl<R: AsyncRead + Unpin> Playback<R> {
    fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            clock: PlaybackClock::new(fps),
            decoder: None,
            last_emitted: None,
        }
    }

    fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    fn begin(&mut self, decoder: Decoder<R>) {
        self.decoder = Some(decoder);
        self.last_emitted = None;
        self.clock.start();
    }

    async fn current_frame(&mut self) -> Result<FramePoll, SourceError> {
        let (Some(target), Some(decoder)) = (self.clock.current_index(), self.decoder.as_mut())
        else {
            return Ok(FramePoll::NotReady);
        };
        if self.last_emitted == Some(target) {
            return Ok(FramePoll::NotReady);
        }

        // Decode forward to the playback position, discarding passed frames
        let mut latest = None;
        while decoder.next_index <= target {
            match decoder.read_frame().await? {
                Some(data) => latest = Some((decoder.next_index, data)),
                None => {
                    self.decoder = None;
                    return Ok(FramePoll::EndOfStream);
                }
            }
            decoder.next_index += 1;
        }

        let Some((index, data)) = latest else {
            return Ok(FramePoll::NotReady);
        };
        self.last_emitted = Some(index);

        let frame = Frame::from_raw(
            index,
            self.clock.timestamp_of(index),
            self.width,
            self.height,
            data,
        )
        .ok_or_else(|| SourceError::Decode(format!("Frame {index} has wrong size")))?;

        Ok(FramePoll::Frame(frame))
    }
}

/// Video file played back in real time through an ffmpeg decoder
pub struct VideoFileSource {
    path: PathBuf,
    playback: Playback<ChildStdout>,
}

impl VideoFileSource {
    /// Probe a video file. Decoding starts with `FrameSource::start`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        which::which("ffprobe").map_err(|_| SourceError::FfprobeNotFound)?;

        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
            ])
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::Probe(format!("ffprobe failed: {}", stderr.trim())));
        }

        let (width, height, fps) = parse_stream_info(&output.stdout)?;

        tracing::info!(
            "Opened {}: {}x{} @ {:.3}fps",
            path.display(),
            width,
            height,
            fps
        );

        Ok(Self {
            path,
            playback: Playback::new(width, height, fps),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn spawn_decoder(&self) -> Result<Decoder<ChildStdout>, SourceError> {
        which::which("ffmpeg").map_err(|_| SourceError::FfmpegNotFound)?;

        // -s pins the output size so frames are exactly width * height * 4 bytes
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(&self.path)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgba", "-s"])
            .arg(format!("{}x{}", self.playback.width, self.playback.height))
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Decode("Failed to capture FFmpeg stdout".to_string()))?;

        Ok(Decoder::new(stdout, Some(child), self.playback.frame_size()))
    }
}

#[async_trait]
impl FrameSource for VideoFileSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.playback.width, self.playback.height)
    }

    fn frame_rate(&self) -> f64 {
        self.playback.clock.fps()
    }

    async fn start(&mut self) -> Result<(), SourceError> {
        let decoder = self.spawn_decoder()?;
        self.playback.begin(decoder);
        tracing::debug!("Decoder started for {}", self.path.display());
        Ok(())
    }

    async fn current_frame(&mut self) -> Result<FramePoll, SourceError> {
        self.playback.current_frame().await
    }
}

/// Extract width, height and frame rate of the first video stream
fn parse_stream_info(stdout: &[u8]) -> Result<(u32, u32, f64), SourceError> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| SourceError::Probe(format!("Invalid ffprobe output: {e}")))?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| SourceError::Probe("No video stream found".to_string()))?;

    // Zero dimensions are reported as-is; the orchestrator rejects them
    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);

    let rate = stream.r_frame_rate.as_deref().unwrap_or("");
    let fps = parse_frame_rate(rate)
        .ok_or_else(|| SourceError::Probe(format!("Invalid frame rate: {rate}")))?;

    Ok((width, height, fps))
}

/// Parse a frame rate such as "30", "30/1" or "30000/1001"
fn parse_frame_rate(value: &str) -> Option<f64> {
    let fps = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}
