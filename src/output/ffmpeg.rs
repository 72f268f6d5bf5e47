//! Streaming encoder backed by an ffmpeg child process
//!
//! Raw RGBA frames go in on stdin, the encoded container comes out on stdout
//! and is buffered as chunks in arrival order until `stop`. Frames are laid
//! on the constant-rate output timeline by their timestamps.

use super::timeline::{Placement, SlotTimeline};
use super::{check_frame_size, Artifact, Container, RecordingSpec, StreamRecorder};
use crate::error::RecorderError;
use crate::frame::OutputFrame;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

const CHUNK_CAPACITY: usize = 64 * 1024;

struct EncoderSession {
    spec: RecordingSpec,
    child: Child,
    stdin: Option<ChildStdin>,
    chunks: JoinHandle<io::Result<Vec<Bytes>>>,
    stderr: JoinHandle<String>,
    timeline: SlotTimeline,
    /// Last written frame, repeated to fill timeline gaps
    last: Option<OutputFrame>,
    frames: u64,
}

/// Records output frames into a single encoded container via ffmpeg
pub struct FfmpegRecorder {
    container: Container,
    session: Option<EncoderSession>,
}

impl FfmpegRecorder {
    pub fn new(container: Container) -> Self {
        Self {
            container,
            session: None,
        }
    }

    fn build_args(&self, spec: &RecordingSpec) -> Vec<String> {
        let mut args: Vec<String> = [
            "-v", "error", "-f", "rawvideo", "-pix_fmt", "rgba", "-s",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(format!("{}x{}", spec.width, spec.height));
        args.push("-framerate".to_string());
        args.push(spec.frame_rate.to_string());
        args.extend(["-i", "-", "-an"].iter().map(|s| s.to_string()));
        args.extend(self.container.ffmpeg_args().iter().map(|s| s.to_string()));
        args.push("-".to_string());
        args
    }
}

impl Default for FfmpegRecorder {
    fn default() -> Self {
        Self::new(Container::default())
    }
}

#[async_trait]
impl StreamRecorder for FfmpegRecorder {
    async fn start(&mut self, spec: RecordingSpec) -> Result<(), RecorderError> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyStarted);
        }
        which::which("ffmpeg").map_err(|_| RecorderError::FfmpegNotFound)?;

        let args = self.build_args(&spec);
        tracing::debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecorderError::Capture("Failed to capture FFmpeg stdout".to_string()))?;
        let stderr = child.stderr.take();

        let chunks = collect_chunks(stdout);
        let stderr = tokio::spawn(async move {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text).await;
            }
            text
        });

        tracing::info!(
            "Encoder started: {}x{} @ {}fps ({})",
            spec.width,
            spec.height,
            spec.frame_rate,
            self.container.extension()
        );

        self.session = Some(EncoderSession {
            spec,
            child,
            stdin,
            chunks,
            stderr,
            timeline: SlotTimeline::new(spec.frame_rate),
            last: None,
            frames: 0,
        });
        Ok(())
    }

    async fn push(&mut self, frame: &OutputFrame) -> Result<(), RecorderError> {
        let session = self.session.as_mut().ok_or(RecorderError::NotStarted)?;
        check_frame_size(&session.spec, frame)?;

        let stdin = session.stdin.as_mut().ok_or(RecorderError::NotStarted)?;
        let Placement::Placed { slot, repeats } = session.timeline.place(frame.timestamp()) else {
            tracing::trace!("Frame {} shares an output slot, dropped", frame.index());
            return Ok(());
        };

        if let Some(last) = &session.last {
            for _ in 0..repeats {
                stdin.write_all(last.as_bytes()).await?;
            }
            session.frames += repeats;
        }
        stdin.write_all(frame.as_bytes()).await?;
        session.frames += 1;
        session.last = Some(frame.clone());

        tracing::trace!("Frame {} -> slot {} ({} repeats)", frame.index(), slot, repeats);
        Ok(())
    }

    async fn stop(&mut self) -> Result<Artifact, RecorderError> {
        let mut session = self.session.take().ok_or(RecorderError::NotStarted)?;

        // Closing stdin lets ffmpeg flush and finish the container
        if let Some(mut stdin) = session.stdin.take() {
            stdin.shutdown().await?;
        }

        let chunks = session
            .chunks
            .await
            .map_err(|e| RecorderError::Capture(format!("chunk collector failed: {e}")))??;
        let status = session.child.wait().await?;
        let stderr = session.stderr.await.unwrap_or_default();

        if !status.success() {
            let message = if stderr.trim().is_empty() {
                "FFmpeg exited with non-zero status".to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(RecorderError::EncoderFailed {
                message,
                exit_code: status.code(),
            });
        }

        let data = concat_chunks(chunks);
        if data.is_empty() {
            return Err(RecorderError::EmptyArtifact);
        }

        tracing::info!(
            "Encoder finished: {} frames, {} bytes",
            session.frames,
            data.len()
        );

        Ok(Artifact {
            data,
            width: session.spec.width,
            height: session.spec.height,
            frame_rate: session.spec.frame_rate,
            frames: session.frames,
            container: self.container,
        })
    }
}

/// Read `reader` to EOF, keeping chunks in arrival order
pub(crate) fn collect_chunks<R>(mut reader: R) -> JoinHandle<io::Result<Vec<Bytes>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunks = Vec::new();
        loop {
            let mut buf = BytesMut::with_capacity(CHUNK_CAPACITY);
            if reader.read_buf(&mut buf).await? == 0 {
                break;
            }
            chunks.push(buf.freeze());
        }
        Ok(chunks)
    })
}

/// Join chunks into one contiguous buffer
pub(crate) fn concat_chunks(chunks: Vec<Bytes>) -> Bytes {
    if chunks.len() == 1 {
        return chunks.into_iter().next().unwrap_or_default();
    }
    let total = chunks.iter().map(Bytes::len).sum();
    let mut data = BytesMut::with_capacity(total);
    for chunk in chunks {
        data.extend_from_slice(&chunk);
    }
    data.freeze()
}
