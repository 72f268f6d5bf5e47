use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use nobg::capture::{FrameSource, VideoFileSource};
use nobg::output::{Artifact, Container, FfmpegRecorder, StreamRecorder, SurfaceRecorder};
use nobg::remote::{RemoteWorker, RemoteWorkerConfig};
use nobg::segmentation;
use nobg::{Orchestrator, PipelineConfig, RunEvent};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ContainerArg {
    /// VP9 with alpha
    Webm,
    /// Lossless FFV1 with alpha
    Mkv,
}

impl From<ContainerArg> for Container {
    fn from(arg: ContainerArg) -> Self {
        match arg {
            ContainerArg::Webm => Container::WebM,
            ContainerArg::Mkv => Container::Matroska,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input video file
    #[arg(short, long)]
    input: PathBuf,

    /// Output file (defaults to <input>_nobg.<ext> next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to segmentation model (ONNX file)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Foreground confidence threshold
    #[arg(long, default_value_t = nobg::config::DEFAULT_MASK_THRESHOLD)]
    threshold: f32,

    /// Output frames per second
    #[arg(long, default_value_t = nobg::config::DEFAULT_FRAME_RATE)]
    fps: u32,

    /// Output container
    #[arg(long, value_enum, default_value_t = ContainerArg::Webm)]
    container: ContainerArg,

    /// Record by sampling a render surface instead of pushing frames
    #[arg(long)]
    implicit_capture: bool,

    /// Treat segmentation calls slower than this as "no detection"
    #[arg(long)]
    segment_timeout_ms: Option<u64>,

    /// Upload to the remote worker instead of processing locally.
    /// Without a URL, NOBG_WORKER_URL or the default endpoint is used.
    #[arg(long, value_name = "URL")]
    remote: Option<Option<String>>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("nobg starting");
    tracing::info!("Input: {}", args.input.display());

    let config = PipelineConfig {
        mask_threshold: args.threshold,
        frame_rate: args.fps,
        segment_timeout: args.segment_timeout_ms.map(Duration::from_millis),
        ..Default::default()
    };
    config.validate().context("Invalid configuration")?;

    let size = tokio::fs::metadata(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?
        .len();
    if config.exceeds_soft_cap(size) {
        tracing::warn!(
            "Input is {} MB, processing may take a long time",
            size / (1024 * 1024)
        );
    }

    match &args.remote {
        Some(url) => run_remote(&args, url.clone()).await,
        None => run_local(&args, config).await,
    }
}

async fn run_remote(args: &Args, url: Option<String>) -> Result<()> {
    let mut worker_config = RemoteWorkerConfig::from_env();
    if let Some(url) = url {
        worker_config.endpoint = url;
    }

    let worker = RemoteWorker::new(worker_config).context("Failed to create worker client")?;
    tracing::info!("Processing remotely via {}", worker.endpoint());

    let data = worker
        .process(&args.input)
        .await
        .context("Remote processing failed")?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| RemoteWorker::output_name(&args.input));
    write_output(&output, &data).await
}

async fn run_local(args: &Args, config: PipelineConfig) -> Result<()> {
    let Some(model_path) = &args.model else {
        bail!("--model is required unless --remote is given");
    };
    let container = Container::from(args.container);

    let mut source = VideoFileSource::open(&args.input)
        .await
        .context("Failed to open input video")?;
    let (width, height) = source.dimensions();
    tracing::info!(
        "Source {}: {}x{} @ {:.2}fps",
        source.path().display(),
        width,
        height,
        source.frame_rate()
    );

    tracing::info!("Loading segmentation model from {}", model_path.display());
    let loader = segmentation::default_loader(model_path);

    let mut recorder: Box<dyn StreamRecorder> = if args.implicit_capture {
        tracing::info!("Recording via implicit surface capture");
        Box::new(SurfaceRecorder::new(Box::new(FfmpegRecorder::new(container))))
    } else {
        Box::new(FfmpegRecorder::new(container))
    };

    let mut orchestrator = Orchestrator::new(config);
    let mut events = orchestrator.subscribe();
    let logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let RunEvent::Progress(stats) = &event {
                tracing::debug!(
                    "Progress: {} rendered, {} skipped, {} dropped",
                    stats.frames_rendered,
                    stats.frames_skipped,
                    stats.frames_dropped
                );
            }
            if let Ok(json) = serde_json::to_string(&event) {
                tracing::debug!("Event: {}", json);
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, finalizing recording");
            on_ctrl_c.cancel();
        }
    });

    tracing::info!("Press Ctrl+C to stop early");
    let report = orchestrator
        .run(&mut source, &loader, recorder.as_mut(), cancel)
        .await
        .context("Background removal failed")?;
    let _ = logger.await;

    let stats = &report.stats;
    tracing::info!(
        "Processed {} frames ({} reused mask, {} segmentation failures), {:.1}s of video",
        stats.frames_rendered,
        stats.mask_reuses,
        stats.segmentation_failures,
        report.artifact.duration().as_secs_f64()
    );

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| Artifact::file_name_for(&args.input, container));
    write_output(&output, &report.artifact.data).await
}

async fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Wrote {} ({} bytes)", path.display(), data.len());
    Ok(())
}
