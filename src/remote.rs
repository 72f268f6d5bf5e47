//! Client for the remote background-removal worker
//!
//! A single request/response exchange: the source video is uploaded as
//! multipart field `video` and the response body is the finished artifact.

use crate::error::RemoteError;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_WORKER_URL: &str = "http://localhost:8080/process";

/// Configuration for the remote worker client.
#[derive(Debug, Clone)]
pub struct RemoteWorkerConfig {
    /// Full URL of the processing endpoint
    pub endpoint: String,
    /// Request timeout, covering upload and processing
    pub timeout: Duration,
}

impl Default for RemoteWorkerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_WORKER_URL.to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

impl RemoteWorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("NOBG_WORKER_URL")
                .unwrap_or_else(|_| DEFAULT_WORKER_URL.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct WorkerErrorBody {
    error: String,
}

/// Uploads a video and returns the processed result.
pub struct RemoteWorker {
    http: Client,
    config: RemoteWorkerConfig,
}

impl RemoteWorker {
    pub fn new(config: RemoteWorkerConfig) -> Result<Self, RemoteError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Upload `path` and wait for the processed video.
    pub async fn process(&self, path: &Path) -> Result<Bytes, RemoteError> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());

        tracing::info!(
            "Uploading {} ({} bytes) to {}",
            file_name,
            data.len(),
            self.config.endpoint
        );

        let part = Part::bytes(data).file_name(file_name);
        let form = Form::new().part("video", part);

        let response = self
            .http
            .post(&self.config.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let message = serde_json::from_slice::<WorkerErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| format!("Worker error: {}", status.as_u16()));
            tracing::warn!("Remote worker failed: {}", message);
            return Err(RemoteError::Worker(message));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(RemoteError::EmptyResponse);
        }
        tracing::info!("Remote worker returned {} bytes", body.len());
        Ok(body)
    }

    /// `<basename>_ai_nobg.mp4` next to the input
    pub fn output_name(input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        input.with_file_name(format!("{stem}_ai_nobg.mp4"))
    }
}
