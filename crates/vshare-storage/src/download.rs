//! Streaming download of signed URLs.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Fetches a source object to local disk.
#[async_trait]
pub trait SourceDownloader: Send + Sync {
    /// Stream `url` into `dest`, returning the number of bytes written.
    async fn download_to_file(&self, url: &str, dest: &Path) -> StorageResult<u64>;
}

/// [`SourceDownloader`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpDownloader {
    /// Create a downloader whose whole transfer is bounded by `timeout`.
    pub fn new(timeout: Duration) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StorageError::config_error(e.to_string()))?;
        Ok(Self { http, timeout })
    }

    async fn stream_to_file(&self, url: &str, dest: &Path) -> StorageResult<u64> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::download_failed(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::download_failed(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written == 0 {
            return Err(StorageError::download_failed("response had no body"));
        }

        Ok(written)
    }
}

#[async_trait]
impl SourceDownloader for HttpDownloader {
    async fn download_to_file(&self, url: &str, dest: &Path) -> StorageResult<u64> {
        debug!("Downloading source to {}", dest.display());

        let written = tokio::time::timeout(self.timeout, self.stream_to_file(url, dest))
            .await
            .map_err(|_| StorageError::Timeout(self.timeout.as_secs()))??;

        info!(
            path = %dest.display(),
            size_mb = written as f64 / 1_048_576.0,
            "Downloaded source video"
        );
        Ok(written)
    }
}
