//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vshare_media::{FrameOptions, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_WIDTH};
use vshare_models::THUMBNAIL_POSITIONS;
use vshare_storage::DEFAULT_UPLOAD_TIMEOUT;

use crate::error::WorkerError;

/// What to do when the duration probe fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeFailurePolicy {
    /// Continue with a fixed fallback duration.
    #[default]
    Fallback,
    /// Fail the attempt so the job is retried.
    Abort,
}

impl FromStr for ProbeFailurePolicy {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(Self::Fallback),
            "abort" => Ok(Self::Abort),
            other => Err(WorkerError::config_error(format!(
                "THUMB_PROBE_FAILURE must be 'fallback' or 'abort', got '{}'",
                other
            ))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent batches
    pub max_concurrent_jobs: usize,
    /// Maximum messages taken per receive
    pub batch_size: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often the worker scans for stale pending messages
    pub claim_interval: Duration,
    /// Directory for scratch files
    pub work_dir: PathBuf,
    /// Bucket holding uploaded source videos
    pub videos_bucket: String,
    /// Bucket receiving thumbnails
    pub thumbs_bucket: String,
    /// Validity of the signed source download URL
    pub signed_url_ttl: Duration,
    /// Probe timeout
    pub probe_timeout: Duration,
    /// Per-frame extraction timeout
    pub extract_timeout: Duration,
    /// Source download timeout
    pub download_timeout: Duration,
    /// Per-thumbnail upload timeout
    pub upload_timeout: Duration,
    /// Thumbnail width bound in pixels
    pub max_width: u32,
    /// ffmpeg `-q:v` value
    pub jpeg_quality: u8,
    pub probe_failure: ProbeFailurePolicy,
    /// Duration assumed when the probe fails under [`ProbeFailurePolicy::Fallback`]
    pub fallback_duration_secs: f64,
    /// Capacity of the status event buffer
    pub event_buffer: usize,
    /// Prometheus listener address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            batch_size: 10,
            shutdown_timeout: Duration::from_secs(60),
            claim_interval: Duration::from_secs(30),
            work_dir: std::env::temp_dir(),
            videos_bucket: "videos".to_string(),
            thumbs_bucket: "thumbnails".to_string(),
            signed_url_ttl: Duration::from_secs(900),
            probe_timeout: Duration::from_secs(30),
            extract_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(900),
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            max_width: DEFAULT_MAX_WIDTH,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            probe_failure: ProbeFailurePolicy::Fallback,
            fallback_duration_secs: 60.0,
            event_buffer: 256,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, WorkerError> {
        let d = Self::default();

        let probe_failure = match std::env::var("THUMB_PROBE_FAILURE") {
            Ok(v) => v.parse()?,
            Err(_) => d.probe_failure,
        };

        let metrics_addr = match std::env::var("METRICS_ADDR") {
            Ok(v) if !v.trim().is_empty() => Some(v.trim().parse().map_err(|e| {
                WorkerError::config_error(format!("METRICS_ADDR '{}': {}", v, e))
            })?),
            _ => None,
        };

        Ok(Self {
            max_concurrent_jobs: env_or("WORKER_MAX_JOBS", d.max_concurrent_jobs).max(1),
            batch_size: env_or("WORKER_BATCH_SIZE", d.batch_size).max(1),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT", d.shutdown_timeout),
            claim_interval: env_secs("WORKER_CLAIM_INTERVAL_SECS", d.claim_interval),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.work_dir),
            videos_bucket: std::env::var("BUCKET_VIDEOS").unwrap_or(d.videos_bucket),
            thumbs_bucket: std::env::var("BUCKET_THUMBS").unwrap_or(d.thumbs_bucket),
            // a URL that expires mid-download fails the attempt
            signed_url_ttl: env_secs("THUMB_SIGNED_URL_TTL_SECS", d.signed_url_ttl)
                .max(Duration::from_secs(600)),
            probe_timeout: env_secs("THUMB_PROBE_TIMEOUT_SECS", d.probe_timeout),
            extract_timeout: env_secs("THUMB_EXTRACT_TIMEOUT_SECS", d.extract_timeout),
            download_timeout: env_secs("THUMB_DOWNLOAD_TIMEOUT_SECS", d.download_timeout),
            upload_timeout: env_secs("THUMB_UPLOAD_TIMEOUT_SECS", d.upload_timeout),
            max_width: env_or("THUMB_MAX_WIDTH", d.max_width),
            jpeg_quality: env_or("THUMB_JPEG_QUALITY", d.jpeg_quality),
            probe_failure,
            fallback_duration_secs: env_or("THUMB_FALLBACK_DURATION_SECS", d.fallback_duration_secs),
            event_buffer: env_or("WORKER_EVENT_BUFFER", d.event_buffer).max(1),
            metrics_addr,
        })
    }

    /// Longest one attempt can take before some timeout fires.
    pub fn max_attempt_duration(&self) -> Duration {
        let frames = THUMBNAIL_POSITIONS.len() as u32;
        self.download_timeout
            + self.probe_timeout
            + self.extract_timeout * frames
            + self.upload_timeout * frames
    }

    /// Reject a stale-claim threshold that lets another consumer take a
    /// message while an attempt on it can still be running here.
    pub fn check_claim_idle(&self, claim_min_idle: Duration) -> Result<(), WorkerError> {
        let budget = self.max_attempt_duration();
        if claim_min_idle <= budget {
            return Err(WorkerError::config_error(format!(
                "QUEUE_CLAIM_MIN_IDLE_SECS ({}s) must exceed the longest attempt ({}s)",
                claim_min_idle.as_secs(),
                budget.as_secs()
            )));
        }
        Ok(())
    }

    pub fn frame_options(&self) -> FrameOptions {
        FrameOptions {
            max_width: self.max_width,
            jpeg_quality: self.jpeg_quality,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_policy_parsing() {
        assert_eq!("fallback".parse::<ProbeFailurePolicy>().unwrap(), ProbeFailurePolicy::Fallback);
        assert_eq!(" ABORT ".parse::<ProbeFailurePolicy>().unwrap(), ProbeFailurePolicy::Abort);
        assert!("skip".parse::<ProbeFailurePolicy>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 1);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.signed_url_ttl, Duration::from_secs(900));
        assert_eq!(config.probe_failure, ProbeFailurePolicy::Fallback);
        assert_eq!(config.fallback_duration_secs, 60.0);
        assert_eq!(config.frame_options().max_width, 1280);
        assert_eq!(config.upload_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_max_attempt_duration_counts_every_frame() {
        let config = WorkerConfig::default();
        // 900 download + 30 probe + 3 x 30 extract + 3 x 60 upload
        assert_eq!(config.max_attempt_duration(), Duration::from_secs(1200));
    }

    #[test]
    fn test_claim_idle_must_outlast_an_attempt() {
        let config = WorkerConfig::default();
        assert!(config.check_claim_idle(Duration::from_secs(300)).is_err());
        assert!(config.check_claim_idle(Duration::from_secs(1200)).is_err());
        assert!(config.check_claim_idle(Duration::from_secs(1201)).is_ok());
    }

    #[test]
    fn test_default_queue_claim_idle_is_accepted() {
        let queue = vshare_queue::QueueConfig::default();
        WorkerConfig::default()
            .check_claim_idle(queue.claim_min_idle)
            .unwrap();
    }
}
