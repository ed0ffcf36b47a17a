//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Probe failed: {0}")]
    ProbeFailed(#[source] vshare_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] vshare_storage::StorageError),

    #[error("Database error: {0}")]
    Db(#[from] vshare_db::DbError),

    #[error("Media error: {0}")]
    Media(#[from] vshare_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] vshare_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    ///
    /// Every failure inside an attempt is handed back to the transport for
    /// redelivery; only a broken worker configuration is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, WorkerError::ConfigError(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::ConfigError(_) => "config",
            WorkerError::ProbeFailed(_) => "probe",
            WorkerError::Storage(_) => "storage",
            WorkerError::Db(_) => "db",
            WorkerError::Media(e) if e.is_timeout() => "media_timeout",
            WorkerError::Media(e) if e.is_tool_missing() => "media_missing",
            WorkerError::Media(_) => "media",
            WorkerError::Queue(_) => "queue",
            WorkerError::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vshare_media::{MediaError, Tool};

    #[test]
    fn test_pipeline_errors_are_retryable() {
        let timeout = WorkerError::from(MediaError::Timeout {
            tool: Tool::Ffmpeg,
            secs: 30,
        });
        assert!(timeout.is_retryable());
        assert_eq!(timeout.kind(), "media_timeout");

        let upload = WorkerError::from(vshare_storage::StorageError::upload_failed("503"));
        assert!(upload.is_retryable());

        assert!(!WorkerError::config_error("bad").is_retryable());
    }
}
