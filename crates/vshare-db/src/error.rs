//! Database error types.

use thiserror::Error;
use vshare_models::{VideoId, VideoStatus};

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur while reading or updating video state.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database configuration error: {0}")]
    ConfigError(String),

    #[error("Query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Video {video_id} is {actual}, expected {expected}")]
    StatusConflict {
        video_id: VideoId,
        expected: VideoStatus,
        actual: VideoStatus,
    },

    #[error("Unknown video status in row: {0}")]
    InvalidStatus(String),
}

impl DbError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn status_conflict(video_id: &VideoId, expected: VideoStatus, actual: VideoStatus) -> Self {
        Self::StatusConflict {
            video_id: video_id.clone(),
            expected,
            actual,
        }
    }

    /// Check if error is retryable.
    ///
    /// A status conflict means another worker moved the video; a later
    /// delivery will observe the settled state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::Sqlx(sqlx::Error::Io(_))
                | DbError::Sqlx(sqlx::Error::PoolTimedOut)
                | DbError::Sqlx(sqlx::Error::PoolClosed)
                | DbError::Sqlx(sqlx::Error::Database(_))
                | DbError::StatusConflict { .. }
        )
    }
}
