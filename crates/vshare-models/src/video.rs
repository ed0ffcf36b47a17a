//! Video record models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Video lifecycle status.
///
/// `Uploading -> Processing -> Ready`, with `Processing -> Uploading` on a
/// failed attempt. `Ready` is terminal for the thumbnail pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoStatus {
    /// Source upload in flight, or a processing attempt failed and awaits retry
    #[default]
    Uploading,
    /// Thumbnail generation in progress
    Processing,
    /// Thumbnails generated
    Ready,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploading => "UPLOADING",
            VideoStatus::Processing => "PROCESSING",
            VideoStatus::Ready => "READY",
        }
    }

    /// Whether the pipeline must leave this video alone.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Ready)
    }

    /// Whether the state machine allows `self -> next`.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        matches!(
            (self, next),
            (VideoStatus::Uploading, VideoStatus::Processing)
                // a crashed attempt leaves PROCESSING behind; re-entry is allowed
                | (VideoStatus::Processing, VideoStatus::Processing)
                | (VideoStatus::Processing, VideoStatus::Ready)
                | (VideoStatus::Processing, VideoStatus::Uploading)
        )
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unknown status string read from storage.
#[derive(Debug, Error)]
#[error("Unknown video status: {0}")]
pub struct StatusParseError(pub String);

impl FromStr for VideoStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPLOADING" => Ok(VideoStatus::Uploading),
            "PROCESSING" => Ok(VideoStatus::Processing),
            "READY" => Ok(VideoStatus::Ready),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

/// Video row as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    /// Video ID
    pub id: VideoId,
    /// Owning user ID
    pub user_id: String,
    /// Path of the source file inside the videos bucket
    pub object_path: String,
    /// Lifecycle status
    pub status: VideoStatus,
    /// Probed duration, set when the video becomes ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<i32>,
}

impl VideoRecord {
    pub fn new(
        id: impl Into<VideoId>,
        user_id: impl Into<String>,
        object_path: impl Into<String>,
        status: VideoStatus,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            object_path: object_path.into(),
            status,
            duration_sec: None,
        }
    }
}
