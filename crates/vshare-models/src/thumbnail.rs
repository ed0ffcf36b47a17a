//! Thumbnail records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::video::VideoId;

/// Unique identifier for a thumbnail row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ThumbnailId(pub String);

impl ThumbnailId {
    /// Generate a new random thumbnail ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ThumbnailId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ThumbnailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A thumbnail that has been uploaded but not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewThumbnail {
    /// Path inside the thumbnails bucket
    pub object_path: String,
    /// Second of the source the frame was taken from
    pub timecode_sec: u32,
}

/// Persisted thumbnail row. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailRecord {
    pub id: ThumbnailId,
    pub video_id: VideoId,
    pub object_path: String,
    pub timecode_sec: u32,
    pub created_at: DateTime<Utc>,
}

impl ThumbnailRecord {
    /// Build a record with a fresh ID.
    pub fn from_new(video_id: &VideoId, thumb: &NewThumbnail) -> Self {
        Self {
            id: ThumbnailId::new(),
            video_id: video_id.clone(),
            object_path: thumb.object_path.clone(),
            timecode_sec: thumb.timecode_sec,
            created_at: Utc::now(),
        }
    }
}
