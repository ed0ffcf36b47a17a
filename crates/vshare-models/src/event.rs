//! Status change events.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::video::{VideoId, VideoStatus};

/// Emitted whenever the pipeline moves a video to a new status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatusEvent {
    pub video_id: VideoId,
    pub user_id: String,
    pub status: VideoStatus,
    /// Number of thumbnails attached, present on `Ready`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_count: Option<u32>,
    pub at: DateTime<Utc>,
}

impl VideoStatusEvent {
    pub fn new(video_id: VideoId, user_id: impl Into<String>, status: VideoStatus) -> Self {
        Self {
            video_id,
            user_id: user_id.into(),
            status,
            thumbnail_count: None,
            at: Utc::now(),
        }
    }

    pub fn with_thumbnail_count(mut self, count: u32) -> Self {
        self.thumbnail_count = Some(count);
        self
    }
}
