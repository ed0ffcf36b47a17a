//! Storage interface consumed by the thumbnail pipeline.

use async_trait::async_trait;
use vshare_models::{ThumbnailRecord, VideoId, VideoRecord};

use crate::error::DbResult;

/// Result of the final READY commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Thumbnails replaced and the video moved to READY.
    Committed,
    /// Another delivery already finished this video; nothing was written.
    AlreadyReady,
    /// The video row disappeared while processing; nothing was written.
    Missing,
}

/// Video and thumbnail metadata.
///
/// Every status change is a compare-and-set on the prior status, so two
/// workers racing on the same video never clobber each other.
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Fetch a video by ID.
    async fn get_video(&self, id: &VideoId) -> DbResult<Option<VideoRecord>>;

    /// Move UPLOADING (or a stale PROCESSING) to PROCESSING.
    ///
    /// Returns `false` when the row is missing or in any other status.
    async fn begin_processing(&self, id: &VideoId) -> DbResult<bool>;

    /// Move PROCESSING back to UPLOADING after a failed attempt.
    ///
    /// Returns `false` when the video was not PROCESSING.
    async fn revert_to_uploading(&self, id: &VideoId) -> DbResult<bool>;

    /// Insert thumbnail rows.
    async fn create_thumbnails(&self, rows: &[ThumbnailRecord]) -> DbResult<()>;

    /// Replace the video's thumbnails with `rows` and move PROCESSING to READY,
    /// all in one transaction.
    ///
    /// Returns [`DbError::StatusConflict`](crate::DbError::StatusConflict) if
    /// the video is neither PROCESSING nor READY.
    async fn complete_processing(
        &self,
        id: &VideoId,
        rows: &[ThumbnailRecord],
        duration_sec: Option<i32>,
    ) -> DbResult<CommitOutcome>;

    /// Thumbnails currently stored for a video, ordered by timecode.
    async fn list_thumbnails(&self, id: &VideoId) -> DbResult<Vec<ThumbnailRecord>>;

    /// Connectivity check.
    async fn ping(&self) -> DbResult<()>;
}
