//! In-memory [`VideoStore`] for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use vshare_models::{ThumbnailRecord, VideoId, VideoRecord, VideoStatus};

use crate::error::{DbError, DbResult};
use crate::store::{CommitOutcome, VideoStore};

#[derive(Default)]
struct Inner {
    videos: HashMap<VideoId, VideoRecord>,
    thumbnails: Vec<ThumbnailRecord>,
    transitions: Vec<(VideoId, VideoStatus)>,
}

/// Mutex-guarded store with the same compare-and-set semantics as Postgres.
#[derive(Default)]
pub struct InMemoryVideoStore {
    inner: Mutex<Inner>,
    fail_commits: AtomicBool,
}

impl InMemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a video.
    pub fn insert_video(&self, video: VideoRecord) {
        let mut inner = self.lock();
        inner.videos.insert(video.id.clone(), video);
    }

    /// Delete a video and its thumbnails.
    pub fn remove_video(&self, id: &VideoId) {
        let mut inner = self.lock();
        inner.videos.remove(id);
        inner.thumbnails.retain(|t| &t.video_id != id);
    }

    /// Force a status without going through the state machine.
    pub fn set_status(&self, id: &VideoId, status: VideoStatus) {
        let mut inner = self.lock();
        if let Some(video) = inner.videos.get_mut(id) {
            video.status = status;
        }
    }

    pub fn status_of(&self, id: &VideoId) -> Option<VideoStatus> {
        self.lock().videos.get(id).map(|v| v.status)
    }

    /// Every applied status change, oldest first.
    pub fn transitions(&self) -> Vec<(VideoId, VideoStatus)> {
        self.lock().transitions.clone()
    }

    pub fn thumbnail_count(&self) -> usize {
        self.lock().thumbnails.len()
    }

    /// Make every `complete_processing` call fail with a database error.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // a poisoned lock only means a test panicked mid-update
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn compare_and_set(&self, id: &VideoId, from: &[VideoStatus], to: VideoStatus) -> bool {
        let mut inner = self.lock();
        let Some(video) = inner.videos.get_mut(id) else {
            return false;
        };
        if !from.contains(&video.status) {
            return false;
        }
        video.status = to;
        inner.transitions.push((id.clone(), to));
        true
    }
}

#[async_trait]
impl VideoStore for InMemoryVideoStore {
    async fn get_video(&self, id: &VideoId) -> DbResult<Option<VideoRecord>> {
        Ok(self.lock().videos.get(id).cloned())
    }

    async fn begin_processing(&self, id: &VideoId) -> DbResult<bool> {
        Ok(self.compare_and_set(
            id,
            &[VideoStatus::Uploading, VideoStatus::Processing],
            VideoStatus::Processing,
        ))
    }

    async fn revert_to_uploading(&self, id: &VideoId) -> DbResult<bool> {
        Ok(self.compare_and_set(id, &[VideoStatus::Processing], VideoStatus::Uploading))
    }

    async fn create_thumbnails(&self, rows: &[ThumbnailRecord]) -> DbResult<()> {
        self.lock().thumbnails.extend_from_slice(rows);
        Ok(())
    }

    async fn complete_processing(
        &self,
        id: &VideoId,
        rows: &[ThumbnailRecord],
        duration_sec: Option<i32>,
    ) -> DbResult<CommitOutcome> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }

        let mut inner = self.lock();
        let Some(video) = inner.videos.get_mut(id) else {
            return Ok(CommitOutcome::Missing);
        };

        match video.status {
            VideoStatus::Processing => {}
            VideoStatus::Ready => return Ok(CommitOutcome::AlreadyReady),
            actual => return Err(DbError::status_conflict(id, VideoStatus::Processing, actual)),
        }

        video.status = VideoStatus::Ready;
        if duration_sec.is_some() {
            video.duration_sec = duration_sec;
        }
        inner.thumbnails.retain(|t| &t.video_id != id);
        inner.thumbnails.extend_from_slice(rows);
        inner.transitions.push((id.clone(), VideoStatus::Ready));
        Ok(CommitOutcome::Committed)
    }

    async fn list_thumbnails(&self, id: &VideoId) -> DbResult<Vec<ThumbnailRecord>> {
        let mut rows: Vec<ThumbnailRecord> = self
            .lock()
            .thumbnails
            .iter()
            .filter(|t| &t.video_id == id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.timecode_sec
                .cmp(&b.timecode_sec)
                .then_with(|| a.object_path.cmp(&b.object_path))
        });
        Ok(rows)
    }

    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }
}
