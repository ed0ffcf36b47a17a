//! Thumbnail pipeline.
//!
//! One attempt per call: mark the video PROCESSING, download the source,
//! probe it, extract and upload three frames, then replace the thumbnail
//! rows and mark the video READY in a single commit. Any failure before that
//! commit reverts the video to UPLOADING and is returned to the caller so
//! the transport can redeliver the job.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use vshare_db::{CommitOutcome, DbError, VideoStore};
use vshare_media::{MediaTools, ScratchSpace};
use vshare_models::{
    pick_timecodes, NewThumbnail, ThumbnailRecord, VideoId, VideoRecord, VideoStatus, VideoStatusEvent,
};
use vshare_storage::{ObjectStore, SourceDownloader};

use crate::config::{ProbeFailurePolicy, WorkerConfig};
use crate::error::{WorkerError, WorkerResult};
use crate::events::EventDispatcher;
use crate::metrics;

const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Settings for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub videos_bucket: String,
    pub thumbs_bucket: String,
    pub signed_url_ttl: Duration,
    pub work_dir: PathBuf,
    pub probe_failure: ProbeFailurePolicy,
    pub fallback_duration_secs: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for PipelineSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            videos_bucket: config.videos_bucket.clone(),
            thumbs_bucket: config.thumbs_bucket.clone(),
            signed_url_ttl: config.signed_url_ttl,
            work_dir: config.work_dir.clone(),
            probe_failure: config.probe_failure,
            fallback_duration_secs: config.fallback_duration_secs,
        }
    }
}

/// How a successful call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Thumbnails stored and the video is READY.
    Completed { thumbnails: usize },
    /// The video does not exist (or vanished mid-attempt).
    NotFound,
    /// The video was already READY; nothing was written.
    AlreadyReady,
}

/// Object path of the `index`-th (1-based) thumbnail of a video.
pub fn thumbnail_object_path(user_id: &str, video_id: &VideoId, index: usize) -> String {
    format!("{}/thumbs/{}/t{}.jpg", user_id, video_id, index)
}

/// Drives one thumbnail-generation attempt per call.
pub struct ThumbnailPipeline {
    settings: PipelineSettings,
    store: Arc<dyn VideoStore>,
    objects: Arc<dyn ObjectStore>,
    downloader: Arc<dyn SourceDownloader>,
    media: Arc<dyn MediaTools>,
    events: EventDispatcher,
}

impl ThumbnailPipeline {
    pub fn new(
        settings: PipelineSettings,
        store: Arc<dyn VideoStore>,
        objects: Arc<dyn ObjectStore>,
        downloader: Arc<dyn SourceDownloader>,
        media: Arc<dyn MediaTools>,
    ) -> Self {
        Self {
            settings,
            store,
            objects,
            downloader,
            media,
            events: EventDispatcher::disabled(),
        }
    }

    /// Publish status changes through `events`.
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Generate thumbnails for `video_id`.
    ///
    /// Missing and already-READY videos return `Ok` without side effects.
    pub async fn process_thumbnails(&self, video_id: &VideoId) -> WorkerResult<ProcessOutcome> {
        let start = Instant::now();

        let Some(video) = self.store.get_video(video_id).await? else {
            info!(video_id = %video_id, "Video not found, nothing to do");
            metrics::record_job_skipped("not_found");
            return Ok(ProcessOutcome::NotFound);
        };
        if video.status.is_terminal() {
            info!(video_id = %video_id, "Video already READY, skipping");
            metrics::record_job_skipped("already_ready");
            return Ok(ProcessOutcome::AlreadyReady);
        }

        if !self.store.begin_processing(video_id).await? {
            // lost a race between the read and the compare-and-set
            return match self.store.get_video(video_id).await? {
                None => Ok(ProcessOutcome::NotFound),
                Some(v) if v.status.is_terminal() => Ok(ProcessOutcome::AlreadyReady),
                Some(v) => Err(DbError::status_conflict(video_id, VideoStatus::Processing, v.status).into()),
            };
        }
        self.emit(&video, VideoStatus::Processing, None);
        info!(video_id = %video_id, user_id = %video.user_id, "Generating thumbnails");

        let mut scratch = ScratchSpace::new(&self.settings.work_dir);
        let result = self.attempt(&video, &mut scratch).await;
        scratch.cleanup().await;

        match result {
            Ok(outcome) => {
                if let ProcessOutcome::Completed { thumbnails } = outcome {
                    self.emit(&video, VideoStatus::Ready, Some(thumbnails as u32));
                    metrics::record_job_completed(start.elapsed().as_secs_f64());
                    info!(
                        video_id = %video_id,
                        thumbnails,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Thumbnails generated"
                    );
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!(video_id = %video_id, "Thumbnail attempt failed: {}", e);
                self.revert(&video).await;
                Err(e)
            }
        }
    }

    async fn attempt(&self, video: &VideoRecord, scratch: &mut ScratchSpace) -> WorkerResult<ProcessOutcome> {
        let source = self.download_source(video, scratch).await?;

        let probed = self.probe(&source).await?;
        let duration = probed.unwrap_or(self.settings.fallback_duration_secs);
        let timecodes = pick_timecodes(duration);
        debug!(video_id = %video.id, duration, ?timecodes, "Picked timecodes");

        let mut frames = Vec::with_capacity(timecodes.len());
        for (i, &timecode) in timecodes.iter().enumerate() {
            let frame = scratch.file(&format!("thumb-{}", i + 1), "jpg").await?;
            self.media.extract_frame(&source, &frame, timecode).await?;
            frames.push((frame, timecode));
        }

        let mut thumbnails = Vec::with_capacity(frames.len());
        for (i, (frame, timecode)) in frames.iter().enumerate() {
            let object_path = thumbnail_object_path(&video.user_id, &video.id, i + 1);
            self.upload_frame(frame, &object_path).await?;
            thumbnails.push(NewThumbnail {
                object_path,
                timecode_sec: *timecode,
            });
        }

        let rows: Vec<ThumbnailRecord> = thumbnails
            .iter()
            .map(|t| ThumbnailRecord::from_new(&video.id, t))
            .collect();
        let duration_sec = probed.map(|d| d.round() as i32);

        match self.store.complete_processing(&video.id, &rows, duration_sec).await? {
            CommitOutcome::Committed => Ok(ProcessOutcome::Completed {
                thumbnails: rows.len(),
            }),
            CommitOutcome::AlreadyReady => {
                info!(video_id = %video.id, "Another delivery finished first");
                metrics::record_job_skipped("already_ready");
                Ok(ProcessOutcome::AlreadyReady)
            }
            CommitOutcome::Missing => {
                info!(video_id = %video.id, "Video deleted during processing");
                metrics::record_job_skipped("not_found");
                Ok(ProcessOutcome::NotFound)
            }
        }
    }

    async fn download_source(&self, video: &VideoRecord, scratch: &mut ScratchSpace) -> WorkerResult<PathBuf> {
        let url = self
            .objects
            .signed_download_url(
                &self.settings.videos_bucket,
                &video.object_path,
                self.settings.signed_url_ttl,
            )
            .await?;

        let source = scratch.file("source", source_extension(&video.object_path)).await?;

        let start = Instant::now();
        let bytes = self.downloader.download_to_file(&url, &source).await?;
        metrics::record_download(start.elapsed().as_secs_f64());
        debug!(video_id = %video.id, bytes, "Source downloaded");

        Ok(source)
    }

    /// `Ok(None)` means the probe failed and the fallback duration applies.
    async fn probe(&self, source: &Path) -> WorkerResult<Option<f64>> {
        let error = match self.media.probe_duration(source).await {
            Ok(d) if d.is_finite() && d >= 0.0 => return Ok(Some(d)),
            Ok(d) => vshare_media::MediaError::InvalidDuration(d.to_string()),
            Err(e) => e,
        };

        match self.settings.probe_failure {
            ProbeFailurePolicy::Abort => Err(WorkerError::ProbeFailed(error)),
            ProbeFailurePolicy::Fallback => {
                warn!(
                    fallback_secs = self.settings.fallback_duration_secs,
                    "Duration probe failed, using fallback: {}", error
                );
                metrics::record_probe_fallback();
                Ok(None)
            }
        }
    }

    async fn upload_frame(&self, frame: &Path, object_path: &str) -> WorkerResult<()> {
        let data = tokio::fs::read(frame).await?;
        let start = Instant::now();
        self.objects
            .upload_object(
                &self.settings.thumbs_bucket,
                object_path,
                data,
                THUMBNAIL_CONTENT_TYPE,
            )
            .await?;
        metrics::record_upload(start.elapsed().as_secs_f64());
        Ok(())
    }

    async fn revert(&self, video: &VideoRecord) {
        match self.store.revert_to_uploading(&video.id).await {
            Ok(true) => self.emit(video, VideoStatus::Uploading, None),
            Ok(false) => debug!(video_id = %video.id, "Video no longer PROCESSING, nothing to revert"),
            Err(e) => warn!(video_id = %video.id, "Failed to revert video to UPLOADING: {}", e),
        }
    }

    fn emit(&self, video: &VideoRecord, status: VideoStatus, thumbnails: Option<u32>) {
        let mut event = VideoStatusEvent::new(video.id.clone(), video.user_id.clone(), status);
        if let Some(count) = thumbnails {
            event = event.with_thumbnail_count(count);
        }
        self.events.submit(event);
    }
}

/// Extension for the scratch copy of the source, taken from its object path.
fn source_extension(object_path: &str) -> &str {
    Path::new(object_path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("mp4")
}
