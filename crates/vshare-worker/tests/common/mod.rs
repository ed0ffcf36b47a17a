//! In-memory collaborators for pipeline and consumer tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use vshare_db::InMemoryVideoStore;
use vshare_media::{MediaError, MediaResult, MediaTools, Tool};
use vshare_models::{VideoId, VideoRecord, VideoStatus};
use vshare_storage::{ObjectStore, SourceDownloader, StorageError, StorageResult};
use vshare_worker::{PipelineSettings, ThumbnailPipeline};

pub const USER: &str = "user-1";
pub const VIDEO: &str = "vid-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub len: usize,
}

#[derive(Default)]
pub struct FakeObjectStore {
    pub uploads: Mutex<Vec<Upload>>,
    pub fail_uploads: AtomicBool,
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn signed_download_url(&self, bucket: &str, key: &str, ttl: Duration) -> StorageResult<String> {
        Ok(format!("https://objects.test/{}/{}?expires={}", bucket, key, ttl.as_secs()))
    }

    async fn signed_upload_url(&self, bucket: &str, key: &str, _ttl: Duration) -> StorageResult<String> {
        Ok(format!("https://objects.test/{}/{}?upload", bucket, key))
    }

    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::upload_failed("503 Service Unavailable"));
        }
        self.uploads.lock().unwrap().push(Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            len: data.len(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDownloader {
    pub urls: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl SourceDownloader for FakeDownloader {
    async fn download_to_file(&self, url: &str, dest: &Path) -> StorageResult<u64> {
        self.urls.lock().unwrap().push(url.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::download_failed("HTTP 404 Not Found"));
        }
        let body = b"not really an mp4";
        tokio::fs::write(dest, body).await?;
        Ok(body.len() as u64)
    }
}

type ExtractHook = Box<dyn Fn(usize) + Send + Sync>;

pub struct FakeMedia {
    /// `None` makes the probe fail
    pub duration: Option<f64>,
    /// 1-based extraction call that fails
    pub fail_extract_on: Option<usize>,
    pub extract_calls: AtomicUsize,
    pub timecodes: Mutex<Vec<u32>>,
    pub inputs: Mutex<Vec<PathBuf>>,
    pub on_extract: Option<ExtractHook>,
}

impl FakeMedia {
    pub fn with_duration(duration: f64) -> Self {
        Self {
            duration: Some(duration),
            fail_extract_on: None,
            extract_calls: AtomicUsize::new(0),
            timecodes: Mutex::new(Vec::new()),
            inputs: Mutex::new(Vec::new()),
            on_extract: None,
        }
    }

    pub fn failing_probe() -> Self {
        Self {
            duration: None,
            ..Self::with_duration(0.0)
        }
    }

    pub fn fail_extract_on(mut self, call: usize) -> Self {
        self.fail_extract_on = Some(call);
        self
    }

    pub fn on_extract(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_extract = Some(Box::new(hook));
        self
    }
}

#[async_trait]
impl MediaTools for FakeMedia {
    async fn probe_duration(&self, input: &Path) -> MediaResult<f64> {
        assert!(input.exists(), "probe ran before the source was downloaded");
        self.duration.ok_or_else(|| {
            MediaError::tool_failed(
                Tool::Ffprobe,
                "ffprobe exited with exit status: 1",
                Some("moov atom not found".to_string()),
                Some(1),
            )
        })
    }

    async fn extract_frame(&self, input: &Path, output: &Path, timecode_sec: u32) -> MediaResult<()> {
        let call = self.extract_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.inputs.lock().unwrap().push(input.to_path_buf());
        if let Some(hook) = &self.on_extract {
            hook(call);
        }
        if self.fail_extract_on == Some(call) {
            return Err(MediaError::tool_failed(
                Tool::Ffmpeg,
                "ffmpeg exited with exit status: 1",
                Some("Invalid data found when processing input".to_string()),
                Some(1),
            ));
        }
        self.timecodes.lock().unwrap().push(timecode_sec);
        tokio::fs::write(output, b"\xff\xd8\xff\xe0jpeg").await?;
        Ok(())
    }
}

/// Everything a pipeline test needs to inspect afterwards.
pub struct Harness {
    pub store: Arc<InMemoryVideoStore>,
    pub objects: Arc<FakeObjectStore>,
    pub downloader: Arc<FakeDownloader>,
    pub media: Arc<FakeMedia>,
    pub work_dir: TempDir,
    pub pipeline: ThumbnailPipeline,
}

impl Harness {
    pub fn new(media: FakeMedia) -> Self {
        Self::with_settings(media, |_| {})
    }

    pub fn with_settings(media: FakeMedia, tweak: impl FnOnce(&mut PipelineSettings)) -> Self {
        Self::build(Arc::new(InMemoryVideoStore::new()), media, tweak)
    }

    pub fn build(
        store: Arc<InMemoryVideoStore>,
        media: FakeMedia,
        tweak: impl FnOnce(&mut PipelineSettings),
    ) -> Self {
        let work_dir = TempDir::new().unwrap();
        let mut settings = PipelineSettings {
            work_dir: work_dir.path().to_path_buf(),
            ..PipelineSettings::default()
        };
        tweak(&mut settings);

        let objects = Arc::new(FakeObjectStore::default());
        let downloader = Arc::new(FakeDownloader::default());
        let media = Arc::new(media);

        let pipeline = ThumbnailPipeline::new(
            settings,
            store.clone(),
            objects.clone(),
            downloader.clone(),
            media.clone(),
        );

        Self {
            store,
            objects,
            downloader,
            media,
            work_dir,
            pipeline,
        }
    }

    pub fn add_video(&self, status: VideoStatus) -> VideoId {
        let id = VideoId::from(VIDEO);
        self.store.insert_video(VideoRecord::new(
            id.clone(),
            USER,
            format!("{}/{}.mp4", USER, VIDEO),
            status,
        ));
        id
    }

    /// Files left behind in the scratch directory.
    pub fn scratch_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.work_dir.path())
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }

    pub fn upload_keys(&self) -> Vec<String> {
        self.objects
            .uploads
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.key.clone())
            .collect()
    }
}
