//! Pipeline behaviour against in-memory collaborators.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use common::{FakeMedia, Harness, USER, VIDEO};
use vshare_db::{InMemoryVideoStore, VideoStore};
use vshare_models::{VideoId, VideoStatus, VideoStatusEvent};
use vshare_queue::QueueResult;
use vshare_worker::{
    EventDispatcher, ProbeFailurePolicy, ProcessOutcome, StatusPublisher, WorkerError,
};

#[tokio::test]
async fn test_generates_three_thumbnails_and_marks_ready() {
    let h = Harness::new(FakeMedia::with_duration(125.7));
    let id = h.add_video(VideoStatus::Uploading);

    let outcome = h.pipeline.process_thumbnails(&id).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Completed { thumbnails: 3 });

    let video = h.store.get_video(&id).await.unwrap().unwrap();
    assert_eq!(video.status, VideoStatus::Ready);
    assert_eq!(video.duration_sec, Some(126));

    let mut thumbs = h.store.list_thumbnails(&id).await.unwrap();
    thumbs.sort_by_key(|t| t.timecode_sec);
    let timecodes: Vec<u32> = thumbs.iter().map(|t| t.timecode_sec).collect();
    assert_eq!(timecodes, vec![13, 63, 113]);

    let paths: Vec<&str> = thumbs.iter().map(|t| t.object_path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "user-1/thumbs/vid-1/t1.jpg",
            "user-1/thumbs/vid-1/t2.jpg",
            "user-1/thumbs/vid-1/t3.jpg",
        ]
    );

    let uploads = h.objects.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 3);
    assert!(uploads.iter().all(|u| u.bucket == "thumbnails"));
    assert!(uploads.iter().all(|u| u.content_type == "image/jpeg"));
    assert!(uploads.iter().all(|u| u.len > 0));

    assert_eq!(
        h.store.transitions(),
        vec![
            (id.clone(), VideoStatus::Processing),
            (id.clone(), VideoStatus::Ready),
        ]
    );
}

#[tokio::test]
async fn test_download_url_is_signed_for_the_source_object() {
    let h = Harness::new(FakeMedia::with_duration(30.0));
    let id = h.add_video(VideoStatus::Uploading);

    h.pipeline.process_thumbnails(&id).await.unwrap();

    let urls = h.downloader.urls.lock().unwrap().clone();
    assert_eq!(urls.len(), 1);
    assert!(urls[0].starts_with(&format!("https://objects.test/videos/{}/{}.mp4", USER, VIDEO)));
    assert!(urls[0].ends_with("expires=900"));
}

#[tokio::test]
async fn test_scratch_files_removed_after_success() {
    let h = Harness::new(FakeMedia::with_duration(40.0));
    let id = h.add_video(VideoStatus::Uploading);

    h.pipeline.process_thumbnails(&id).await.unwrap();

    assert!(h.scratch_files().is_empty(), "left behind: {:?}", h.scratch_files());
}

#[tokio::test]
async fn test_every_frame_reads_the_downloaded_source() {
    let h = Harness::new(FakeMedia::with_duration(40.0));
    let id = h.add_video(VideoStatus::Uploading);

    h.pipeline.process_thumbnails(&id).await.unwrap();

    let inputs = h.media.inputs.lock().unwrap().clone();
    assert_eq!(inputs.len(), 3);
    assert!(inputs.windows(2).all(|w| w[0] == w[1]));
    assert!(inputs[0].starts_with(h.work_dir.path()));
}

#[tokio::test]
async fn test_missing_video_is_success_without_side_effects() {
    let h = Harness::new(FakeMedia::with_duration(10.0));

    let outcome = h
        .pipeline
        .process_thumbnails(&VideoId::from("nope"))
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::NotFound);
    assert!(h.downloader.urls.lock().unwrap().is_empty());
    assert!(h.objects.uploads.lock().unwrap().is_empty());
    assert!(h.store.transitions().is_empty());
}

#[tokio::test]
async fn test_ready_video_is_left_alone() {
    let h = Harness::new(FakeMedia::with_duration(10.0));
    let id = h.add_video(VideoStatus::Ready);

    let outcome = h.pipeline.process_thumbnails(&id).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::AlreadyReady);
    assert_eq!(h.store.status_of(&id), Some(VideoStatus::Ready));
    assert_eq!(h.store.thumbnail_count(), 0);
    assert!(h.downloader.urls.lock().unwrap().is_empty());
    assert!(h.store.transitions().is_empty());
}

#[tokio::test]
async fn test_processing_video_is_picked_up_again() {
    // a crashed worker leaves the row in PROCESSING
    let h = Harness::new(FakeMedia::with_duration(10.0));
    let id = h.add_video(VideoStatus::Processing);

    let outcome = h.pipeline.process_thumbnails(&id).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Completed { thumbnails: 3 });
    assert_eq!(h.store.status_of(&id), Some(VideoStatus::Ready));
}

#[tokio::test]
async fn test_second_run_after_ready_adds_nothing() {
    let h = Harness::new(FakeMedia::with_duration(20.0));
    let id = h.add_video(VideoStatus::Uploading);

    h.pipeline.process_thumbnails(&id).await.unwrap();
    let again = h.pipeline.process_thumbnails(&id).await.unwrap();

    assert_eq!(again, ProcessOutcome::AlreadyReady);
    assert_eq!(h.store.thumbnail_count(), 3);
    assert_eq!(h.media.extract_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_extraction_failure_reverts_without_rows() {
    let h = Harness::new(FakeMedia::with_duration(90.0).fail_extract_on(2));
    let id = h.add_video(VideoStatus::Uploading);

    let err = h.pipeline.process_thumbnails(&id).await.unwrap_err();

    assert!(matches!(err, WorkerError::Media(_)), "got {:?}", err);
    assert!(err.is_retryable());
    assert_eq!(h.store.status_of(&id), Some(VideoStatus::Uploading));
    assert_eq!(h.store.thumbnail_count(), 0);
    assert!(h.objects.uploads.lock().unwrap().is_empty());
    assert_eq!(
        h.store.transitions(),
        vec![
            (id.clone(), VideoStatus::Processing),
            (id.clone(), VideoStatus::Uploading),
        ]
    );
}

#[tokio::test]
async fn test_source_removed_when_first_extraction_fails() {
    let h = Harness::new(FakeMedia::with_duration(90.0).fail_extract_on(1));
    let id = h.add_video(VideoStatus::Uploading);

    h.pipeline.process_thumbnails(&id).await.unwrap_err();

    assert!(h.scratch_files().is_empty(), "left behind: {:?}", h.scratch_files());
}

#[tokio::test]
async fn test_probe_failure_falls_back_to_sixty_seconds() {
    let h = Harness::new(FakeMedia::failing_probe());
    let id = h.add_video(VideoStatus::Uploading);

    let outcome = h.pipeline.process_thumbnails(&id).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Completed { thumbnails: 3 });
    assert_eq!(*h.media.timecodes.lock().unwrap(), vec![6, 30, 54]);
    let video = h.store.get_video(&id).await.unwrap().unwrap();
    assert_eq!(video.duration_sec, None);
}

#[tokio::test]
async fn test_probe_failure_aborts_when_configured() {
    let h = Harness::with_settings(FakeMedia::failing_probe(), |s| {
        s.probe_failure = ProbeFailurePolicy::Abort;
    });
    let id = h.add_video(VideoStatus::Uploading);

    let err = h.pipeline.process_thumbnails(&id).await.unwrap_err();

    assert!(matches!(err, WorkerError::ProbeFailed(_)), "got {:?}", err);
    assert_eq!(h.media.extract_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.status_of(&id), Some(VideoStatus::Uploading));
}

#[tokio::test]
async fn test_non_finite_probe_uses_fallback() {
    let h = Harness::new(FakeMedia::with_duration(f64::NAN));
    let id = h.add_video(VideoStatus::Uploading);

    h.pipeline.process_thumbnails(&id).await.unwrap();

    assert_eq!(*h.media.timecodes.lock().unwrap(), vec![6, 30, 54]);
}

#[tokio::test]
async fn test_zero_length_video_gets_frames_at_first_second() {
    let h = Harness::new(FakeMedia::with_duration(0.0));
    let id = h.add_video(VideoStatus::Uploading);

    h.pipeline.process_thumbnails(&id).await.unwrap();

    assert_eq!(*h.media.timecodes.lock().unwrap(), vec![1, 1, 1]);
    assert_eq!(h.store.thumbnail_count(), 3);
}

#[tokio::test]
async fn test_download_failure_reverts() {
    let h = Harness::new(FakeMedia::with_duration(10.0));
    h.downloader.fail.store(true, Ordering::SeqCst);
    let id = h.add_video(VideoStatus::Uploading);

    let err = h.pipeline.process_thumbnails(&id).await.unwrap_err();

    assert!(matches!(err, WorkerError::Storage(_)), "got {:?}", err);
    assert_eq!(h.store.status_of(&id), Some(VideoStatus::Uploading));
    assert_eq!(h.media.extract_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_upload_failure_leaves_no_rows() {
    let h = Harness::new(FakeMedia::with_duration(10.0));
    h.objects.fail_uploads.store(true, Ordering::SeqCst);
    let id = h.add_video(VideoStatus::Uploading);

    let err = h.pipeline.process_thumbnails(&id).await.unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(h.store.thumbnail_count(), 0);
    assert_eq!(h.store.status_of(&id), Some(VideoStatus::Uploading));
}

#[tokio::test]
async fn test_commit_failure_reverts() {
    let h = Harness::new(FakeMedia::with_duration(10.0));
    h.store.fail_commits(true);
    let id = h.add_video(VideoStatus::Uploading);

    let err = h.pipeline.process_thumbnails(&id).await.unwrap_err();

    assert!(matches!(err, WorkerError::Db(_)), "got {:?}", err);
    assert_eq!(h.store.thumbnail_count(), 0);
    assert_eq!(h.store.status_of(&id), Some(VideoStatus::Uploading));
}

#[tokio::test]
async fn test_concurrent_finish_is_not_duplicated() {
    let store = Arc::new(InMemoryVideoStore::new());
    let racer = store.clone();
    let media = FakeMedia::with_duration(10.0).on_extract(move |call| {
        if call == 3 {
            racer.set_status(&VideoId::from(VIDEO), VideoStatus::Ready);
        }
    });
    let h = Harness::build(store, media, |_| {});
    let id = h.add_video(VideoStatus::Uploading);

    let outcome = h.pipeline.process_thumbnails(&id).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::AlreadyReady);
    assert_eq!(h.store.thumbnail_count(), 0);
    assert_eq!(h.store.status_of(&id), Some(VideoStatus::Ready));
}

#[tokio::test]
async fn test_video_deleted_mid_attempt() {
    let store = Arc::new(InMemoryVideoStore::new());
    let racer = store.clone();
    let media = FakeMedia::with_duration(10.0).on_extract(move |call| {
        if call == 1 {
            racer.remove_video(&VideoId::from(VIDEO));
        }
    });
    let h = Harness::build(store, media, |_| {});
    let id = h.add_video(VideoStatus::Uploading);

    let outcome = h.pipeline.process_thumbnails(&id).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::NotFound);
    assert_eq!(h.store.thumbnail_count(), 0);
}

#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<VideoStatusEvent>>,
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn publish(&self, event: &VideoStatusEvent) -> QueueResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

async fn wait_for_events(publisher: &RecordingPublisher, count: usize) -> Vec<VideoStatusEvent> {
    for _ in 0..50 {
        let events = publisher.events.lock().unwrap().clone();
        if events.len() >= count {
            return events;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    publisher.events.lock().unwrap().clone()
}

#[tokio::test]
async fn test_status_events_on_success() {
    let publisher = Arc::new(RecordingPublisher::default());
    let (events, _failures, _task) = EventDispatcher::spawn(publisher.clone(), 16);

    let mut h = Harness::new(FakeMedia::with_duration(10.0));
    h.pipeline = h.pipeline.with_events(events);
    let id = h.add_video(VideoStatus::Uploading);

    h.pipeline.process_thumbnails(&id).await.unwrap();

    let events = wait_for_events(&publisher, 2).await;
    let statuses: Vec<VideoStatus> = events.iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![VideoStatus::Processing, VideoStatus::Ready]);
    assert!(events.iter().all(|e| e.user_id == USER && e.video_id == id));
    assert_eq!(events[1].thumbnail_count, Some(3));
}

#[tokio::test]
async fn test_status_events_on_failure() {
    let publisher = Arc::new(RecordingPublisher::default());
    let (events, _failures, _task) = EventDispatcher::spawn(publisher.clone(), 16);

    let mut h = Harness::new(FakeMedia::with_duration(10.0).fail_extract_on(1));
    h.pipeline = h.pipeline.with_events(events);
    let id = h.add_video(VideoStatus::Uploading);

    h.pipeline.process_thumbnails(&id).await.unwrap_err();

    let events = wait_for_events(&publisher, 2).await;
    let statuses: Vec<VideoStatus> = events.iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![VideoStatus::Processing, VideoStatus::Uploading]);
}
