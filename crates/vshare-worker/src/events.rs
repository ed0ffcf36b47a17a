//! Background dispatch of status events.
//!
//! The pipeline hands events to a bounded channel and never waits on the
//! publisher. Publish failures are reported on a separate error channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use vshare_models::VideoStatusEvent;
use vshare_queue::{QueueResult, StatusChannel};

use crate::metrics;

/// Destination for status events.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, event: &VideoStatusEvent) -> QueueResult<()>;
}

#[async_trait]
impl StatusPublisher for StatusChannel {
    async fn publish(&self, event: &VideoStatusEvent) -> QueueResult<()> {
        StatusChannel::publish(self, event).await
    }
}

/// An event the publisher rejected.
#[derive(Debug)]
pub struct DispatchFailure {
    pub event: VideoStatusEvent,
    pub error: String,
}

/// Sending half handed to the pipeline.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    tx: Option<mpsc::Sender<VideoStatusEvent>>,
}

impl EventDispatcher {
    /// Start the publishing task.
    ///
    /// Returns the dispatcher, the failure receiver and the task handle. The
    /// task ends once every dispatcher clone is dropped.
    pub fn spawn(
        publisher: Arc<dyn StatusPublisher>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<DispatchFailure>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<VideoStatusEvent>(capacity.max(1));
        let (err_tx, err_rx) = mpsc::channel::<DispatchFailure>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = publisher.publish(&event).await {
                    let failure = DispatchFailure {
                        event,
                        error: e.to_string(),
                    };
                    if let Err(mpsc::error::TrySendError::Full(failure)) = err_tx.try_send(failure) {
                        warn!(
                            video_id = %failure.event.video_id,
                            "Status event failed and error channel is full: {}",
                            failure.error
                        );
                    }
                }
            }
            debug!("Status event dispatcher stopped");
        });

        (Self { tx: Some(tx) }, err_rx, handle)
    }

    /// A dispatcher that discards every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue an event without waiting. A full buffer drops it.
    pub fn submit(&self, event: VideoStatusEvent) {
        let Some(tx) = &self.tx else {
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                metrics::record_event_dropped();
                warn!(
                    video_id = %event.video_id,
                    status = %event.status,
                    "Status event buffer full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                debug!(video_id = %event.video_id, "Status event dispatcher closed");
            }
        }
    }
}

/// Log and count publish failures until the dispatcher shuts down.
pub async fn drain_failures(mut failures: mpsc::Receiver<DispatchFailure>) {
    while let Some(failure) = failures.recv().await {
        metrics::record_event_failed();
        warn!(
            video_id = %failure.event.video_id,
            status = %failure.event.status,
            "Failed to publish status event: {}",
            failure.error
        );
    }
}
