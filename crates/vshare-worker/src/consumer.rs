//! Queue consumer: decode envelopes, run the pipeline, settle messages.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info, warn, Instrument};

use vshare_queue::{
    decode_envelope, DecodedJob, EnvelopeError, GenerateThumbsJob, JobQueue, QueueMessage,
    ReleaseOutcome,
};

use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::{ProcessOutcome, ThumbnailPipeline};

/// What should happen to a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Done, or will never succeed; remove it.
    Ack,
    /// Leave it for redelivery.
    Retry { error: String },
    /// Remove it and keep a copy in the dead letter stream.
    DeadLetter { error: String },
}

/// Result of handling one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handled {
    /// The decoded job, when the envelope was a valid `generate-thumbs` job
    pub job: Option<GenerateThumbsJob>,
    pub disposition: Disposition,
}

impl Handled {
    fn ack(job: Option<GenerateThumbsJob>) -> Self {
        Self {
            job,
            disposition: Disposition::Ack,
        }
    }
}

/// Delivery-channel side of message handling.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Take ownership of `message` right before it is processed.
    ///
    /// `false` means another consumer holds it now and it must be skipped.
    async fn reserve(&self, message: &QueueMessage) -> bool;

    /// Apply a [`Disposition`].
    async fn settle(&self, message: &QueueMessage, handled: &Handled);
}

/// A [`JobQueue`] seen through one named consumer of its group.
pub struct GroupConsumer {
    queue: Arc<JobQueue>,
    name: String,
}

impl GroupConsumer {
    pub fn new(queue: Arc<JobQueue>, name: impl Into<String>) -> Self {
        Self {
            queue,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }
}

#[async_trait]
impl Acknowledger for GroupConsumer {
    async fn reserve(&self, message: &QueueMessage) -> bool {
        match self.queue.reserve(&self.name, &message.id).await {
            Ok(owned) => owned,
            Err(e) => {
                // settling will hit the same outage; process and let it redeliver
                warn!("Failed to reserve message {}: {}", message.id, e);
                true
            }
        }
    }

    async fn settle(&self, message: &QueueMessage, handled: &Handled) {
        let queue = self.queue.as_ref();
        let finished = match &handled.disposition {
            Disposition::Ack => {
                if let Err(e) = queue.ack(&message.id).await {
                    error!("Failed to ack message {}: {}", message.id, e);
                }
                true
            }
            Disposition::Retry { error } => match queue.release(message, error).await {
                Ok(ReleaseOutcome::Retry { failures }) => {
                    info!(
                        "Message {} will be redelivered (failure {}/{})",
                        message.id,
                        failures,
                        queue.config().max_deliveries
                    );
                    false
                }
                Ok(ReleaseOutcome::DeadLettered) => {
                    metrics::record_dead_lettered();
                    true
                }
                Err(e) => {
                    error!("Failed to release message {}: {}", message.id, e);
                    false
                }
            },
            Disposition::DeadLetter { error } => {
                metrics::record_dead_lettered();
                if let Err(e) = queue.dead_letter(message, error).await {
                    error!("Failed to dead-letter message {}: {}", message.id, e);
                }
                true
            }
        };

        // let the same video be enqueued again
        if let (true, Some(job)) = (finished, &handled.job) {
            if let Err(e) = queue.clear_dedup(job).await {
                warn!("Failed to clear dedup key for {}: {}", job.video_id, e);
            }
        }
    }
}

/// Decode one message and run the pipeline for it.
pub async fn handle_message(pipeline: &ThumbnailPipeline, message: &QueueMessage) -> Handled {
    let job = match decode_envelope(&message.body) {
        Ok(DecodedJob::GenerateThumbs(job)) => job,
        Ok(DecodedJob::Unknown(job_type)) => {
            info!(message_id = %message.id, job_type = %job_type, "Ignoring unknown job type");
            metrics::record_job_skipped("unknown_type");
            return Handled::ack(None);
        }
        Err(e) => {
            warn!(message_id = %message.id, "Dropping invalid envelope: {}", e);
            metrics::record_envelope_rejected(match e {
                EnvelopeError::Malformed(_) => "malformed",
                EnvelopeError::UnsupportedVersion { .. } => "version",
                EnvelopeError::InvalidPayload { .. } => "payload",
            });
            return Handled::ack(None);
        }
    };

    let logger = JobLogger::new(&message.id, "generate_thumbs");
    let span = logger.create_span();
    let video_id = job.video_id();
    let start = Instant::now();

    async {
        logger.log_start(&format!("video {} (delivery {})", video_id, message.delivery));
        if message.delivery > 1 {
            logger.log_warning(&format!("redelivered {} times", message.delivery - 1));
        }

        match pipeline.process_thumbnails(&video_id).await {
            Ok(outcome) => {
                let summary = match outcome {
                    ProcessOutcome::Completed { thumbnails } => format!("{} thumbnails", thumbnails),
                    ProcessOutcome::NotFound => "video not found".to_string(),
                    ProcessOutcome::AlreadyReady => "already ready".to_string(),
                };
                logger.log_completion(&format!("{} in {:?}", summary, start.elapsed()));
                Handled::ack(Some(job))
            }
            Err(e) => {
                metrics::record_job_failed(e.kind());
                logger.log_error(&e.to_string());
                let error = e.to_string();
                Handled {
                    job: Some(job),
                    disposition: if e.is_retryable() {
                        Disposition::Retry { error }
                    } else {
                        Disposition::DeadLetter { error }
                    },
                }
            }
        }
    }
    .instrument(span)
    .await
}

/// Counts of how a batch was settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub acked: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    /// Taken over by another consumer before their turn came
    pub skipped: usize,
}

/// Handle messages one after another, settling each before the next starts.
pub async fn handle_batch(
    pipeline: &ThumbnailPipeline,
    acker: &dyn Acknowledger,
    messages: &[QueueMessage],
) -> BatchSummary {
    let mut summary = BatchSummary::default();

    for message in messages {
        if !acker.reserve(message).await {
            summary.skipped += 1;
            continue;
        }
        let handled = handle_message(pipeline, message).await;
        match handled.disposition {
            Disposition::Ack => summary.acked += 1,
            Disposition::Retry { .. } => summary.retried += 1,
            Disposition::DeadLetter { .. } => summary.dead_lettered += 1,
        }
        acker.settle(message, &handled).await;
    }

    debug!(
        acked = summary.acked,
        retried = summary.retried,
        dead_lettered = summary.dead_lettered,
        skipped = summary.skipped,
        "Batch settled"
    );
    summary
}
