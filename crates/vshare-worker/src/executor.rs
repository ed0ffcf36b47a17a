//! Job executor.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vshare_queue::{JobQueue, QueueMessage};

use crate::config::WorkerConfig;
use crate::consumer::{handle_batch, GroupConsumer};
use crate::error::WorkerResult;
use crate::events::{drain_failures, DispatchFailure};
use crate::metrics;
use crate::pipeline::ThumbnailPipeline;

/// Pulls batches from the queue and runs them through the pipeline.
pub struct JobExecutor {
    config: WorkerConfig,
    consumer: Arc<GroupConsumer>,
    pipeline: Arc<ThumbnailPipeline>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    dispatch_failures: Mutex<Option<mpsc::Receiver<DispatchFailure>>>,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue, pipeline: ThumbnailPipeline) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            consumer: Arc::new(GroupConsumer::new(Arc::new(queue), consumer_name)),
            pipeline: Arc::new(pipeline),
            job_semaphore,
            shutdown,
            dispatch_failures: Mutex::new(None),
        }
    }

    /// Drain status-event publish failures while running.
    pub fn with_dispatch_failures(self, failures: mpsc::Receiver<DispatchFailure>) -> Self {
        if let Ok(mut slot) = self.dispatch_failures.lock() {
            *slot = Some(failures);
        }
        self
    }

    pub fn consumer_name(&self) -> &str {
        self.consumer.name()
    }

    /// Run until [`JobExecutor::shutdown`] is called.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer.name(),
            self.config.max_concurrent_jobs
        );

        self.consumer.queue().init().await?;

        let failures = self.dispatch_failures.lock().ok().and_then(|mut slot| slot.take());
        let drain_task = failures.map(|rx| tokio::spawn(drain_failures(rx)));

        let claim_task = tokio::spawn(Self::claim_loop(
            Arc::clone(&self.consumer),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.job_semaphore),
            self.config.batch_size,
            self.config.claim_interval,
            self.shutdown.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_batch() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}; their messages will be redelivered",
                self.config.shutdown_timeout
            );
        }

        if let Some(task) = drain_task {
            task.abort();
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Receive one batch and hand it to a task holding one permit.
    async fn consume_batch(&self) -> WorkerResult<()> {
        let Ok(permit) = Arc::clone(&self.job_semaphore).acquire_owned().await else {
            return Ok(());
        };

        let messages = self
            .consumer
            .queue()
            .receive(self.consumer.name(), self.config.batch_size)
            .await?;
        if messages.is_empty() {
            return Ok(());
        }

        debug!("Received {} messages", messages.len());
        for _ in &messages {
            metrics::record_job_received("new");
        }

        Self::spawn_batch(Arc::clone(&self.consumer), Arc::clone(&self.pipeline), messages, permit);
        Ok(())
    }

    /// Periodically take over messages left pending too long.
    async fn claim_loop(
        consumer: Arc<GroupConsumer>,
        pipeline: Arc<ThumbnailPipeline>,
        semaphore: Arc<Semaphore>,
        batch_size: usize,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                        break;
                    };
                    match consumer.queue().claim_stale(consumer.name(), batch_size).await {
                        Ok(messages) if !messages.is_empty() => {
                            info!("Claimed {} stale messages", messages.len());
                            for _ in &messages {
                                metrics::record_job_received("claimed");
                            }
                            Self::spawn_batch(Arc::clone(&consumer), Arc::clone(&pipeline), messages, permit);
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Failed to claim stale messages: {}", e),
                    }
                }
            }
        }
    }

    fn spawn_batch(
        consumer: Arc<GroupConsumer>,
        pipeline: Arc<ThumbnailPipeline>,
        messages: Vec<QueueMessage>,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        tokio::spawn(async move {
            let _permit = permit;
            handle_batch(&pipeline, consumer.as_ref(), &messages).await;
        });
    }

    /// Wait for all in-flight batches to complete.
    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
