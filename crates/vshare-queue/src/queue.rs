//! Job queue using Redis Streams.
//!
//! Delivery is at-least-once: a message stays pending in the consumer group
//! until it is acknowledged. Failed messages are left pending and picked up
//! again by [`JobQueue::claim_stale`] once idle long enough, until the
//! delivery budget is spent and the message is dead-lettered.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::envelope::{GenerateThumbsJob, JobEnvelope};
use crate::error::{QueueError, QueueResult};

/// Stream field holding the envelope body.
const BODY_FIELD: &str = "body";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Deliveries allowed before a message is dead-lettered
    pub max_deliveries: u32,
    /// Idle time before a pending message is redelivered
    pub claim_min_idle: Duration,
    /// How long a receive blocks waiting for new messages
    pub block: Duration,
    /// TTL of producer dedup keys
    pub dedup_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vshare:jobs".to_string(),
            consumer_group: "vshare:thumb-workers".to_string(),
            dlq_stream_name: "vshare:dlq".to_string(),
            max_deliveries: 5,
            claim_min_idle: Duration::from_secs(1800),
            block: Duration::from_secs(5),
            dedup_ttl: Duration::from_secs(600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_deliveries: std::env::var("QUEUE_MAX_DELIVERIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_deliveries),
            claim_min_idle: std::env::var("QUEUE_CLAIM_MIN_IDLE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_min_idle),
            block: defaults.block,
            dedup_ttl: defaults.dedup_ttl,
        }
    }
}

/// One delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Stream entry ID
    pub id: String,
    /// Raw envelope body; empty if the entry has no body field
    pub body: Vec<u8>,
    /// How many times this message has been delivered, including this one
    pub delivery: u32,
}

/// What [`JobQueue::release`] did with a failed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Left pending for redelivery.
    Retry { failures: u32 },
    /// Delivery budget spent; moved to the dead letter stream.
    DeadLettered,
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue a thumbnail job for a video.
    ///
    /// Identical enqueues within the dedup window are rejected with
    /// [`QueueError::Duplicate`].
    pub async fn enqueue_generate_thumbs(&self, job: &GenerateThumbsJob) -> QueueResult<String> {
        let body = JobEnvelope::generate_thumbs(job).encode()?;
        self.enqueue(&job.idempotency_key(), &body).await
    }

    async fn enqueue(&self, idempotency_key: &str, body: &[u8]) -> QueueResult<String> {
        let mut conn = self.connection().await?;

        let dedup_key = format!("vshare:dedup:{}", idempotency_key);
        let fresh: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs())
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !fresh {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::Duplicate(idempotency_key.to_string()));
        }

        let added: Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg(BODY_FIELD)
            .arg(body)
            .query_async(&mut conn)
            .await;

        let message_id = match added {
            Ok(id) => id,
            Err(e) => {
                // let the producer try again right away
                conn.del::<_, ()>(&dedup_key).await.ok();
                return Err(QueueError::enqueue_failed(e.to_string()));
            }
        };

        info!("Enqueued {} with message ID {}", idempotency_key, message_id);
        Ok(message_id)
    }

    /// Drop the dedup key so the same job can be enqueued again.
    pub async fn clear_dedup(&self, job: &GenerateThumbsJob) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(format!("vshare:dedup:{}", job.idempotency_key()))
            .await?;
        Ok(())
    }

    /// Read up to `count` new messages for this consumer.
    pub async fn receive(&self, consumer_name: &str, count: usize) -> QueueResult<Vec<QueueMessage>> {
        let mut conn = self.connection().await?;

        let result: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(self.config.block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut messages = Vec::new();
        for stream_key in result.map(|r| r.keys).unwrap_or_default() {
            for entry in stream_key.ids {
                messages.push(QueueMessage {
                    body: entry_body(&entry),
                    id: entry.id,
                    delivery: 1,
                });
            }
        }

        if !messages.is_empty() {
            debug!("Received {} messages", messages.len());
        }
        Ok(messages)
    }

    /// Claim pending messages idle longer than the configured threshold.
    ///
    /// Covers both crashed consumers and attempts released for retry.
    pub async fn claim_stale(&self, consumer_name: &str, count: usize) -> QueueResult<Vec<QueueMessage>> {
        let mut conn = self.connection().await?;
        let min_idle_ms = self.config.claim_min_idle.as_millis() as u64;

        let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let stale = pending.ids;
        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms);
        for p in &stale {
            cmd.arg(&p.id);
        }
        let claimed: redis::streams::StreamClaimReply = cmd.query_async(&mut conn).await?;

        let mut messages = Vec::new();
        for entry in claimed.ids {
            // XCLAIM bumps the delivery counter
            let delivery = stale
                .iter()
                .find(|p| p.id == entry.id)
                .map(|p| p.times_delivered as u32 + 1)
                .unwrap_or(1);
            info!("Claimed stale message {} (delivery {})", entry.id, delivery);
            messages.push(QueueMessage {
                body: entry_body(&entry),
                id: entry.id,
                delivery,
            });
        }

        // entries deleted from the stream while pending can never be processed
        for p in stale.iter().filter(|p| !messages.iter().any(|m| m.id == p.id)) {
            debug!("Dropping pending entry {} with no stream data", p.id);
            self.ack(&p.id).await.ok();
        }

        Ok(messages)
    }

    /// Confirm `consumer_name` still owns a pending message and reset its
    /// idle time.
    ///
    /// Returns `false` when the message was claimed by another consumer or
    /// is no longer pending; the caller must then leave it alone.
    pub async fn reserve(&self, consumer_name: &str, message_id: &str) -> QueueResult<bool> {
        let mut conn = self.connection().await?;

        let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .arg(message_id)
            .arg(1)
            .query_async(&mut conn)
            .await?;

        let owner = pending.ids.first().map(|p| p.consumer.as_str());
        if owner != Some(consumer_name) {
            info!(
                "Message {} is now owned by {}, skipping",
                message_id,
                owner.unwrap_or("nobody")
            );
            return Ok(false);
        }

        // JUSTID resets idle time without bumping the delivery counter
        let claimed: Vec<String> = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(0)
            .arg(message_id)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await?;

        Ok(!claimed.is_empty())
    }

    /// Acknowledge a message and delete it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        conn.del::<_, ()>(retry_key(message_id)).await?;

        debug!("Acknowledged message: {}", message_id);
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// The message stays pending for redelivery until `max_deliveries`
    /// failures, after which it is moved to the dead letter stream.
    pub async fn release(&self, message: &QueueMessage, error: &str) -> QueueResult<ReleaseOutcome> {
        let failures = self.increment_retry(&message.id).await?;

        if failures < self.config.max_deliveries {
            debug!(
                "Message {} failed ({}/{}), left pending",
                message.id, failures, self.config.max_deliveries
            );
            return Ok(ReleaseOutcome::Retry { failures });
        }

        self.dead_letter(message, error).await?;
        Ok(ReleaseOutcome::DeadLettered)
    }

    /// Move a message to the dead letter stream.
    pub async fn dead_letter(&self, message: &QueueMessage, error: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg(BODY_FIELD)
            .arg(&message.body)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&message.id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(&message.id).await?;

        warn!("Moved message {} to DLQ: {}", message.id, error);
        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.connection().await?;

        let key = retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, 86400).await?;
        Ok(count)
    }
}

fn retry_key(message_id: &str) -> String {
    format!("vshare:retry:{}", message_id)
}

fn entry_body(entry: &redis::streams::StreamId) -> Vec<u8> {
    match entry.map.get(BODY_FIELD) {
        Some(redis::Value::BulkString(bytes)) => bytes.clone(),
        Some(redis::Value::SimpleString(s)) => s.clone().into_bytes(),
        _ => Vec::new(),
    }
}
