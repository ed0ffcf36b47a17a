//! Video status events via Redis Pub/Sub.

use redis::AsyncCommands;
use tracing::debug;

use vshare_models::VideoStatusEvent;

use crate::error::QueueResult;

/// Channel for publishing/subscribing to per-user status events.
pub struct StatusChannel {
    client: redis::Client,
}

impl StatusChannel {
    /// Create a new status channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get the channel name for a user.
    pub fn channel_name(user_id: &str) -> String {
        format!("video-status:{}", user_id)
    }

    /// Publish a status event to its owner's channel.
    pub async fn publish(&self, event: &VideoStatusEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&event.user_id);
        let payload = serde_json::to_string(event)?;

        debug!("Publishing {} for {} to {}", event.status, event.video_id, channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    /// Subscribe to status events for a user.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
        user_id: &str,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = VideoStatusEvent> + Send>>> {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(Self::channel_name(user_id)).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}
