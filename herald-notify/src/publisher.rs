//! Real-time push channels
//!
//! A [`Publisher`] is best effort. The persisted [`NotificationRecord`] is
//! what the inbox reads, so a push that never arrives loses nothing.

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use herald_common::{UserId, tracing::trace};
use tokio::sync::broadcast;

use crate::{
    error::PublishError,
    record::{NotificationRecord, channel_for},
};

const fn default_channel_capacity() -> usize {
    64
}

#[async_trait]
pub trait Publisher: Send + Sync + Debug {
    /// Push one notification to `channel`
    async fn publish(
        &self,
        channel: &str,
        notification: &NotificationRecord,
    ) -> Result<(), PublishError>;
}

/// In-process publisher backed by one tokio broadcast channel per user
///
/// Channels are created on first subscription and dropped once a publish
/// finds every receiver gone.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    channels: Arc<DashMap<String, broadcast::Sender<NotificationRecord>>>,
    capacity: usize,
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::with_capacity(default_channel_capacity())
    }
}

impl BroadcastPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Each channel buffers up to `capacity` pushes for slow subscribers
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Listen on a user's private channel
    #[must_use]
    pub fn subscribe(&self, recipient: &UserId) -> broadcast::Receiver<NotificationRecord> {
        self.channels
            .entry(channel_for(recipient))
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Number of channels with a live sender
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl Publisher for BroadcastPublisher {
    async fn publish(
        &self,
        channel: &str,
        notification: &NotificationRecord,
    ) -> Result<(), PublishError> {
        let Some(sender) = self.channels.get(channel).map(|entry| entry.clone()) else {
            return Err(PublishError::Offline(channel.to_string()));
        };

        match sender.send(notification.clone()) {
            Ok(receivers) => {
                trace!(channel, receivers, "Pushed notification");
                Ok(())
            }
            Err(_) => {
                self.channels
                    .remove_if(channel, |_, sender| sender.receiver_count() == 0);
                Err(PublishError::Offline(channel.to_string()))
            }
        }
    }
}

/// Publish with an upper bound on how long the publisher may take
pub(crate) async fn publish_with_timeout(
    publisher: &dyn Publisher,
    notification: &NotificationRecord,
    timeout: Duration,
) -> Result<(), PublishError> {
    tokio::time::timeout(timeout, publisher.publish(&notification.channel(), notification))
        .await
        .unwrap_or(Err(PublishError::Timeout(timeout)))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use herald_store::RecordId;

    use super::*;
    use crate::record::EventDescriptor;

    fn notification(recipient: &str) -> NotificationRecord {
        NotificationRecord::new(
            &EventDescriptor::new("kind", "title", "message"),
            UserId::from(recipient),
            RecordId::generate(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_subscriber_receives_push() {
        let publisher = BroadcastPublisher::new();
        let mut rx = publisher.subscribe(&UserId::from("u1"));
        let record = notification("u1");

        publisher
            .publish(&record.channel(), &record)
            .await
            .expect("subscriber is listening");

        assert_eq!(rx.recv().await.expect("pushed"), record);
    }

    #[tokio::test]
    async fn test_publish_without_subscriber_is_offline() {
        let publisher = BroadcastPublisher::new();
        let record = notification("nobody");

        assert_eq!(
            publisher.publish(&record.channel(), &record).await,
            Err(PublishError::Offline("private-user.nobody".to_string()))
        );
    }

    #[tokio::test]
    async fn test_dropped_subscriber_channel_is_removed() {
        let publisher = BroadcastPublisher::new();
        drop(publisher.subscribe(&UserId::from("gone")));
        assert_eq!(publisher.channel_count(), 1);

        let record = notification("gone");
        assert!(publisher.publish(&record.channel(), &record).await.is_err());
        assert_eq!(publisher.channel_count(), 0);
    }

    #[derive(Debug)]
    struct Hanging;

    #[async_trait]
    impl Publisher for Hanging {
        async fn publish(&self, _: &str, _: &NotificationRecord) -> Result<(), PublishError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_timeout() {
        let result =
            publish_with_timeout(&Hanging, &notification("u1"), Duration::from_secs(5)).await;
        assert_eq!(result, Err(PublishError::Timeout(Duration::from_secs(5))));
    }
}
