use serde_json::Value;
use tokio::sync::broadcast;

use crate::constants::events;

/// Broadcast publisher for mirroring lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event with the given name and context
    pub fn publish(&self, event_name: impl Into<String>, context: Value) {
        let event = PublishedEvent {
            name: event_name.into(),
            context,
            published_at: chrono::Utc::now(),
        };

        // send() errors when no subscriber is attached; publishing into the
        // void is fine here.
        let _ = self.sender.send(event);
    }

    /// Signal that a mirror room was created reactively; the session side
    /// picks this up to drive backfill
    pub fn publish_room_created(
        &self,
        mirror_workspace_id: &str,
        source_id: &str,
        source_workspace_id: &str,
        mirror_id: &str,
    ) {
        self.publish(
            events::MIRROR_ROOM_CREATED,
            serde_json::json!({
                "mirror_workspace_id": mirror_workspace_id,
                "source_id": source_id,
                "source_workspace_id": source_workspace_id,
                "mirror_id": mirror_id,
            }),
        );
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_room_created_reaches_subscriber() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();

        publisher.publish_room_created("mw", "src", "sw", "mid");

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.name, events::MIRROR_ROOM_CREATED);
        assert_eq!(event.context["source_id"], "src");
        assert_eq!(event.context["mirror_id"], "mid");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let publisher = EventPublisher::new(4);
        publisher.publish("anything", serde_json::json!({}));
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
