//! Reactive backfill of freshly created mirror rooms.
//!
//! Replays up to the last 50 source messages in chronological order through
//! the message-processing collaborator, skipping ids already marked
//! processed and pacing successive replays to respect platform rate limits.
//! One failed replay is logged and never aborts the remainder of the batch.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::constants::{events, system};
use crate::events::EventPublisher;
use crate::models::ChannelMapping;
use crate::platform::{SourcePlatform, SourceWorkspace};
use crate::services::{MessageProcessor, ProcessedMessageIndex};

/// Tuning for backfill batches
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Cap on replayed messages per batch
    pub limit: usize,
    /// Fixed delay between successive replays
    pub pacing: Duration,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            limit: system::MAX_BACKFILL_MESSAGES,
            pacing: Duration::from_millis(system::BACKFILL_PACING_MS),
        }
    }
}

/// Replays recent source history into a newly created mirror room
pub struct BackfillRunner {
    source: Arc<dyn SourcePlatform>,
    processor: Arc<dyn MessageProcessor>,
    processed: Arc<dyn ProcessedMessageIndex>,
    publisher: EventPublisher,
    config: BackfillConfig,
}

impl BackfillRunner {
    pub fn new(
        source: Arc<dyn SourcePlatform>,
        processor: Arc<dyn MessageProcessor>,
        processed: Arc<dyn ProcessedMessageIndex>,
        publisher: EventPublisher,
        config: BackfillConfig,
    ) -> Self {
        Self {
            source,
            processor,
            processed,
            publisher,
            config,
        }
    }

    /// Fetch and replay the recent history of one source entity
    pub async fn backfill(
        &self,
        source_channel_id: &str,
        mirror_entity: &ChannelMapping,
        source_workspace: &SourceWorkspace,
    ) {
        let mut messages = match self
            .source
            .recent_messages(source_channel_id, self.config.limit)
            .await
        {
            Ok(messages) => messages,
            Err(err) => {
                warn!(
                    source_channel_id,
                    error = %err,
                    "Backfill fetch failed, room starts empty"
                );
                return;
            }
        };

        messages.truncate(self.config.limit);
        // The platform serves newest first; replay must be chronological.
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        self.publisher.publish(
            events::BACKFILL_STARTED,
            serde_json::json!({
                "source_channel_id": source_channel_id,
                "mirror_id": mirror_entity.mirror_id,
                "batch_size": messages.len(),
            }),
        );

        let mut replayed = 0usize;
        let mut skipped = 0usize;
        for message in &messages {
            if self.processed.is_processed(&message.id).await {
                skipped += 1;
                continue;
            }
            if let Err(err) = self
                .processor
                .process_message(message, mirror_entity, source_workspace)
                .await
            {
                warn!(
                    message_id = %message.id,
                    source_channel_id,
                    error = %err,
                    "Backfill replay failed for one message, continuing"
                );
            } else {
                replayed += 1;
            }
            tokio::time::sleep(self.config.pacing).await;
        }

        info!(
            source_channel_id,
            mirror_id = %mirror_entity.mirror_id,
            replayed,
            skipped,
            "⏪ Backfill batch completed"
        );
        self.publisher.publish(
            events::BACKFILL_COMPLETED,
            serde_json::json!({
                "source_channel_id": source_channel_id,
                "mirror_id": mirror_entity.mirror_id,
                "replayed": replayed,
                "skipped": skipped,
            }),
        );
        debug!(source_channel_id, "Backfill runner idle");
    }
}
