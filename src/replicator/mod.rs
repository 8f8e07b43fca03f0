//! # Structural Replicator
//!
//! Creates mirror-side channels, categories, threads, and forum posts on
//! demand. Invoked only by the resolver; content replication never goes
//! through here.
//!
//! Forum handling: a workspace without forum support gets a plain text
//! channel instead, so a forum post always has a live parent to land under.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::events::EventPublisher;
use crate::models::EntityKind;
use crate::platform::{MirrorGateway, MirrorRoom, NewMirrorRoom, SourceChannel};
use crate::services::AuditLogger;

pub struct StructuralReplicator {
    gateway: Arc<dyn MirrorGateway>,
    publisher: EventPublisher,
    audit: Arc<dyn AuditLogger>,
}

impl StructuralReplicator {
    pub fn new(
        gateway: Arc<dyn MirrorGateway>,
        publisher: EventPublisher,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self {
            gateway,
            publisher,
            audit,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn MirrorGateway> {
        &self.gateway
    }

    /// Create the mirror counterpart of a source entity and record it in the
    /// audit log.
    ///
    /// The resolver announces the room once its mapping row is persisted, so
    /// backfill always sees a resolved mapping.
    pub async fn create_room(
        &self,
        mirror_workspace_id: &str,
        source: &SourceChannel,
        mut room: NewMirrorRoom,
    ) -> Result<MirrorRoom> {
        if room.kind == EntityKind::Forum && !self.forums_supported(mirror_workspace_id).await {
            warn!(
                mirror_workspace_id,
                room_name = %room.name,
                "Mirror workspace lacks forum support, creating a text channel instead"
            );
            room.kind = EntityKind::Text;
        }

        let created = self.gateway.create_room(mirror_workspace_id, room).await?;

        info!(
            mirror_workspace_id,
            source_id = %source.id,
            mirror_id = %created.id,
            room_name = %created.name,
            kind = %created.kind,
            "🏗️ Mirror room created"
        );

        self.audit
            .log_new_room(mirror_workspace_id, &created.name, &created.id)
            .await;

        Ok(created)
    }

    /// Best-effort rename of an existing mirror room
    pub async fn rename_room(
        &self,
        mirror_workspace_id: &str,
        mirror_id: &str,
        name: &str,
    ) -> Result<()> {
        self.gateway
            .rename_room(mirror_workspace_id, mirror_id, name)
            .await?;
        self.publisher.publish(
            crate::constants::events::MIRROR_ROOM_RENAMED,
            serde_json::json!({
                "mirror_workspace_id": mirror_workspace_id,
                "mirror_id": mirror_id,
                "name": name,
            }),
        );
        Ok(())
    }

    async fn forums_supported(&self, mirror_workspace_id: &str) -> bool {
        match self.gateway.supports_forums(mirror_workspace_id).await {
            Ok(supported) => supported,
            Err(err) => {
                warn!(
                    mirror_workspace_id,
                    error = %err,
                    "Forum support probe failed, assuming unsupported"
                );
                false
            }
        }
    }
}
