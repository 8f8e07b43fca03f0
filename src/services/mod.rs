//! # Collaborator Interfaces
//!
//! External collaborators consumed by the core: error notification, the
//! auto-recovery workflow, message processing, the processed-message index,
//! and the append-only audit log. All are `async_trait` seams implemented
//! outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::ChannelMapping;
use crate::platform::{SourceMessage, SourceWorkspace};

/// Reason attached to an error notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyReason {
    NotFound,
    PermissionDenied,
}

impl fmt::Display for NotifyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::PermissionDenied => write!(f, "permission_denied"),
        }
    }
}

/// Fire-and-forget operator notifications.
///
/// The returned message id, when the sink produces one, is handed to the
/// auto-recovery workflow so it can annotate the notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_error_notification(
        &self,
        mirror_workspace_id: &str,
        source_id: &str,
        name: Option<&str>,
        reason: NotifyReason,
    ) -> Option<String>;
}

/// External auto-recovery workflow for persistently unresolvable entities
#[async_trait]
pub trait AutoRecoveryService: Send + Sync {
    /// Whether a recovery run is already in flight for this key
    async fn is_recovering(&self, source_id: &str, mirror_workspace_id: &str) -> bool;

    async fn start_recovery(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        mirror_workspace_id: &str,
        notification_message_id: Option<String>,
    );
}

/// Content-side collaborator that transforms and re-uploads one message.
///
/// Idempotent; the session pre-filters ids the index already marks processed.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process_message(
        &self,
        message: &SourceMessage,
        mirror_entity: &ChannelMapping,
        source_workspace: &SourceWorkspace,
    ) -> crate::error::Result<()>;
}

/// Lookup of message ids that already went through the processor
#[async_trait]
pub trait ProcessedMessageIndex: Send + Sync {
    async fn is_processed(&self, message_id: &str) -> bool;
}

/// Append-only, best-effort audit log; implementations must not block the
/// caller on delivery
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log_new_room(&self, mirror_workspace_id: &str, room_name: &str, mirror_id: &str);

    async fn log_admin_action(&self, mirror_workspace_id: &str, action: &str, detail: &str);
}

/// No-op audit logger for deployments without an audit sink
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditLogger;

#[async_trait]
impl AuditLogger for NullAuditLogger {
    async fn log_new_room(&self, _mirror_workspace_id: &str, _room_name: &str, _mirror_id: &str) {}

    async fn log_admin_action(&self, _mirror_workspace_id: &str, _action: &str, _detail: &str) {}
}
