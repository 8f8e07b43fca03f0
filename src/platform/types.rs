use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::EntityKind;

/// Source-side channel-family entity metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceChannel {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub kind: EntityKind,
    /// Category for channels, parent channel for threads and forum posts
    pub parent_id: Option<String>,
}

/// One source-side message, kept raw for the processing collaborator plus the
/// fields the core itself needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMessage {
    pub id: String,
    pub channel_id: String,
    pub timestamp: DateTime<Utc>,
    pub raw: serde_json::Value,
}

/// Reference snapshot of the source workspace held by a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceWorkspace {
    pub id: String,
    pub name: String,
}

/// Mirror-side entity as reported by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorRoom {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
}

/// Creation request handed to the mirror gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMirrorRoom {
    pub name: String,
    pub kind: EntityKind,
    /// Mirror-side category to file the room under
    pub category_id: Option<String>,
    /// Mirror-side parent for threads and forum posts
    pub parent_id: Option<String>,
}

impl NewMirrorRoom {
    pub fn channel(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
            category_id: None,
            parent_id: None,
        }
    }

    pub fn under_category(mut self, category_id: Option<String>) -> Self {
        self.category_id = category_id;
        self
    }

    pub fn under_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}
