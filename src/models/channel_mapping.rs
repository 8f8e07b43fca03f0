use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::constants::placeholder;
use crate::models::entity_kind::EntityKind;

/// Persisted correspondence between a source channel-family entity and its
/// mirror-side counterpart. Maps to the `guildmirror_channel_mappings` table.
///
/// Natural key is `(source_id, source_workspace_id)`. Rows are created on
/// first successful resolution or explicit registration, updated on rename or
/// re-pointing, and never hard-deleted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ChannelMapping {
    pub mirror_id: String,
    pub source_id: String,
    pub source_workspace_id: String,
    pub name: String,
    pub kind_code: i16,
    pub category_id: Option<String>,
    pub blacklisted: bool,
    pub blacklist_reason: Option<String>,
    pub last_synced: DateTime<Utc>,
}

/// New mapping for registration (without store-maintained fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChannelMapping {
    pub mirror_id: String,
    pub source_id: String,
    pub source_workspace_id: String,
    pub name: String,
    pub kind_code: i16,
    pub category_id: Option<String>,
}

impl ChannelMapping {
    /// Whether the mirror id references a live mirror entity.
    ///
    /// Placeholder values written during in-flight or failed creation must
    /// never be treated as resolved.
    pub fn is_resolved(&self) -> bool {
        !self.blacklisted && !is_placeholder(&self.mirror_id)
    }

    /// Decoded entity kind, when the stored code is known
    pub fn kind(&self) -> Option<EntityKind> {
        u8::try_from(self.kind_code)
            .ok()
            .and_then(EntityKind::from_code)
    }
}

impl NewChannelMapping {
    /// Mapping registration with a keyed placeholder mirror id, written while
    /// creation is in flight
    pub fn pending(
        source_id: impl Into<String>,
        source_workspace_id: impl Into<String>,
        name: impl Into<String>,
        kind: EntityKind,
    ) -> Self {
        let source_id = source_id.into();
        Self {
            mirror_id: format!("{}{}", placeholder::PENDING_PREFIX, source_id),
            source_id,
            source_workspace_id: source_workspace_id.into(),
            name: name.into(),
            kind_code: i16::from(kind.code()),
            category_id: None,
        }
    }
}

/// Whether a mirror id value is one of the creation placeholders
pub fn is_placeholder(mirror_id: &str) -> bool {
    mirror_id == placeholder::PENDING || mirror_id.starts_with(placeholder::PENDING_PREFIX)
}

/// Blacklist row name for an entity the source side refuses to serve:
/// `inaccessible-<last 6 of source id>`
pub fn inaccessible_name(source_id: &str) -> String {
    let tail_start = source_id.len().saturating_sub(6);
    format!("inaccessible-{}", &source_id[tail_start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(mirror_id: &str) -> ChannelMapping {
        ChannelMapping {
            mirror_id: mirror_id.to_string(),
            source_id: "111222333444555666".to_string(),
            source_workspace_id: "999888777666555444".to_string(),
            name: "general".to_string(),
            kind_code: 0,
            category_id: None,
            blacklisted: false,
            blacklist_reason: None,
            last_synced: Utc::now(),
        }
    }

    #[test]
    fn test_placeholder_ids_are_not_resolved() {
        assert!(!mapping("pending").is_resolved());
        assert!(!mapping("pending_111222333444555666").is_resolved());
        assert!(mapping("777000111222333444").is_resolved());
    }

    #[test]
    fn test_blacklisted_mapping_is_not_resolved() {
        let mut m = mapping("777000111222333444");
        m.blacklisted = true;
        assert!(!m.is_resolved());
    }

    #[test]
    fn test_inaccessible_name_uses_id_tail() {
        assert_eq!(
            inaccessible_name("111222333444555666"),
            "inaccessible-555666"
        );
        assert_eq!(inaccessible_name("1234"), "inaccessible-1234");
    }

    #[test]
    fn test_pending_registration_carries_keyed_placeholder() {
        let new = NewChannelMapping::pending("42", "ws", "general", EntityKind::Text);
        assert_eq!(new.mirror_id, "pending_42");
        assert!(is_placeholder(&new.mirror_id));
    }
}
