use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Persisted correspondence between a source role and its mirror-side role.
/// Maps to the `guildmirror_role_mappings` table.
///
/// When a source role id is unknown at lookup time the resolver falls back to
/// a name match within the same source workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RoleMapping {
    pub mirror_id: String,
    pub source_id: String,
    pub source_workspace_id: String,
    pub name: String,
    pub synced: bool,
    pub last_synced: DateTime<Utc>,
}

/// New role mapping for registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRoleMapping {
    pub mirror_id: String,
    pub source_id: String,
    pub source_workspace_id: String,
    pub name: String,
}
