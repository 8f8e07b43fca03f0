use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChannelMapping, NewChannelMapping, NewRoleMapping, RoleMapping};

/// Abstract document-store interface over the persisted mapping rows.
///
/// All writes use upsert-by-natural-key semantics: a uniqueness violation is
/// resolved by merging into the existing row, never surfaced to the caller.
/// A non-placeholder mirror id always wins a merge; a placeholder never
/// overwrites a resolved id.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Find a channel mapping by its natural key
    async fn find_channel(
        &self,
        source_id: &str,
        source_workspace_id: &str,
    ) -> Result<Option<ChannelMapping>>;

    /// List every channel mapping recorded for a source workspace
    async fn channels_for_workspace(
        &self,
        source_workspace_id: &str,
    ) -> Result<Vec<ChannelMapping>>;

    /// Upsert a channel mapping by natural key, merging on conflict
    async fn upsert_channel(&self, new: NewChannelMapping) -> Result<ChannelMapping>;

    /// Persist a detected source-side rename
    async fn update_channel_name(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        name: &str,
    ) -> Result<()>;

    /// Mark a channel inaccessible; the row survives so resolution can
    /// short-circuit without re-probing
    async fn blacklist_channel(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        name: &str,
        reason: &str,
    ) -> Result<ChannelMapping>;

    /// Find a role mapping by its natural key
    async fn find_role(
        &self,
        source_id: &str,
        source_workspace_id: &str,
    ) -> Result<Option<RoleMapping>>;

    /// Name-match fallback for roles whose source id is unknown
    async fn find_role_by_name(
        &self,
        source_workspace_id: &str,
        name: &str,
    ) -> Result<Option<RoleMapping>>;

    /// Upsert a role mapping by natural key, merging on conflict
    async fn upsert_role(&self, new: NewRoleMapping) -> Result<RoleMapping>;
}
