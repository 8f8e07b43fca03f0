//! Structural write access to the mirror workspace.
//!
//! Implemented outside the core by the bot layer that holds the mirror-side
//! credentials. Name searches return every candidate; kind compatibility is
//! decided by the resolver.

use async_trait::async_trait;

use crate::error::Result;
use crate::platform::types::{MirrorRoom, NewMirrorRoom};

#[async_trait]
pub trait MirrorGateway: Send + Sync {
    /// Create a channel, category, thread, or forum post on the mirror side
    async fn create_room(&self, workspace_id: &str, room: NewMirrorRoom) -> Result<MirrorRoom>;

    /// Rename an existing mirror room
    async fn rename_room(&self, workspace_id: &str, room_id: &str, name: &str) -> Result<()>;

    /// Every mirror room carrying exactly this name
    async fn rooms_named(&self, workspace_id: &str, name: &str) -> Result<Vec<MirrorRoom>>;

    /// Live threads currently open under a mirror parent room
    async fn active_threads(&self, workspace_id: &str, parent_id: &str) -> Result<Vec<MirrorRoom>>;

    /// Whether the mirror workspace can host forum channels
    async fn supports_forums(&self, workspace_id: &str) -> Result<bool>;
}
