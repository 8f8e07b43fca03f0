//! # Data Model Layer
//!
//! Persisted mapping rows and the closed entity-kind enum shared across the
//! resolver, replicator, and session layers.

pub mod channel_mapping;
pub mod entity_kind;
pub mod mapping_key;
pub mod role_mapping;

pub use channel_mapping::{inaccessible_name, is_placeholder, ChannelMapping, NewChannelMapping};
pub use entity_kind::EntityKind;
pub use mapping_key::MappingKey;
pub use role_mapping::{NewRoleMapping, RoleMapping};
