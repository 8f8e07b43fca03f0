//! # Event System
//!
//! Broadcast publisher for lifecycle events. Decouples the resolver's
//! structural signals (room created, mapping blacklisted) from the session
//! side that reacts to them, most importantly the backfill trigger.

pub mod publisher;

pub use publisher::{EventPublisher, PublishedEvent};
