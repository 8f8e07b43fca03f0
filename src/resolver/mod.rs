//! # Entity Correspondence Resolver
//!
//! Owns the mapping cache, the persistent-store adapter, auto-creation,
//! auto-repair, blacklisting, and error-notification dedup.
//!
//! ## Resolution order
//!
//! In-memory cache, then persistent store, then (when the caller allows
//! creation) access probe + mirror-side name search + creation through the
//! Structural Replicator, then the thread-specific parent path, then one
//! forced resynchronization pass, and finally a deduplicated failure
//! escalation. Expected failures never surface as errors; callers observe
//! `None` and retry later.

pub mod locks;
#[allow(clippy::module_inception)]
pub mod resolver;

pub use locks::{PendingCreationGuard, PendingCreationLocks};
pub use resolver::{EntityResolver, ResolutionMode, ResolverConfig};
