#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # GuildMirror Core
//!
//! Rust core for replicating the channel/category/role/thread topology and
//! message stream of a source workspace onto a separate mirror workspace,
//! without the platform's native cross-server tooling.
//!
//! ## Overview
//!
//! The hard problem is keeping a consistent, self-healing correspondence
//! between source-side and mirror-side entities under an unreliable,
//! partially observable, rate-limited external system, while a long-lived
//! event-ingestion session survives disconnects. Two components carry that
//! weight:
//!
//! - the **Entity Correspondence Resolver** owns the mapping cache, the
//!   persistent store adapter, auto-creation, auto-repair, blacklisting, and
//!   notification dedup;
//! - the **Session Manager** owns one ingestion session per mirror
//!   workspace, turns platform events into structural and content triggers,
//!   and drives reactive backfill.
//!
//! Supporting them: a rate-limited fetch layer with a fixed transient-retry
//! whitelist, and a structural replicator that creates mirror-side rooms on
//! demand.
//!
//! ## Module Organization
//!
//! - [`resolver`] - Entity correspondence resolution, caching, and repair
//! - [`session`] - Session lifecycle, dispatch, reconnection, and backfill
//! - [`fetch`] - Retrying, header-rotating outbound REST layer
//! - [`replicator`] - Mirror-side structural creation
//! - [`platform`] - Traits for the source reader, mirror gateway, transport
//! - [`models`] - Mapping rows and the entity-kind enum
//! - [`database`] - Abstract mapping store and its PostgreSQL backend
//! - [`services`] - External collaborator interfaces
//! - [`events`] - Lifecycle event publisher
//! - [`config`] - Environment-aware YAML configuration
//! - [`error`] - Structured error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use guildmirror_core::config::ConfigManager;
//! use guildmirror_core::database::PgMappingStore;
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! guildmirror_core::logging::init_structured_logging();
//! let manager = ConfigManager::load()?;
//! let pool = PgPool::connect(&manager.config().database.url).await?;
//! let store = PgMappingStore::new(pool);
//! store.ensure_schema().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod events;
pub mod fetch;
pub mod logging;
pub mod models;
pub mod platform;
pub mod replicator;
pub mod resolver;
pub mod services;
pub mod session;
pub mod test_helpers;
pub mod utils;

pub use config::{ConfigManager, GuildMirrorConfig};
pub use error::{MirrorError, Result};
pub use events::EventPublisher;
pub use fetch::{FailedEntityCache, FetchConfig, FetchError, RateLimitedFetcher};
pub use models::{ChannelMapping, EntityKind, MappingKey, RoleMapping};
pub use resolver::{EntityResolver, ResolutionMode, ResolverConfig};
pub use session::{SessionRegistry, SessionState};
