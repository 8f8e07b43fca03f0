//! # Database Layer
//!
//! Abstract mapping-store interface and its PostgreSQL implementation.
//!
//! The resolver depends only on [`MappingStore`] find/upsert semantics, so
//! tests and alternative backends can swap the concrete store without
//! touching resolution logic.

pub mod postgres;
pub mod store;

pub use postgres::PgMappingStore;
pub use store::MappingStore;
