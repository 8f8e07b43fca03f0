//! Shared utility containers.

pub mod bounded_cache;

pub use bounded_cache::BoundedCache;
