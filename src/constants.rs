//! # System Constants
//!
//! Core constants and operational defaults that define the boundaries of the
//! mirroring system: lifecycle event names, placeholder mapping markers, and
//! the fixed timing values used by the fetch, resolver, and session layers.

/// Lifecycle events published on the [`crate::events::EventPublisher`]
pub mod events {
    // Session lifecycle
    pub const SESSION_CONNECTED: &str = "session.connected";
    pub const SESSION_DISRUPTED: &str = "session.disrupted";
    pub const SESSION_RECONNECT_SCHEDULED: &str = "session.reconnect_scheduled";
    pub const SESSION_STOPPED: &str = "session.stopped";

    // Mirror structure lifecycle
    pub const MIRROR_ROOM_CREATED: &str = "mirror.room_created";
    pub const MIRROR_ROOM_RENAMED: &str = "mirror.room_renamed";
    pub const MIRROR_MAPPING_BLACKLISTED: &str = "mirror.mapping_blacklisted";
    pub const MIRROR_RESYNC_TRIGGERED: &str = "mirror.resync_triggered";

    // Backfill lifecycle
    pub const BACKFILL_STARTED: &str = "backfill.started";
    pub const BACKFILL_COMPLETED: &str = "backfill.completed";
}

/// Placeholder markers for in-flight or failed mapping creation.
///
/// A mapping carrying one of these values must never be treated as resolved.
pub mod placeholder {
    /// Bare placeholder written by legacy registrations
    pub const PENDING: &str = "pending";
    /// Prefix for keyed placeholders written while creation is in flight
    pub const PENDING_PREFIX: &str = "pending_";
}

/// Fixed operational defaults.
///
/// Retry and reconnect delays are deliberately per-call-site fixed values
/// rather than a unified exponential policy.
pub mod system {
    /// Per-request timeout for outbound REST calls
    pub const REQUEST_TIMEOUT_SECS: u64 = 15;
    /// Delay before retrying after an HTTP 429
    pub const RATE_LIMIT_RETRY_DELAY_MS: u64 = 3_000;
    /// Delay before retrying other transient fetch failures
    pub const TRANSIENT_RETRY_DELAY_MS: u64 = 1_500;
    /// Default retry budget for outbound fetches
    pub const DEFAULT_MAX_FETCH_RETRIES: u32 = 3;
    /// Upper bound for the jittered pre-request delay
    pub const PRE_REQUEST_JITTER_MS: u64 = 250;

    /// TTL for negative (403/404) per-entity fetch results
    pub const FAILED_ENTITY_TTL_SECS: u64 = 30 * 60;
    /// TTL for deduplicated error notifications
    pub const NOTIFIED_ERROR_TTL_SECS: u64 = 60 * 60;
    /// Maximum entries held by the resolution cache
    pub const RESOLUTION_CACHE_MAX_ENTRIES: usize = 1_000;
    /// Maximum entries held by the failed-entity cache
    pub const FAILED_ENTITY_CACHE_MAX_ENTRIES: usize = 500;
    /// Lock-set size beyond which the maintenance sweep force-clears it
    pub const PENDING_LOCK_LEAK_THRESHOLD: usize = 200;
    /// Cadence of the resolver maintenance sweep
    pub const MAINTENANCE_SWEEP_INTERVAL_SECS: u64 = 10 * 60;

    /// Reconnect delay after a connection-reset-family error
    pub const RECONNECT_ERROR_DELAY_SECS: u64 = 30;
    /// Reconnect delay after a clean disconnect
    pub const RECONNECT_DISCONNECT_DELAY_SECS: u64 = 15;
    /// Cadence of the session heartbeat check
    pub const HEARTBEAT_INTERVAL_SECS: u64 = 60;

    /// Maximum messages replayed per backfill batch
    pub const MAX_BACKFILL_MESSAGES: usize = 50;
    /// Pacing delay between successive backfill replays
    pub const BACKFILL_PACING_MS: u64 = 750;
}
