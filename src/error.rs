//! Error types for the mirroring core.

use thiserror::Error;

/// Top-level error taxonomy for the mirroring core.
///
/// Classification drives recovery: transient and rate-limit failures are
/// retried by the fetch layer, permission denials are terminal per entity,
/// unmapped entities trigger auto-creation, duplicate keys are merged in
/// place, and session disruptions are healed by a scheduled full rebuild.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MirrorError {
    #[error("Transient network error: {0}")]
    TransientNetwork(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Permission denied for entity {entity_id}")]
    PermissionDenied { entity_id: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Duplicate mapping key: {0}")]
    DuplicateKey(String),
    #[error("Session disruption: {0}")]
    SessionDisruption(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Replication error: {0}")]
    Replication(String),
}

impl MirrorError {
    /// Whether the fetch layer may retry the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MirrorError::TransientNetwork(_) | MirrorError::RateLimited(_)
        )
    }

    /// Whether this failure is terminal for the entity it concerns
    pub fn is_terminal_for_entity(&self) -> bool {
        matches!(self, MirrorError::PermissionDenied { .. })
    }
}

impl From<sqlx::Error> for MirrorError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                MirrorError::DuplicateKey(db.to_string())
            }
            _ => MirrorError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        MirrorError::Database(format!("JSON decode error: {err}"))
    }
}

impl From<crate::fetch::FetchError> for MirrorError {
    fn from(err: crate::fetch::FetchError) -> Self {
        use crate::fetch::FetchError;
        match err {
            FetchError::Status { code: 403, ref entity_id } => MirrorError::PermissionDenied {
                entity_id: entity_id.clone(),
            },
            FetchError::Status { code: 404, ref entity_id } => {
                MirrorError::NotFound(format!("entity {entity_id}"))
            }
            FetchError::Status { code: 429, .. } => MirrorError::RateLimited(err.to_string()),
            FetchError::Status { .. } => MirrorError::TransientNetwork(err.to_string()),
            FetchError::Timeout(_) | FetchError::Connection(_) | FetchError::Dns(_) => {
                MirrorError::TransientNetwork(err.to_string())
            }
            FetchError::Decode(_) => MirrorError::TransientNetwork(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
