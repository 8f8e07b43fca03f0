use serde::{Deserialize, Serialize};
use std::fmt;

/// Key for the transient keyed containers (resolution cache, pending-creation
/// locks, notification dedup).
///
/// The mapping store's natural key pairs a source id with the source
/// workspace; the lock and dedup sets pair it with the mirror workspace. Both
/// shapes share this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingKey {
    pub source_id: String,
    pub workspace_id: String,
}

impl MappingKey {
    pub fn new(source_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            workspace_id: workspace_id.into(),
        }
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workspace_id, self.source_id)
    }
}
