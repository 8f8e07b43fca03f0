//! PostgreSQL-backed mapping store.
//!
//! Uses the runtime query API with upsert-by-natural-key statements. The
//! unique index on `(source_id, source_workspace_id)` backs the merge
//! semantics; the plain index on `source_workspace_id` backs workspace-wide
//! listings.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::database::store::MappingStore;
use crate::error::Result;
use crate::models::{ChannelMapping, NewChannelMapping, NewRoleMapping, RoleMapping};

const CHANNEL_COLUMNS: &str = "mirror_id, source_id, source_workspace_id, name, kind_code, \
     category_id, blacklisted, blacklist_reason, last_synced";

const ROLE_COLUMNS: &str = "mirror_id, source_id, source_workspace_id, name, synced, last_synced";

/// Mapping store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgMappingStore {
    pool: PgPool,
}

impl PgMappingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the mapping tables and indices when they do not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS guildmirror_channel_mappings (
                mirror_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                source_workspace_id TEXT NOT NULL,
                name TEXT NOT NULL,
                kind_code SMALLINT NOT NULL,
                category_id TEXT,
                blacklisted BOOLEAN NOT NULL DEFAULT FALSE,
                blacklist_reason TEXT,
                last_synced TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (source_id, source_workspace_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_channel_mappings_workspace
            ON guildmirror_channel_mappings (source_workspace_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS guildmirror_role_mappings (
                mirror_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                source_workspace_id TEXT NOT NULL,
                name TEXT NOT NULL,
                synced BOOLEAN NOT NULL DEFAULT FALSE,
                last_synced TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (source_id, source_workspace_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_role_mappings_workspace
            ON guildmirror_role_mappings (source_workspace_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        debug!("Mapping schema verified");
        Ok(())
    }
}

#[async_trait]
impl MappingStore for PgMappingStore {
    async fn find_channel(
        &self,
        source_id: &str,
        source_workspace_id: &str,
    ) -> Result<Option<ChannelMapping>> {
        let mapping = sqlx::query_as::<_, ChannelMapping>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM guildmirror_channel_mappings \
             WHERE source_id = $1 AND source_workspace_id = $2"
        ))
        .bind(source_id)
        .bind(source_workspace_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mapping)
    }

    async fn channels_for_workspace(
        &self,
        source_workspace_id: &str,
    ) -> Result<Vec<ChannelMapping>> {
        let mappings = sqlx::query_as::<_, ChannelMapping>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM guildmirror_channel_mappings \
             WHERE source_workspace_id = $1 ORDER BY name"
        ))
        .bind(source_workspace_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(mappings)
    }

    async fn upsert_channel(&self, new: NewChannelMapping) -> Result<ChannelMapping> {
        // A placeholder mirror id never overwrites a resolved one; a real id
        // always wins the merge.
        let mapping = sqlx::query_as::<_, ChannelMapping>(&format!(
            r"
            INSERT INTO guildmirror_channel_mappings
                (mirror_id, source_id, source_workspace_id, name, kind_code, category_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_id, source_workspace_id) DO UPDATE SET
                mirror_id = CASE
                    WHEN EXCLUDED.mirror_id = 'pending'
                         OR EXCLUDED.mirror_id LIKE 'pending\_%'
                    THEN guildmirror_channel_mappings.mirror_id
                    ELSE EXCLUDED.mirror_id
                END,
                name = EXCLUDED.name,
                kind_code = EXCLUDED.kind_code,
                category_id = COALESCE(EXCLUDED.category_id,
                                       guildmirror_channel_mappings.category_id),
                last_synced = NOW()
            RETURNING {CHANNEL_COLUMNS}
            "
        ))
        .bind(&new.mirror_id)
        .bind(&new.source_id)
        .bind(&new.source_workspace_id)
        .bind(&new.name)
        .bind(new.kind_code)
        .bind(&new.category_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(mapping)
    }

    async fn update_channel_name(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        name: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE guildmirror_channel_mappings \
             SET name = $3, last_synced = NOW() \
             WHERE source_id = $1 AND source_workspace_id = $2",
        )
        .bind(source_id)
        .bind(source_workspace_id)
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn blacklist_channel(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        name: &str,
        reason: &str,
    ) -> Result<ChannelMapping> {
        let mapping = sqlx::query_as::<_, ChannelMapping>(&format!(
            r"
            INSERT INTO guildmirror_channel_mappings
                (mirror_id, source_id, source_workspace_id, name, kind_code,
                 blacklisted, blacklist_reason)
            VALUES ($1, $2, $3, $4, 0, TRUE, $5)
            ON CONFLICT (source_id, source_workspace_id) DO UPDATE SET
                name = EXCLUDED.name,
                blacklisted = TRUE,
                blacklist_reason = EXCLUDED.blacklist_reason,
                last_synced = NOW()
            RETURNING {CHANNEL_COLUMNS}
            "
        ))
        .bind(format!("pending_{source_id}"))
        .bind(source_id)
        .bind(source_workspace_id)
        .bind(name)
        .bind(reason)
        .fetch_one(&self.pool)
        .await?;

        Ok(mapping)
    }

    async fn find_role(
        &self,
        source_id: &str,
        source_workspace_id: &str,
    ) -> Result<Option<RoleMapping>> {
        let mapping = sqlx::query_as::<_, RoleMapping>(&format!(
            "SELECT {ROLE_COLUMNS} FROM guildmirror_role_mappings \
             WHERE source_id = $1 AND source_workspace_id = $2"
        ))
        .bind(source_id)
        .bind(source_workspace_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mapping)
    }

    async fn find_role_by_name(
        &self,
        source_workspace_id: &str,
        name: &str,
    ) -> Result<Option<RoleMapping>> {
        let mapping = sqlx::query_as::<_, RoleMapping>(&format!(
            "SELECT {ROLE_COLUMNS} FROM guildmirror_role_mappings \
             WHERE source_workspace_id = $1 AND name = $2 \
             ORDER BY last_synced DESC LIMIT 1"
        ))
        .bind(source_workspace_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mapping)
    }

    async fn upsert_role(&self, new: NewRoleMapping) -> Result<RoleMapping> {
        let mapping = sqlx::query_as::<_, RoleMapping>(&format!(
            r"
            INSERT INTO guildmirror_role_mappings
                (mirror_id, source_id, source_workspace_id, name, synced)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (source_id, source_workspace_id) DO UPDATE SET
                mirror_id = EXCLUDED.mirror_id,
                name = EXCLUDED.name,
                synced = TRUE,
                last_synced = NOW()
            RETURNING {ROLE_COLUMNS}
            "
        ))
        .bind(&new.mirror_id)
        .bind(&new.source_id)
        .bind(&new.source_workspace_id)
        .bind(&new.name)
        .fetch_one(&self.pool)
        .await?;

        Ok(mapping)
    }
}
