use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::constants::{events, system};
use crate::database::MappingStore;
use crate::error::Result;
use crate::events::EventPublisher;
use crate::fetch::FailedEntityCache;
use crate::models::{
    inaccessible_name, ChannelMapping, EntityKind, MappingKey, NewChannelMapping, NewRoleMapping,
};
use crate::platform::{MirrorGateway, NewMirrorRoom, SourceChannel, SourcePlatform};
use crate::replicator::StructuralReplicator;
use crate::resolver::locks::PendingCreationLocks;
use crate::services::{AutoRecoveryService, Notifier, NotifyReason};
use crate::utils::BoundedCache;

/// Whether a resolution call may create the mirror entity when it is missing.
///
/// Read paths that must never mutate pass `ReadOnly`; structural triggers
/// pass `CreateIfMissing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    ReadOnly,
    CreateIfMissing,
}

/// Tuning for the resolver's transient state
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Whether this deployment holds mirror-side creation rights
    pub creation_allowed: bool,
    /// Cap for the resolution cache
    pub cache_capacity: usize,
    /// Dedup window for error notifications
    pub notified_ttl: Duration,
    /// Lock-set size that triggers the sweep's force clear
    pub lock_leak_threshold: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            creation_allowed: true,
            cache_capacity: system::RESOLUTION_CACHE_MAX_ENTRIES,
            notified_ttl: Duration::from_secs(system::NOTIFIED_ERROR_TTL_SECS),
            lock_leak_threshold: system::PENDING_LOCK_LEAK_THRESHOLD,
        }
    }
}

/// Resolves source-side entity ids to their mirror-side counterparts,
/// creating and repairing the correspondence as needed
pub struct EntityResolver {
    store: Arc<dyn MappingStore>,
    source: Arc<dyn SourcePlatform>,
    replicator: Arc<StructuralReplicator>,
    notifier: Arc<dyn Notifier>,
    recovery: Arc<dyn AutoRecoveryService>,
    publisher: EventPublisher,
    failed: Arc<FailedEntityCache>,
    cache: BoundedCache<MappingKey, String>,
    notified: BoundedCache<MappingKey, ()>,
    locks: PendingCreationLocks,
    config: ResolverConfig,
}

impl EntityResolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn MappingStore>,
        source: Arc<dyn SourcePlatform>,
        replicator: Arc<StructuralReplicator>,
        notifier: Arc<dyn Notifier>,
        recovery: Arc<dyn AutoRecoveryService>,
        publisher: EventPublisher,
        failed: Arc<FailedEntityCache>,
        config: ResolverConfig,
    ) -> Self {
        let cache = BoundedCache::new(config.cache_capacity);
        let notified = BoundedCache::with_ttl(config.cache_capacity, config.notified_ttl);
        Self {
            store,
            source,
            replicator,
            notifier,
            recovery,
            publisher,
            failed,
            cache,
            notified,
            locks: PendingCreationLocks::new(),
            config,
        }
    }

    /// Resolve the mirror-side id for a source channel-family entity.
    ///
    /// Never returns an error for expected failure modes; `None` means
    /// "unresolved right now" and callers retry later.
    pub async fn resolve_mirror_channel(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        mirror_workspace_id: &str,
        mode: ResolutionMode,
    ) -> Option<String> {
        let cache_key = MappingKey::new(source_id, source_workspace_id);
        if let Some(mirror_id) = self.cache.get(&cache_key) {
            return Some(mirror_id);
        }

        match self.store.find_channel(source_id, source_workspace_id).await {
            Ok(Some(mapping)) if mapping.blacklisted => {
                debug!(source_id, mirror_workspace_id, "Entity is blacklisted");
                return None;
            }
            Ok(Some(mapping)) if mapping.is_resolved() => {
                self.detect_rename(&mapping, mirror_workspace_id).await;
                self.cache.insert(cache_key, mapping.mirror_id.clone());
                return Some(mapping.mirror_id);
            }
            // A placeholder row or no row at all: both fall through to the
            // creation path.
            Ok(_) => {}
            Err(err) => {
                error!(source_id, error = %err, "Mapping store lookup failed");
                return None;
            }
        }

        if mode == ResolutionMode::ReadOnly {
            return None;
        }

        self.auto_create(source_id, source_workspace_id, mirror_workspace_id)
            .await
            .filter(ChannelMapping::is_resolved)
            .map(|mapping| mapping.mirror_id)
    }

    /// Resolve using metadata already carried by a structural event, saving
    /// the access probe when possible
    pub async fn resolve_event_channel(
        &self,
        channel: &SourceChannel,
        mirror_workspace_id: &str,
    ) -> Option<String> {
        let cache_key = MappingKey::new(&channel.id, &channel.workspace_id);
        if let Some(mirror_id) = self.cache.get(&cache_key) {
            return Some(mirror_id);
        }

        match self
            .store
            .find_channel(&channel.id, &channel.workspace_id)
            .await
        {
            Ok(Some(mapping)) if mapping.blacklisted => return None,
            Ok(Some(mapping)) if mapping.is_resolved() => {
                self.cache.insert(cache_key, mapping.mirror_id.clone());
                return Some(mapping.mirror_id);
            }
            Ok(_) => {}
            Err(err) => {
                error!(source_id = %channel.id, error = %err, "Mapping store lookup failed");
                return None;
            }
        }

        self.auto_create_with_hint(
            &channel.id,
            &channel.workspace_id,
            mirror_workspace_id,
            Some(channel),
        )
        .await
        .filter(ChannelMapping::is_resolved)
        .map(|mapping| mapping.mirror_id)
    }

    /// Upsert a mapping by natural key; a uniqueness conflict merges into the
    /// existing row
    pub async fn register_mapping(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        name: &str,
        mirror_id: &str,
        kind: EntityKind,
    ) -> Result<ChannelMapping> {
        let mapping = self
            .store
            .upsert_channel(NewChannelMapping {
                mirror_id: mirror_id.to_string(),
                source_id: source_id.to_string(),
                source_workspace_id: source_workspace_id.to_string(),
                name: name.to_string(),
                kind_code: i16::from(kind.code()),
                category_id: None,
            })
            .await?;

        if mapping.is_resolved() {
            self.cache.insert(
                MappingKey::new(source_id, source_workspace_id),
                mapping.mirror_id.clone(),
            );
        }
        Ok(mapping)
    }

    /// Create the mirror counterpart for an unmapped source entity.
    ///
    /// Holds the pending-creation lock for the (source id, mirror workspace)
    /// key across the whole attempt; a concurrent caller gets `None` and
    /// retries later.
    pub async fn auto_create(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        mirror_workspace_id: &str,
    ) -> Option<ChannelMapping> {
        self.auto_create_with_hint(source_id, source_workspace_id, mirror_workspace_id, None)
            .await
    }

    async fn auto_create_with_hint(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        mirror_workspace_id: &str,
        hint: Option<&SourceChannel>,
    ) -> Option<ChannelMapping> {
        let lock_key = MappingKey::new(source_id, mirror_workspace_id);
        let Some(_guard) = self.locks.acquire(lock_key) else {
            debug!(
                source_id,
                mirror_workspace_id, "Creation already in flight, caller retries later"
            );
            return None;
        };

        // Double-check under the lock: a concurrent winner may have finished.
        if let Ok(Some(mapping)) = self.store.find_channel(source_id, source_workspace_id).await {
            if mapping.blacklisted {
                return None;
            }
            if mapping.is_resolved() {
                self.cache.insert(
                    MappingKey::new(source_id, source_workspace_id),
                    mapping.mirror_id.clone(),
                );
                return Some(mapping);
            }
        }

        // Recently failed entities are doomed; escalate without re-probing.
        if let Some(code) = self.failed.recent_code(source_id) {
            if code == 403 {
                return None;
            }
            self.escalate_failure(
                source_id,
                source_workspace_id,
                mirror_workspace_id,
                None,
                NotifyReason::NotFound,
            )
            .await;
            return None;
        }

        let channel = match hint {
            Some(channel) => channel.clone(),
            None => match self.source.fetch_channel(source_id).await {
                Ok(channel) => channel,
                Err(err) if err.status_code() == Some(403) => {
                    self.failed.record(source_id, 403);
                    self.blacklist_inaccessible(source_id, source_workspace_id, mirror_workspace_id)
                        .await;
                    return None;
                }
                Err(err) => {
                    if let Some(code) = err.status_code() {
                        self.failed.record(source_id, code);
                    }
                    warn!(source_id, error = %err, "Source metadata fetch failed");
                    return self
                        .resync_and_recheck(source_id, source_workspace_id, mirror_workspace_id)
                        .await;
                }
            },
        };

        match self
            .create_from_metadata(&channel, source_workspace_id, mirror_workspace_id)
            .await
        {
            Some(mapping) => Some(mapping),
            None => {
                self.escalate_failure(
                    source_id,
                    source_workspace_id,
                    mirror_workspace_id,
                    Some(&channel.name),
                    NotifyReason::NotFound,
                )
                .await;
                None
            }
        }
    }

    /// Steps 3 and 4 of the resolution order: mirror-side name search, the
    /// thread parent path, and creation through the replicator
    async fn create_from_metadata(
        &self,
        channel: &SourceChannel,
        source_workspace_id: &str,
        mirror_workspace_id: &str,
    ) -> Option<ChannelMapping> {
        if channel.kind.is_thread() {
            return self
                .resolve_thread(channel, source_workspace_id, mirror_workspace_id)
                .await;
        }

        // An existing mirror room with a matching name and compatible kind is
        // adopted instead of duplicated.
        match self
            .replicator
            .gateway()
            .rooms_named(mirror_workspace_id, &channel.name)
            .await
        {
            Ok(rooms) => {
                if let Some(room) = rooms
                    .into_iter()
                    .find(|room| channel.kind.is_compatible_with(room.kind))
                {
                    debug!(
                        source_id = %channel.id,
                        mirror_id = %room.id,
                        "Adopted existing mirror room by name match"
                    );
                    return self
                        .register_mapping(
                            &channel.id,
                            source_workspace_id,
                            &channel.name,
                            &room.id,
                            channel.kind,
                        )
                        .await
                        .ok();
                }
            }
            Err(err) => {
                warn!(mirror_workspace_id, error = %err, "Mirror name search failed");
            }
        }

        if !self.config.creation_allowed {
            debug!(
                source_id = %channel.id,
                "Creation rights withheld, leaving entity unresolved"
            );
            return None;
        }

        // Mark creation as in flight before touching the platform.
        let placeholder = NewChannelMapping::pending(
            &channel.id,
            source_workspace_id,
            &channel.name,
            channel.kind,
        );
        if let Err(err) = self.store.upsert_channel(placeholder).await {
            error!(source_id = %channel.id, error = %err, "Placeholder upsert failed");
            return None;
        }

        let category_id = self
            .resolve_category(channel, source_workspace_id, mirror_workspace_id)
            .await;

        let room = NewMirrorRoom::channel(&channel.name, channel.kind).under_category(category_id);
        match self
            .replicator
            .create_room(mirror_workspace_id, channel, room)
            .await
        {
            Ok(created) => {
                let mapping = self
                    .register_mapping(
                        &channel.id,
                        source_workspace_id,
                        &channel.name,
                        &created.id,
                        created.kind,
                    )
                    .await
                    .ok()?;
                // Announced only once the row is persisted, so backfill
                // always finds a resolved mapping.
                self.publisher.publish_room_created(
                    mirror_workspace_id,
                    &channel.id,
                    source_workspace_id,
                    &created.id,
                );
                Some(mapping)
            }
            Err(err) => {
                warn!(source_id = %channel.id, error = %err, "Mirror room creation failed");
                None
            }
        }
    }

    /// Thread-specific path: resolve the parent mapping, adopt a live thread
    /// with the exact name, otherwise create one under the mapped parent.
    ///
    /// A forum post's parent forum is created on demand by the parent
    /// resolution (with the replicator's text-channel fallback), so the post
    /// always lands under a live parent.
    async fn resolve_thread(
        &self,
        thread: &SourceChannel,
        source_workspace_id: &str,
        mirror_workspace_id: &str,
    ) -> Option<ChannelMapping> {
        let parent_source_id = thread.parent_id.as_deref()?;

        let parent_mirror_id = Box::pin(self.resolve_mirror_channel(
            parent_source_id,
            source_workspace_id,
            mirror_workspace_id,
            ResolutionMode::CreateIfMissing,
        ))
        .await?;

        match self
            .replicator
            .gateway()
            .active_threads(mirror_workspace_id, &parent_mirror_id)
            .await
        {
            Ok(threads) => {
                if let Some(found) = threads.into_iter().find(|t| t.name == thread.name) {
                    return self
                        .register_mapping(
                            &thread.id,
                            source_workspace_id,
                            &thread.name,
                            &found.id,
                            thread.kind,
                        )
                        .await
                        .ok();
                }
            }
            Err(err) => {
                warn!(
                    parent_mirror_id = %parent_mirror_id,
                    error = %err,
                    "Live thread listing failed"
                );
            }
        }

        if !self.config.creation_allowed {
            return None;
        }

        let room =
            NewMirrorRoom::channel(&thread.name, thread.kind).under_parent(&*parent_mirror_id);
        match self
            .replicator
            .create_room(mirror_workspace_id, thread, room)
            .await
        {
            Ok(created) => {
                let mapping = self
                    .register_mapping(
                        &thread.id,
                        source_workspace_id,
                        &thread.name,
                        &created.id,
                        thread.kind,
                    )
                    .await
                    .ok()?;
                self.publisher.publish_room_created(
                    mirror_workspace_id,
                    &thread.id,
                    source_workspace_id,
                    &created.id,
                );
                Some(mapping)
            }
            Err(err) => {
                warn!(source_id = %thread.id, error = %err, "Mirror thread creation failed");
                None
            }
        }
    }

    /// Mirror-side category for a channel, resolved (and created) on demand
    async fn resolve_category(
        &self,
        channel: &SourceChannel,
        source_workspace_id: &str,
        mirror_workspace_id: &str,
    ) -> Option<String> {
        let category_source_id = channel.parent_id.as_deref()?;
        Box::pin(self.resolve_mirror_channel(
            category_source_id,
            source_workspace_id,
            mirror_workspace_id,
            ResolutionMode::CreateIfMissing,
        ))
        .await
    }

    /// Last-resort forced resynchronization: re-list the source workspace and
    /// retry creation with fresh metadata, then re-check the store
    async fn resync_and_recheck(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        mirror_workspace_id: &str,
    ) -> Option<ChannelMapping> {
        self.publisher.publish(
            events::MIRROR_RESYNC_TRIGGERED,
            serde_json::json!({
                "source_id": source_id,
                "source_workspace_id": source_workspace_id,
                "mirror_workspace_id": mirror_workspace_id,
            }),
        );

        let listing = match self
            .source
            .list_workspace_channels(source_workspace_id)
            .await
        {
            Ok(listing) => listing,
            Err(err) => {
                warn!(source_workspace_id, error = %err, "Workspace re-list failed");
                Vec::new()
            }
        };

        if let Some(channel) = listing.into_iter().find(|c| c.id == source_id) {
            if let Some(mapping) = self
                .create_from_metadata(&channel, source_workspace_id, mirror_workspace_id)
                .await
            {
                return Some(mapping);
            }
            self.escalate_failure(
                source_id,
                source_workspace_id,
                mirror_workspace_id,
                Some(&channel.name),
                NotifyReason::NotFound,
            )
            .await;
            return None;
        }

        // The entity may have been registered by another path in the meantime.
        if let Ok(Some(mapping)) = self.store.find_channel(source_id, source_workspace_id).await {
            if mapping.is_resolved() {
                return Some(mapping);
            }
        }

        self.escalate_failure(
            source_id,
            source_workspace_id,
            mirror_workspace_id,
            None,
            NotifyReason::NotFound,
        )
        .await;
        None
    }

    /// Permission branch: a 403 on the access probe is terminal for the
    /// entity. The row is blacklisted under `inaccessible-<id tail>` and the
    /// operator is notified once per dedup window.
    async fn blacklist_inaccessible(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        mirror_workspace_id: &str,
    ) {
        let name = inaccessible_name(source_id);
        match self
            .store
            .blacklist_channel(source_id, source_workspace_id, &name, "permission_denied")
            .await
        {
            Ok(_) => {
                info!(source_id, name = %name, "⛔ Entity blacklisted, access denied at source");
                self.publisher.publish(
                    events::MIRROR_MAPPING_BLACKLISTED,
                    serde_json::json!({
                        "source_id": source_id,
                        "source_workspace_id": source_workspace_id,
                        "reason": "permission_denied",
                    }),
                );
            }
            Err(err) => {
                error!(source_id, error = %err, "Blacklist upsert failed");
            }
        }

        self.escalate_failure(
            source_id,
            source_workspace_id,
            mirror_workspace_id,
            Some(&name),
            NotifyReason::PermissionDenied,
        )
        .await;
    }

    /// Deduplicated failure escalation; permission denials never start the
    /// auto-recovery workflow
    async fn escalate_failure(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        mirror_workspace_id: &str,
        name: Option<&str>,
        reason: NotifyReason,
    ) {
        let dedup_key = MappingKey::new(source_id, mirror_workspace_id);
        if self.notified.get(&dedup_key).is_some() {
            debug!(source_id, %reason, "Notification suppressed by dedup window");
            return;
        }
        self.notified.insert(dedup_key, ());

        let message_id = self
            .notifier
            .send_error_notification(mirror_workspace_id, source_id, name, reason)
            .await;

        if reason == NotifyReason::PermissionDenied {
            return;
        }
        if self
            .recovery
            .is_recovering(source_id, mirror_workspace_id)
            .await
        {
            debug!(source_id, "Auto-recovery already running for this key");
            return;
        }
        self.recovery
            .start_recovery(
                source_id,
                source_workspace_id,
                mirror_workspace_id,
                message_id,
            )
            .await;
    }

    /// Best-effort rename detection on a store hit: persist the live source
    /// name and try to follow it on the mirror side, swallowing failures
    async fn detect_rename(&self, mapping: &ChannelMapping, mirror_workspace_id: &str) {
        let Ok(live) = self.source.fetch_channel(&mapping.source_id).await else {
            return;
        };
        if live.name.is_empty() || live.name == mapping.name {
            return;
        }

        info!(
            source_id = %mapping.source_id,
            old_name = %mapping.name,
            new_name = %live.name,
            "📝 Source rename detected"
        );
        if let Err(err) = self
            .store
            .update_channel_name(&mapping.source_id, &mapping.source_workspace_id, &live.name)
            .await
        {
            warn!(source_id = %mapping.source_id, error = %err, "Rename persist failed");
        }
        if let Err(err) = self
            .replicator
            .rename_room(mirror_workspace_id, &mapping.mirror_id, &live.name)
            .await
        {
            debug!(
                mirror_id = %mapping.mirror_id,
                error = %err,
                "Mirror rename attempt failed"
            );
        }
    }

    /// Rebuild the resolution cache for one source workspace from the store.
    ///
    /// Called when a session (re)starts so the event pump resolves known
    /// rooms without re-probing. Blacklisted and still-pending rows are left
    /// out; the cache cap evicts oldest-first as usual.
    pub async fn warm_cache_for_workspace(&self, source_workspace_id: &str) -> usize {
        let mappings = match self
            .store
            .channels_for_workspace(source_workspace_id)
            .await
        {
            Ok(mappings) => mappings,
            Err(err) => {
                warn!(source_workspace_id, error = %err, "Cache warm-up listing failed");
                return 0;
            }
        };

        let mut warmed = 0usize;
        for mapping in mappings {
            if mapping.is_resolved() {
                self.cache.insert(
                    MappingKey::new(&mapping.source_id, &mapping.source_workspace_id),
                    mapping.mirror_id.clone(),
                );
                warmed += 1;
            }
        }
        debug!(
            source_workspace_id,
            warmed, "Resolution cache warmed from store"
        );
        warmed
    }

    /// Read-only store lookup with no creation side effects
    pub async fn find_mapping(
        &self,
        source_id: &str,
        source_workspace_id: &str,
    ) -> Option<ChannelMapping> {
        self.store
            .find_channel(source_id, source_workspace_id)
            .await
            .ok()
            .flatten()
    }

    /// Whether a non-placeholder mapping already resolves for this key,
    /// checked against the persistent store (structural dispatch guarantee)
    pub async fn is_resolved(&self, source_id: &str, source_workspace_id: &str) -> bool {
        matches!(
            self.store.find_channel(source_id, source_workspace_id).await,
            Ok(Some(mapping)) if mapping.is_resolved()
        )
    }

    /// Resolve a mirror role id, falling back to a name match when the
    /// source id is unknown
    pub async fn resolve_mirror_role(
        &self,
        source_id: Option<&str>,
        source_workspace_id: &str,
        name: &str,
    ) -> Option<String> {
        if let Some(source_id) = source_id {
            match self.store.find_role(source_id, source_workspace_id).await {
                Ok(Some(role)) => return Some(role.mirror_id),
                Ok(None) => {}
                Err(err) => {
                    error!(source_id, error = %err, "Role lookup failed");
                    return None;
                }
            }
        }
        match self
            .store
            .find_role_by_name(source_workspace_id, name)
            .await
        {
            Ok(role) => role.map(|r| r.mirror_id),
            Err(err) => {
                error!(name, error = %err, "Role name lookup failed");
                None
            }
        }
    }

    /// Upsert a role mapping by natural key
    pub async fn register_role(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        name: &str,
        mirror_id: &str,
    ) -> Result<()> {
        self.store
            .upsert_role(NewRoleMapping {
                mirror_id: mirror_id.to_string(),
                source_id: source_id.to_string(),
                source_workspace_id: source_workspace_id.to_string(),
                name: name.to_string(),
            })
            .await?;
        Ok(())
    }

    /// One maintenance pass: clear the notification dedup set, trim both
    /// caches, and force-clear the lock set past the leak threshold
    pub fn run_maintenance(&self) {
        self.notified.clear();
        self.cache.sweep();
        self.failed.sweep();
        if self.locks.len() > self.config.lock_leak_threshold {
            warn!(
                held = self.locks.len(),
                threshold = self.config.lock_leak_threshold,
                "🚨 Pending-creation lock set exceeded threshold, force clearing"
            );
            self.locks.force_clear();
        }
        debug!(
            cache_entries = self.cache.len(),
            failed_entries = self.failed.len(),
            held_locks = self.locks.len(),
            "🧹 Resolver maintenance sweep completed"
        );
    }

    /// Spawn the fixed-interval maintenance sweep
    pub fn start_maintenance(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                resolver.run_maintenance();
            }
        })
    }
}
