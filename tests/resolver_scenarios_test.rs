//! Resolver behavior across the creation, permission, concurrency, and
//! repair paths, driven through in-memory collaborators.

mod common;

use std::time::Duration;

use chrono::Utc;
use guildmirror_core::database::MappingStore;
use guildmirror_core::models::{ChannelMapping, EntityKind, NewChannelMapping};
use guildmirror_core::platform::{MirrorRoom, SourceChannel};
use guildmirror_core::resolver::{ResolutionMode, ResolverConfig};
use guildmirror_core::services::NotifyReason;

use common::{build_resolver, text_channel};

const SRC_WS: &str = "source-ws";
const MIRROR_WS: &str = "mirror-ws";

#[tokio::test]
async fn test_scenario_a_creates_text_channel_and_persists_mapping() {
    let harness = build_resolver(ResolverConfig::default());
    harness
        .source
        .add_channel(text_channel("100200300", SRC_WS, "general"));

    let resolved = harness
        .resolver
        .resolve_mirror_channel("100200300", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
        .await;

    let mirror_id = resolved.expect("channel should resolve");
    assert_eq!(harness.gateway.created_count(), 1);

    let mapping = harness
        .store
        .find_channel("100200300", SRC_WS)
        .await
        .unwrap()
        .expect("mapping row should be persisted");
    assert_eq!(mapping.mirror_id, mirror_id);
    assert_eq!(mapping.name, "general");
    assert_eq!(mapping.kind(), Some(EntityKind::Text));
    assert!(mapping.is_resolved());
}

#[tokio::test]
async fn test_scenario_b_permission_denied_blacklists_and_notifies_once() {
    let harness = build_resolver(ResolverConfig::default());
    harness.source.fail_with("111222333444555666", 403);

    let resolved = harness
        .resolver
        .resolve_mirror_channel(
            "111222333444555666",
            SRC_WS,
            MIRROR_WS,
            ResolutionMode::CreateIfMissing,
        )
        .await;
    assert_eq!(resolved, None);

    let mapping = harness
        .store
        .find_channel("111222333444555666", SRC_WS)
        .await
        .unwrap()
        .expect("blacklist row should be persisted");
    assert!(mapping.blacklisted);
    assert_eq!(mapping.name, "inaccessible-555666");

    let notifications = harness.notifier.notifications.lock().clone();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].reason, NotifyReason::PermissionDenied);
    assert!(notifications
        .iter()
        .all(|n| n.reason != NotifyReason::NotFound));

    // Permission denials never start the recovery workflow
    assert_eq!(harness.recovery.start_count(), 0);

    // No further auto-creation attempt for that key: the blacklist row
    // short-circuits before the metadata probe.
    let probes_before = harness
        .source
        .fetch_calls
        .load(std::sync::atomic::Ordering::SeqCst);
    let retried = harness
        .resolver
        .resolve_mirror_channel(
            "111222333444555666",
            SRC_WS,
            MIRROR_WS,
            ResolutionMode::CreateIfMissing,
        )
        .await;
    assert_eq!(retried, None);
    assert_eq!(
        harness
            .source
            .fetch_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        probes_before
    );
    assert_eq!(harness.gateway.created_count(), 0);
}

#[tokio::test]
async fn test_scenario_c_concurrent_callers_create_exactly_one_row() {
    let harness = build_resolver(ResolverConfig::default());
    harness
        .source
        .add_channel(text_channel("707070", SRC_WS, "announcements"));
    // Hold the winner inside its creation attempt long enough for the other
    // callers to hit the pending-creation lock.
    harness.source.set_fetch_delay(Duration::from_millis(50));

    let resolver = &harness.resolver;
    let call = || async {
        resolver
            .resolve_mirror_channel("707070", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
            .await
    };
    let (a, b, c, d) = tokio::join!(call(), call(), call(), call());

    let results = [a, b, c, d];
    let resolved: Vec<&String> = results.iter().filter_map(|r| r.as_ref()).collect();
    assert_eq!(resolved.len(), 1, "exactly one caller wins");
    assert_eq!(results.iter().filter(|r| r.is_none()).count(), 3);

    assert_eq!(harness.gateway.created_count(), 1);
    assert_eq!(harness.store.channel_count(), 1);
}

#[tokio::test]
async fn test_idempotent_resolution_is_served_from_cache() {
    let harness = build_resolver(ResolverConfig::default());
    harness
        .source
        .add_channel(text_channel("42", SRC_WS, "general"));

    let first = harness
        .resolver
        .resolve_mirror_channel("42", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
        .await
        .unwrap();
    let probes_after_first = harness
        .source
        .fetch_calls
        .load(std::sync::atomic::Ordering::SeqCst);

    for _ in 0..5 {
        let repeat = harness
            .resolver
            .resolve_mirror_channel("42", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
            .await
            .unwrap();
        assert_eq!(repeat, first);
    }

    // Cache hits never re-probe the source platform
    assert_eq!(
        harness
            .source
            .fetch_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        probes_after_first
    );
    assert_eq!(harness.gateway.created_count(), 1);
}

#[tokio::test]
async fn test_rename_detection_updates_store_and_mirror_once() {
    let harness = build_resolver(ResolverConfig::default());
    harness.store.seed_channel(ChannelMapping {
        mirror_id: "mirror-9".to_string(),
        source_id: "55".to_string(),
        source_workspace_id: SRC_WS.to_string(),
        name: "old-name".to_string(),
        kind_code: 0,
        category_id: None,
        blacklisted: false,
        blacklist_reason: None,
        last_synced: Utc::now(),
    });
    harness
        .source
        .add_channel(text_channel("55", SRC_WS, "new-name"));

    let resolved = harness
        .resolver
        .resolve_mirror_channel("55", SRC_WS, MIRROR_WS, ResolutionMode::ReadOnly)
        .await;
    assert_eq!(resolved.as_deref(), Some("mirror-9"));

    let mapping = harness.store.find_channel("55", SRC_WS).await.unwrap().unwrap();
    assert_eq!(mapping.name, "new-name");

    let renames = harness.gateway.renames.lock().clone();
    assert_eq!(renames, vec![("mirror-9".to_string(), "new-name".to_string())]);

    // Cache hit on repeat: no second rename attempt
    let again = harness
        .resolver
        .resolve_mirror_channel("55", SRC_WS, MIRROR_WS, ResolutionMode::ReadOnly)
        .await;
    assert_eq!(again.as_deref(), Some("mirror-9"));
    assert_eq!(harness.gateway.renames.lock().len(), 1);
}

#[tokio::test]
async fn test_existing_compatible_room_is_adopted_instead_of_duplicated() {
    let harness = build_resolver(ResolverConfig::default());
    harness
        .source
        .add_channel(text_channel("88", SRC_WS, "general"));
    // An announcement room counts as compatible with a text channel
    harness.gateway.seed_room(MirrorRoom {
        id: "m-77".to_string(),
        name: "general".to_string(),
        kind: EntityKind::News,
    });

    let resolved = harness
        .resolver
        .resolve_mirror_channel("88", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
        .await;
    assert_eq!(resolved.as_deref(), Some("m-77"));
    assert_eq!(harness.gateway.created_count(), 0);
}

#[tokio::test]
async fn test_thread_resolution_creates_parent_then_thread() {
    let harness = build_resolver(ResolverConfig::default());
    harness
        .source
        .add_channel(text_channel("parent-1", SRC_WS, "support"));
    harness.source.add_channel(SourceChannel {
        id: "thread-1".to_string(),
        workspace_id: SRC_WS.to_string(),
        name: "ticket-123".to_string(),
        kind: EntityKind::PublicThread,
        parent_id: Some("parent-1".to_string()),
    });

    let resolved = harness
        .resolver
        .resolve_mirror_channel("thread-1", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
        .await;
    assert!(resolved.is_some());

    let created = harness.gateway.created.lock().clone();
    assert_eq!(created.len(), 2, "parent channel plus thread");
    let thread_request = &created[1].1;
    assert_eq!(thread_request.kind, EntityKind::PublicThread);
    assert!(thread_request.parent_id.is_some());

    // Both mappings persisted
    assert!(harness.store.find_channel("parent-1", SRC_WS).await.unwrap().is_some());
    assert!(harness.store.find_channel("thread-1", SRC_WS).await.unwrap().is_some());
}

#[tokio::test]
async fn test_thread_adopts_live_thread_with_exact_name() {
    let harness = build_resolver(ResolverConfig::default());
    harness.store.seed_channel(ChannelMapping {
        mirror_id: "mirror-parent".to_string(),
        source_id: "parent-2".to_string(),
        source_workspace_id: SRC_WS.to_string(),
        name: "help".to_string(),
        kind_code: 0,
        category_id: None,
        blacklisted: false,
        blacklist_reason: None,
        last_synced: Utc::now(),
    });
    harness
        .source
        .add_channel(text_channel("parent-2", SRC_WS, "help"));
    harness.source.add_channel(SourceChannel {
        id: "thread-2".to_string(),
        workspace_id: SRC_WS.to_string(),
        name: "ticket-9".to_string(),
        kind: EntityKind::PublicThread,
        parent_id: Some("parent-2".to_string()),
    });
    harness.gateway.seed_thread(
        "mirror-parent",
        MirrorRoom {
            id: "mirror-thread".to_string(),
            name: "ticket-9".to_string(),
            kind: EntityKind::PublicThread,
        },
    );

    let resolved = harness
        .resolver
        .resolve_mirror_channel("thread-2", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
        .await;
    assert_eq!(resolved.as_deref(), Some("mirror-thread"));
    assert_eq!(harness.gateway.created_count(), 0);
}

#[tokio::test]
async fn test_forum_falls_back_to_text_without_forum_support() {
    let harness = build_resolver(ResolverConfig::default());
    harness.gateway.set_forums_supported(false);
    harness.source.add_channel(SourceChannel {
        id: "forum-1".to_string(),
        workspace_id: SRC_WS.to_string(),
        name: "qa-board".to_string(),
        kind: EntityKind::Forum,
        parent_id: None,
    });

    let resolved = harness
        .resolver
        .resolve_mirror_channel("forum-1", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
        .await;
    assert!(resolved.is_some());

    let created = harness.gateway.created.lock().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].1.kind, EntityKind::Text);
}

#[tokio::test]
async fn test_unknown_entity_notifies_and_starts_recovery_once() {
    let harness = build_resolver(ResolverConfig::default());
    // Nothing registered for this id anywhere: metadata fetch 404s and the
    // workspace re-list comes back without it.

    let resolved = harness
        .resolver
        .resolve_mirror_channel("ghost", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
        .await;
    assert_eq!(resolved, None);

    let notifications = harness.notifier.notifications.lock().clone();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].reason, NotifyReason::NotFound);

    let starts = harness.recovery.starts.lock().clone();
    assert_eq!(starts.len(), 1);
    assert!(starts[0].3.is_some(), "notification message id is forwarded");

    // Dedup window: an immediate retry neither notifies nor re-triggers
    let retried = harness
        .resolver
        .resolve_mirror_channel("ghost", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
        .await;
    assert_eq!(retried, None);
    assert_eq!(harness.notifier.count(), 1);
    assert_eq!(harness.recovery.start_count(), 1);
}

#[tokio::test]
async fn test_recovery_not_restarted_while_already_running() {
    let harness = build_resolver(ResolverConfig::default());
    harness.recovery.set_recovering(true);

    let resolved = harness
        .resolver
        .resolve_mirror_channel("ghost-2", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
        .await;
    assert_eq!(resolved, None);
    assert_eq!(harness.notifier.count(), 1);
    assert_eq!(harness.recovery.start_count(), 0);
}

#[tokio::test]
async fn test_read_only_resolution_never_creates() {
    let harness = build_resolver(ResolverConfig::default());
    harness
        .source
        .add_channel(text_channel("900", SRC_WS, "random"));

    let resolved = harness
        .resolver
        .resolve_mirror_channel("900", SRC_WS, MIRROR_WS, ResolutionMode::ReadOnly)
        .await;
    assert_eq!(resolved, None);
    assert_eq!(harness.gateway.created_count(), 0);
    assert_eq!(
        harness
            .source
            .fetch_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
    assert_eq!(harness.store.channel_count(), 0);
}

#[tokio::test]
async fn test_creation_rights_withheld_leaves_entity_unresolved() {
    let harness = build_resolver(ResolverConfig {
        creation_allowed: false,
        ..ResolverConfig::default()
    });
    harness
        .source
        .add_channel(text_channel("77", SRC_WS, "general"));

    let resolved = harness
        .resolver
        .resolve_mirror_channel("77", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
        .await;
    assert_eq!(resolved, None);
    assert_eq!(harness.gateway.created_count(), 0);
}

#[tokio::test]
async fn test_placeholder_never_overwrites_resolved_mapping() {
    let harness = build_resolver(ResolverConfig::default());

    harness
        .store
        .upsert_channel(NewChannelMapping {
            mirror_id: "real-id".to_string(),
            source_id: "5".to_string(),
            source_workspace_id: SRC_WS.to_string(),
            name: "general".to_string(),
            kind_code: 0,
            category_id: None,
        })
        .await
        .unwrap();

    let merged = harness
        .store
        .upsert_channel(NewChannelMapping::pending("5", SRC_WS, "general", EntityKind::Text))
        .await
        .unwrap();
    assert_eq!(merged.mirror_id, "real-id");
    assert_eq!(harness.store.channel_count(), 1);
}

#[tokio::test]
async fn test_maintenance_sweep_reopens_notification_window() {
    let harness = build_resolver(ResolverConfig::default());

    harness
        .resolver
        .resolve_mirror_channel("ghost-3", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
        .await;
    assert_eq!(harness.notifier.count(), 1);

    // Within the window the dedup marker suppresses repeats
    harness
        .resolver
        .resolve_mirror_channel("ghost-3", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
        .await;
    assert_eq!(harness.notifier.count(), 1);

    harness.resolver.run_maintenance();

    harness
        .resolver
        .resolve_mirror_channel("ghost-3", SRC_WS, MIRROR_WS, ResolutionMode::CreateIfMissing)
        .await;
    assert_eq!(harness.notifier.count(), 2);
}

#[tokio::test]
async fn test_warm_cache_loads_resolved_rows_only() {
    let harness = build_resolver(ResolverConfig::default());
    harness.store.seed_channel(ChannelMapping {
        mirror_id: "mirror-live".to_string(),
        source_id: "warm-1".to_string(),
        source_workspace_id: SRC_WS.to_string(),
        name: "general".to_string(),
        kind_code: 0,
        category_id: None,
        blacklisted: false,
        blacklist_reason: None,
        last_synced: Utc::now(),
    });
    harness.store.seed_channel(ChannelMapping {
        mirror_id: "pending_warm-2".to_string(),
        source_id: "warm-2".to_string(),
        source_workspace_id: SRC_WS.to_string(),
        name: "stuck".to_string(),
        kind_code: 0,
        category_id: None,
        blacklisted: false,
        blacklist_reason: None,
        last_synced: Utc::now(),
    });
    harness.store.seed_channel(ChannelMapping {
        mirror_id: "mirror-dark".to_string(),
        source_id: "warm-3".to_string(),
        source_workspace_id: SRC_WS.to_string(),
        name: "inaccessible-warm-3".to_string(),
        kind_code: 0,
        category_id: None,
        blacklisted: true,
        blacklist_reason: Some("permission_denied".to_string()),
        last_synced: Utc::now(),
    });

    let warmed = harness.resolver.warm_cache_for_workspace(SRC_WS).await;
    assert_eq!(warmed, 1, "pending and blacklisted rows are not warmed");

    // A warmed entry resolves from cache: no store-hit rename probe fires
    let resolved = harness
        .resolver
        .resolve_mirror_channel("warm-1", SRC_WS, MIRROR_WS, ResolutionMode::ReadOnly)
        .await;
    assert_eq!(resolved.as_deref(), Some("mirror-live"));
    assert_eq!(
        harness
            .source
            .fetch_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn test_role_resolution_falls_back_to_name_match() {
    let harness = build_resolver(ResolverConfig::default());
    harness
        .resolver
        .register_role("role-1", SRC_WS, "moderators", "mirror-role-1")
        .await
        .unwrap();

    // Known source id
    let by_id = harness
        .resolver
        .resolve_mirror_role(Some("role-1"), SRC_WS, "moderators")
        .await;
    assert_eq!(by_id.as_deref(), Some("mirror-role-1"));

    // Unknown source id falls back to the name
    let by_name = harness
        .resolver
        .resolve_mirror_role(None, SRC_WS, "moderators")
        .await;
    assert_eq!(by_name.as_deref(), Some("mirror-role-1"));

    let missing = harness
        .resolver
        .resolve_mirror_role(None, SRC_WS, "admins")
        .await;
    assert_eq!(missing, None);
}
