//! Shared fixtures for resolver and session integration tests.
#![allow(dead_code)] // Each test binary uses a different slice of the fixtures

use std::sync::Arc;

use guildmirror_core::database::MappingStore;
use guildmirror_core::events::EventPublisher;
use guildmirror_core::fetch::FailedEntityCache;
use guildmirror_core::models::EntityKind;
use guildmirror_core::platform::{MirrorGateway, SourceChannel, SourcePlatform};
use guildmirror_core::replicator::StructuralReplicator;
use guildmirror_core::resolver::{EntityResolver, ResolverConfig};
use guildmirror_core::services::NullAuditLogger;
use guildmirror_core::test_helpers::{
    MemoryMappingStore, MockMirrorGateway, MockRecoveryService, MockSourcePlatform,
    RecordingNotifier,
};

pub struct ResolverHarness {
    pub store: Arc<MemoryMappingStore>,
    pub source: Arc<MockSourcePlatform>,
    pub gateway: Arc<MockMirrorGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub recovery: Arc<MockRecoveryService>,
    pub failed: Arc<FailedEntityCache>,
    pub publisher: EventPublisher,
    pub resolver: Arc<EntityResolver>,
}

pub fn build_resolver(config: ResolverConfig) -> ResolverHarness {
    let store = Arc::new(MemoryMappingStore::new());
    let source = Arc::new(MockSourcePlatform::new());
    let gateway = Arc::new(MockMirrorGateway::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let recovery = Arc::new(MockRecoveryService::new());
    let failed = Arc::new(FailedEntityCache::new());
    let publisher = EventPublisher::new(256);

    let replicator = Arc::new(StructuralReplicator::new(
        Arc::clone(&gateway) as Arc<dyn MirrorGateway>,
        publisher.clone(),
        Arc::new(NullAuditLogger),
    ));
    let resolver = Arc::new(EntityResolver::new(
        Arc::clone(&store) as Arc<dyn MappingStore>,
        Arc::clone(&source) as Arc<dyn SourcePlatform>,
        replicator,
        notifier.clone(),
        recovery.clone(),
        publisher.clone(),
        Arc::clone(&failed),
        config,
    ));

    ResolverHarness {
        store,
        source,
        gateway,
        notifier,
        recovery,
        failed,
        publisher,
        resolver,
    }
}

pub fn text_channel(id: &str, workspace_id: &str, name: &str) -> SourceChannel {
    SourceChannel {
        id: id.to_string(),
        workspace_id: workspace_id.to_string(),
        name: name.to_string(),
        kind: EntityKind::Text,
        parent_id: None,
    }
}
