//! Session registry: explicit workspace-id to session-handle mapping with a
//! start/stop lifecycle. One active session per mirror workspace; sessions
//! for different workspaces run fully in parallel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{MirrorError, Result};
use crate::events::EventPublisher;
use crate::platform::{SourcePlatform, TransportFactory};
use crate::resolver::EntityResolver;
use crate::services::{MessageProcessor, ProcessedMessageIndex};
use crate::session::backfill::{BackfillConfig, BackfillRunner};
use crate::session::session::{self, SessionConfig, SessionContext};
use crate::session::states::SessionState;

/// Handle to one running session and its worker tasks
pub struct SessionHandle {
    ctx: Arc<SessionContext>,
    stop_tx: watch::Sender<bool>,
    driver: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
    backfill_pump: JoinHandle<()>,
}

/// Owns every ingestion session, keyed by mirror workspace id
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
    resolver: Arc<EntityResolver>,
    source: Arc<dyn SourcePlatform>,
    factory: Arc<dyn TransportFactory>,
    processor: Arc<dyn MessageProcessor>,
    processed: Arc<dyn ProcessedMessageIndex>,
    publisher: EventPublisher,
    config: SessionConfig,
    backfill_config: BackfillConfig,
}

impl SessionRegistry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resolver: Arc<EntityResolver>,
        source: Arc<dyn SourcePlatform>,
        factory: Arc<dyn TransportFactory>,
        processor: Arc<dyn MessageProcessor>,
        processed: Arc<dyn ProcessedMessageIndex>,
        publisher: EventPublisher,
        config: SessionConfig,
        backfill_config: BackfillConfig,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            resolver,
            source,
            factory,
            processor,
            processed,
            publisher,
            config,
            backfill_config,
        }
    }

    /// Start the session for a mirror workspace.
    ///
    /// Fails when one is already running; stop it first to rebuild by hand.
    pub fn start(&self, mirror_workspace_id: &str, source_workspace_id: &str) -> Result<()> {
        if self.sessions.contains_key(mirror_workspace_id) {
            return Err(MirrorError::InvalidState(format!(
                "session already running for mirror workspace {mirror_workspace_id}"
            )));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let backfill = Arc::new(BackfillRunner::new(
            Arc::clone(&self.source),
            Arc::clone(&self.processor),
            Arc::clone(&self.processed),
            self.publisher.clone(),
            self.backfill_config.clone(),
        ));
        let ctx = Arc::new(SessionContext::new(
            mirror_workspace_id.to_string(),
            source_workspace_id.to_string(),
            stop_rx,
            Arc::clone(&self.resolver),
            Arc::clone(&self.factory),
            Arc::clone(&self.processor),
            Arc::clone(&self.processed),
            backfill,
            self.publisher.clone(),
            self.config.clone(),
        ));

        // Subscribe before the driver can publish its first creation signal.
        let backfill_receiver = self.publisher.subscribe();
        let driver = tokio::spawn(session::run(Arc::clone(&ctx)));
        let heartbeat = tokio::spawn(session::heartbeat(Arc::clone(&ctx)));
        let backfill_pump = tokio::spawn(session::backfill_pump(Arc::clone(&ctx), backfill_receiver));

        info!(
            mirror_workspace_id,
            source_workspace_id, "🚀 Session started"
        );
        self.sessions.insert(
            mirror_workspace_id.to_string(),
            SessionHandle {
                ctx,
                stop_tx,
                driver,
                heartbeat,
                backfill_pump,
            },
        );
        Ok(())
    }

    /// Operator stop: terminal for the session, returns once the driver has
    /// unsubscribed its handlers and released the transport
    pub async fn stop(&self, mirror_workspace_id: &str) -> bool {
        let Some((_, handle)) = self.sessions.remove(mirror_workspace_id) else {
            return false;
        };
        let _ = handle.stop_tx.send(true);
        let _ = handle.driver.await;
        handle.heartbeat.abort();
        handle.backfill_pump.abort();
        info!(mirror_workspace_id, "🛑 Session stopped by operator");
        true
    }

    pub fn is_running(&self, mirror_workspace_id: &str) -> bool {
        self.sessions.contains_key(mirror_workspace_id)
    }

    /// Health state of a registered session
    pub fn state(&self, mirror_workspace_id: &str) -> Option<SessionState> {
        self.sessions
            .get(mirror_workspace_id)
            .map(|handle| handle.ctx.state())
    }

    /// How many reconnects this session has scheduled since start
    pub fn reconnects_scheduled(&self, mirror_workspace_id: &str) -> Option<u64> {
        self.sessions
            .get(mirror_workspace_id)
            .map(|handle| handle.ctx.reconnects_scheduled())
    }

    pub fn running_count(&self) -> usize {
        self.sessions.len()
    }
}
