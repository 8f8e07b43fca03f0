//! Session driver: one persistent ingestion session per mirror workspace.
//!
//! The driver task owns the live transport and processes its events on a
//! single cooperative loop, preserving per-workspace ordering. Disruptions
//! schedule a delayed full rebuild through a per-workspace re-entrancy guard;
//! a rebuilt session gets a brand-new transport with every handler
//! re-subscribed, never a resumed one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::constants::{events, system};
use crate::events::EventPublisher;
use crate::platform::{
    ConnectedSession, DisruptionClass, EventTransport, SourceChannel, SourceEvent, SourceMessage,
    SourceWorkspace, TransportEvent, TransportFactory,
};
use crate::resolver::{EntityResolver, ResolutionMode};
use crate::services::{MessageProcessor, ProcessedMessageIndex};
use crate::session::backfill::BackfillRunner;
use crate::session::states::SessionState;

/// Tuning for session reconnection and health checks
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Reconnect delay after a connection-reset-family error
    pub reconnect_error_delay: Duration,
    /// Reconnect delay after a clean disconnect
    pub reconnect_disconnect_delay: Duration,
    /// Cadence of the heartbeat check
    pub heartbeat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_error_delay: Duration::from_secs(system::RECONNECT_ERROR_DELAY_SECS),
            reconnect_disconnect_delay: Duration::from_secs(
                system::RECONNECT_DISCONNECT_DELAY_SECS,
            ),
            heartbeat_interval: Duration::from_secs(system::HEARTBEAT_INTERVAL_SECS),
        }
    }
}

/// Shared state and collaborators of one running session
pub(crate) struct SessionContext {
    pub(crate) mirror_workspace_id: String,
    pub(crate) source_workspace_id: String,
    state: RwLock<SessionState>,
    workspace: RwLock<Option<SourceWorkspace>>,
    transport_ready: Mutex<Option<Arc<AtomicBool>>>,
    stop_rx: watch::Receiver<bool>,
    reconnect_pending: AtomicBool,
    reconnects_scheduled: AtomicU64,
    pub(crate) resolver: Arc<EntityResolver>,
    pub(crate) factory: Arc<dyn TransportFactory>,
    pub(crate) processor: Arc<dyn MessageProcessor>,
    pub(crate) processed: Arc<dyn ProcessedMessageIndex>,
    pub(crate) backfill: Arc<BackfillRunner>,
    pub(crate) publisher: EventPublisher,
    pub(crate) config: SessionConfig,
}

impl SessionContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        mirror_workspace_id: String,
        source_workspace_id: String,
        stop_rx: watch::Receiver<bool>,
        resolver: Arc<EntityResolver>,
        factory: Arc<dyn TransportFactory>,
        processor: Arc<dyn MessageProcessor>,
        processed: Arc<dyn ProcessedMessageIndex>,
        backfill: Arc<BackfillRunner>,
        publisher: EventPublisher,
        config: SessionConfig,
    ) -> Self {
        Self {
            mirror_workspace_id,
            source_workspace_id,
            state: RwLock::new(SessionState::Disconnected),
            workspace: RwLock::new(None),
            transport_ready: Mutex::new(None),
            stop_rx,
            reconnect_pending: AtomicBool::new(false),
            reconnects_scheduled: AtomicU64::new(0),
            resolver,
            factory,
            processor,
            processed,
            backfill,
            publisher,
            config,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.read()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    pub(crate) fn stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    pub(crate) fn reconnects_scheduled(&self) -> u64 {
        self.reconnects_scheduled.load(Ordering::SeqCst)
    }

    pub(crate) fn workspace_snapshot(&self) -> SourceWorkspace {
        self.workspace
            .read()
            .clone()
            .unwrap_or_else(|| SourceWorkspace {
                id: self.source_workspace_id.clone(),
                name: String::new(),
            })
    }

    fn transport_is_ready(&self) -> bool {
        self.transport_ready
            .lock()
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Re-entrancy guard: the first disruption signal for an outage wins,
    /// overlapping signals are absorbed
    fn try_schedule_reconnect(&self, class: DisruptionClass) -> bool {
        let won = self
            .reconnect_pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if !won {
            debug!(
                mirror_workspace_id = %self.mirror_workspace_id,
                ?class,
                "Reconnect already scheduled, absorbing duplicate disruption signal"
            );
            return false;
        }

        let delay = self.reconnect_delay(class);
        self.reconnects_scheduled.fetch_add(1, Ordering::SeqCst);
        self.set_state(SessionState::ReconnectScheduled);
        warn!(
            mirror_workspace_id = %self.mirror_workspace_id,
            ?class,
            delay_secs = delay.as_secs_f64(),
            "🔌 Session disrupted, full rebuild scheduled"
        );
        self.publisher.publish(
            events::SESSION_RECONNECT_SCHEDULED,
            serde_json::json!({
                "mirror_workspace_id": self.mirror_workspace_id,
                "class": format!("{class:?}"),
                "delay_ms": delay.as_millis() as u64,
            }),
        );
        true
    }

    fn reconnect_delay(&self, class: DisruptionClass) -> Duration {
        match class {
            DisruptionClass::ConnectionReset => self.config.reconnect_error_delay,
            DisruptionClass::CleanDisconnect => self.config.reconnect_disconnect_delay,
        }
    }

    /// Sleep out the reconnect delay; `false` when the operator stopped the
    /// session meanwhile
    async fn sleep_reconnect(&self, class: DisruptionClass) -> bool {
        if self.stopped() {
            return false;
        }
        let mut stop_rx = self.stop_rx.clone();
        tokio::select! {
            _ = stop_rx.changed() => false,
            () = tokio::time::sleep(self.reconnect_delay(class)) => true,
        }
    }

    pub(crate) async fn dispatch(&self, event: SourceEvent) {
        match event {
            SourceEvent::ChannelCreated { channel } => self.handle_structural(&channel).await,
            SourceEvent::ThreadCreated { thread } => self.handle_structural(&thread).await,
            SourceEvent::MessageCreated { message } | SourceEvent::MessageUpdated { message } => {
                self.handle_message(&message).await;
            }
        }
    }

    /// Structural trigger: a no-op when a non-placeholder mapping already
    /// resolves, checked against the persistent store before creating
    /// anything
    async fn handle_structural(&self, channel: &SourceChannel) {
        if self
            .resolver
            .is_resolved(&channel.id, &channel.workspace_id)
            .await
        {
            debug!(
                source_id = %channel.id,
                "Structural event ignored, mapping already live"
            );
            return;
        }
        if self
            .resolver
            .resolve_event_channel(channel, &self.mirror_workspace_id)
            .await
            .is_none()
        {
            warn!(
                source_id = %channel.id,
                name = %channel.name,
                "Structural event left entity unresolved"
            );
        }
    }

    /// Content trigger: resolve the room, pre-filter processed ids, and hand
    /// the raw message to the processing collaborator
    async fn handle_message(&self, message: &SourceMessage) {
        let resolved = self
            .resolver
            .resolve_mirror_channel(
                &message.channel_id,
                &self.source_workspace_id,
                &self.mirror_workspace_id,
                ResolutionMode::CreateIfMissing,
            )
            .await;
        if resolved.is_none() {
            debug!(
                channel_id = %message.channel_id,
                message_id = %message.id,
                "Message dropped, room unresolved"
            );
            return;
        }

        if self.processed.is_processed(&message.id).await {
            return;
        }
        let Some(mapping) = self
            .resolver
            .find_mapping(&message.channel_id, &self.source_workspace_id)
            .await
        else {
            return;
        };

        let workspace = self.workspace_snapshot();
        if let Err(err) = self
            .processor
            .process_message(message, &mapping, &workspace)
            .await
        {
            warn!(
                message_id = %message.id,
                error = %err,
                "Message processing failed"
            );
        }
    }
}

/// Driver task: connect, pump events, and rebuild on disruption until stopped
pub(crate) async fn run(ctx: Arc<SessionContext>) {
    ctx.resolver
        .warm_cache_for_workspace(&ctx.source_workspace_id)
        .await;

    loop {
        if ctx.stopped() {
            break;
        }
        ctx.set_state(SessionState::Connecting);

        let connected = match ctx.factory.connect(&ctx.source_workspace_id).await {
            Ok(connected) => connected,
            Err(err) => {
                warn!(
                    mirror_workspace_id = %ctx.mirror_workspace_id,
                    error = %err,
                    "Session connect failed"
                );
                ctx.try_schedule_reconnect(DisruptionClass::ConnectionReset);
                if !ctx.sleep_reconnect(DisruptionClass::ConnectionReset).await {
                    break;
                }
                ctx.reconnect_pending.store(false, Ordering::SeqCst);
                continue;
            }
        };
        let ConnectedSession {
            mut transport,
            workspace,
            ready,
        } = connected;
        *ctx.workspace.write() = Some(workspace);
        *ctx.transport_ready.lock() = Some(ready);
        ctx.set_state(SessionState::Ready);
        info!(
            mirror_workspace_id = %ctx.mirror_workspace_id,
            source_workspace_id = %ctx.source_workspace_id,
            "📡 Session ready, handlers subscribed"
        );
        ctx.publisher.publish(
            events::SESSION_CONNECTED,
            serde_json::json!({
                "mirror_workspace_id": ctx.mirror_workspace_id,
                "source_workspace_id": ctx.source_workspace_id,
            }),
        );

        let mut stop_rx = ctx.stop_rx.clone();
        let disruption: Option<DisruptionClass> = loop {
            if ctx.stopped() {
                break None;
            }
            tokio::select! {
                _ = stop_rx.changed() => break None,
                event = transport.recv() => match event {
                    Some(TransportEvent::Event(event)) => ctx.dispatch(event).await,
                    Some(TransportEvent::ConnectionError(reason)) => {
                        ctx.publisher.publish(
                            events::SESSION_DISRUPTED,
                            serde_json::json!({
                                "mirror_workspace_id": ctx.mirror_workspace_id,
                                "reason": reason,
                            }),
                        );
                        break Some(DisruptionClass::ConnectionReset);
                    }
                    Some(TransportEvent::Disconnected) | None => {
                        break Some(DisruptionClass::CleanDisconnect);
                    }
                },
            }
        };

        if let Some(class) = disruption {
            ctx.try_schedule_reconnect(class);
            // An outage usually surfaces as both an error event and a
            // disconnect event; the guard absorbs whatever is still queued.
            while let Some(Some(event)) = transport.recv().now_or_never() {
                match event {
                    TransportEvent::ConnectionError(_) => {
                        ctx.try_schedule_reconnect(DisruptionClass::ConnectionReset);
                    }
                    TransportEvent::Disconnected => {
                        ctx.try_schedule_reconnect(DisruptionClass::CleanDisconnect);
                    }
                    TransportEvent::Event(_) => {}
                }
            }
        }

        // Handlers must be unsubscribed before the connection is released so
        // nothing re-enters a destroyed context.
        transport.close().await;
        drop(transport);
        *ctx.transport_ready.lock() = None;

        let Some(class) = disruption else { break };
        if !ctx.sleep_reconnect(class).await {
            break;
        }
        ctx.reconnect_pending.store(false, Ordering::SeqCst);
    }

    ctx.set_state(SessionState::Stopped);
    *ctx.transport_ready.lock() = None;
    ctx.publisher.publish(
        events::SESSION_STOPPED,
        serde_json::json!({ "mirror_workspace_id": ctx.mirror_workspace_id }),
    );
    info!(
        mirror_workspace_id = %ctx.mirror_workspace_id,
        "Session stopped"
    );
}

/// Heartbeat task: assert the transport's ready sub-state on a fixed
/// cadence. Deviations are logged only; correction happens exclusively on
/// the reconnect path.
pub(crate) async fn heartbeat(ctx: Arc<SessionContext>) {
    let mut ticker = tokio::time::interval(ctx.config.heartbeat_interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if ctx.stopped() {
            break;
        }
        let state = ctx.state();
        if state.is_ready() && !ctx.transport_is_ready() {
            warn!(
                mirror_workspace_id = %ctx.mirror_workspace_id,
                %state,
                "💓 Transport lost its ready sub-state, awaiting reconnect path"
            );
        } else {
            debug!(
                mirror_workspace_id = %ctx.mirror_workspace_id,
                %state,
                "💓 Heartbeat"
            );
        }
    }
}

/// Backfill pump: serializes backfill batches per mirror workspace by
/// draining `mirror.room_created` events on one task.
///
/// The receiver is subscribed by the registry before any driver work starts
/// so no creation signal can slip past it.
pub(crate) async fn backfill_pump(
    ctx: Arc<SessionContext>,
    mut receiver: broadcast::Receiver<crate::events::PublishedEvent>,
) {
    loop {
        if ctx.stopped() {
            break;
        }
        let mut stop_rx = ctx.stop_rx.clone();
        let received = tokio::select! {
            _ = stop_rx.changed() => break,
            received = receiver.recv() => received,
        };
        match received {
            Ok(event) if event.name == events::MIRROR_ROOM_CREATED => {
                if event.context["mirror_workspace_id"] != ctx.mirror_workspace_id.as_str() {
                    continue;
                }
                let Some(source_id) = event.context["source_id"].as_str() else {
                    continue;
                };
                let source_workspace_id = event.context["source_workspace_id"]
                    .as_str()
                    .unwrap_or(&ctx.source_workspace_id);
                let Some(mapping) = ctx.resolver.find_mapping(source_id, source_workspace_id).await
                else {
                    continue;
                };
                let workspace = ctx.workspace_snapshot();
                ctx.backfill.backfill(source_id, &mapping, &workspace).await;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(
                    mirror_workspace_id = %ctx.mirror_workspace_id,
                    skipped,
                    "Backfill pump lagged behind the event stream"
                );
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
