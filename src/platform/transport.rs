//! Persistent event-ingestion transport.
//!
//! A session owns exactly one transport at a time. Reconnection never
//! resumes: the factory is asked for a brand-new connection and the session
//! re-subscribes its handlers against it.

use async_trait::async_trait;

use crate::platform::types::{SourceChannel, SourceMessage, SourceWorkspace};

/// Structural and content events observed on the source workspace
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    ChannelCreated { channel: SourceChannel },
    ThreadCreated { thread: SourceChannel },
    MessageCreated { message: SourceMessage },
    MessageUpdated { message: SourceMessage },
}

/// The two disruption classes, each with its own fixed reconnect delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisruptionClass {
    /// Connection-reset-family transport error
    ConnectionReset,
    /// Clean disconnect notified by the platform
    CleanDisconnect,
}

/// What a live transport yields to the session event pump
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Event(SourceEvent),
    /// Reset-family transport error; the session schedules a slow reconnect
    ConnectionError(String),
    /// Clean disconnect; the session schedules a fast reconnect
    Disconnected,
}

/// One live ingestion connection
#[async_trait]
pub trait EventTransport: Send {
    /// Next transport event; `None` once the stream is exhausted
    async fn recv(&mut self) -> Option<TransportEvent>;

    /// Release the underlying connection
    async fn close(&mut self);
}

/// A freshly established connection plus the source workspace snapshot.
///
/// `ready` is maintained by the transport implementation and mirrors its
/// internal ready sub-state; the session heartbeat reads it without touching
/// the connection itself.
pub struct ConnectedSession {
    pub transport: Box<dyn EventTransport>,
    pub workspace: SourceWorkspace,
    pub ready: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

/// Builds brand-new connections for a session; called on start and on every
/// reconnect
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, source_workspace_id: &str) -> crate::error::Result<ConnectedSession>;
}
