//! # Platform Seams
//!
//! Typed boundaries to the chat platform: read access to the source
//! workspace over REST, structural write access to the mirror workspace, and
//! the persistent event-ingestion transport.
//!
//! All three are traits so the session and resolver layers stay independent
//! of any concrete platform client.

pub mod gateway;
pub mod source;
pub mod transport;
pub mod types;

pub use gateway::MirrorGateway;
pub use source::{RestSourcePlatform, SourcePlatform};
pub use transport::{
    ConnectedSession, DisruptionClass, EventTransport, SourceEvent, TransportEvent,
    TransportFactory,
};
pub use types::{MirrorRoom, NewMirrorRoom, SourceChannel, SourceMessage, SourceWorkspace};
