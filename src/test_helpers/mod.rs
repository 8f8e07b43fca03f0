//! # Test Helpers
//!
//! In-memory collaborators for exercising the resolver and session layers
//! without a database, a network, or a live platform connection. Used by the
//! integration tests under `tests/` and available to downstream crates for
//! their own harnesses.

pub mod mocks;

pub use mocks::{
    MemoryMappingStore, MockMirrorGateway, MockRecoveryService, MockSourcePlatform,
    NotificationRecord, RecordingNotifier, RecordingProcessor, ScriptedTransportFactory,
    SetProcessedIndex,
};
