//! Error types for the synchronization engine

use winsync_hal::HostError;

use crate::manager::Lifecycle;

/// Errors surfaced by the engine.
///
/// Only initialization and host construction return these to callers; at
/// runtime the engine logs failures and keeps its last-known state.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A host capability failed.
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation is not valid in the manager's current lifecycle state.
    #[error("operation not allowed while {0}")]
    Lifecycle(Lifecycle),
}
