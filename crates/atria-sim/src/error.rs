//! Error types for the simulation harness.

use atria_core::NodeAddress;
use thiserror::Error;

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors that can occur while building or driving a simulated network.
#[derive(Debug, Error)]
pub enum SimError {
    /// A scheduling rule or host operation failed.
    #[error("schedule error: {0}")]
    Schedule(#[from] atria_core::Error),

    /// The node is not part of the network.
    #[error("unknown node {0}")]
    UnknownNode(NodeAddress),

    /// The node is already part of the network.
    #[error("node {0} already joined")]
    DuplicateNode(NodeAddress),

    /// Attaching below the given node would create a routing loop.
    #[error("{node} cannot move below its own descendant {parent}")]
    Loop { node: NodeAddress, parent: NodeAddress },

    /// The root never leaves or moves.
    #[error("the root cannot leave or change parent")]
    RootImmutable,

    /// Invalid simulation parameters.
    #[error("invalid simulation: {0}")]
    InvalidConfig(String),

    /// Snapshot serialization failed.
    #[error("snapshot serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
