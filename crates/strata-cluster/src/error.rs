//! Cluster coordination error types.

use thiserror::Error;

/// Result type alias for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors in cluster membership and lifecycle management.
///
/// These are fatal to the affected role transition (or to coordinator
/// construction); they never corrupt node state.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("failed to join cluster group: {0}")]
    Join(String),

    #[error("membership service error: {0}")]
    Membership(String),

    #[error("no leader elected for group: {0}")]
    NoLeader(String),

    #[error("leader endpoint not published: {0}")]
    LeaderUnpublished(String),

    #[error("failed to start {role} process: {reason}")]
    ProcessStart { role: &'static str, reason: String },

    #[error("failed to forward query to leader: {0}")]
    Forward(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("engine initialization error: {0}")]
    Engine(String),
}
