//! strata-cluster — node lifecycle and query routing for Strata.
//!
//! Leader election lives in an external membership service behind the
//! [`membership::MembershipProvider`] seam. This crate turns its
//! callbacks into serialized role transitions
//! ([`coordinator::ClusterCoordinator`]), routes tenant queries to the
//! node that can answer them ([`router::QueryRouter`]), and starts the
//! compute processes a role requires ([`launch::ProcessLauncher`]).

pub mod config;
pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod launch;
pub mod membership;
pub mod router;

pub use config::ClusterConfig;
pub use coordinator::{
    ClusterCoordinator, EngineConnector, NodeRole, ScanEngineConnector, SharedEngine,
    new_shared_engine,
};
pub use endpoint::ClusterEndpoint;
pub use error::{ClusterError, ClusterResult};
pub use launch::{CommandLauncher, CoordinatorSpec, ProcessLauncher, WorkerSpec};
pub use membership::{
    DisabledMembership, ExecutionHandler, GroupEventListener, LocalGroupHub, LocalMember,
    MembershipProvider,
};
pub use router::QueryRouter;
