//! Compute-process endpoints and the well-known base ports.

use serde::{Deserialize, Serialize};

/// Default coordinator process port before the node's offset is applied.
pub const BASE_COORDINATOR_PORT: u16 = 7077;
/// Default coordinator web UI port before the offset is applied.
pub const BASE_COORDINATOR_UI_PORT: u16 = 8081;
/// Default worker process port before the offset is applied.
pub const BASE_WORKER_PORT: u16 = 4501;
/// Default worker web UI port before the offset is applied.
pub const BASE_WORKER_UI_PORT: u16 = 8090;

/// A compute process's listen addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    pub host: String,
    pub port: u16,
    pub ui_port: u16,
}

impl ClusterEndpoint {
    pub fn new(host: impl Into<String>, port: u16, ui_port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ui_port,
        }
    }

    /// `host:port` form, as published to the group.
    pub fn url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
