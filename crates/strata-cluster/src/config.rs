//! Cluster configuration.
//!
//! Every node carries a `ClusterConfig`; unset fields fall back to the
//! well-known base ports shifted by the node's `port_offset`. An
//! optional defaults file can overlay unset fields at transition time,
//! so a freshly elected leader picks up cluster-wide settings without
//! a restart.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::endpoint::{
    BASE_COORDINATOR_PORT, BASE_COORDINATOR_UI_PORT, BASE_WORKER_PORT, BASE_WORKER_UI_PORT,
    ClusterEndpoint,
};
use crate::error::{ClusterError, ClusterResult};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_APP_NAME: &str = "strata-analytics";
const DEFAULT_WORKER_CORES: &str = "1";
const DEFAULT_WORKER_MEMORY: &str = "1g";
const DEFAULT_WORK_DIR: &str = "work";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Host the compute processes bind to and publish.
    pub host: String,
    /// Shift applied to every base port, so multiple nodes can share a
    /// machine.
    pub port_offset: u16,
    pub app_name: Option<String>,
    pub coordinator_port: Option<u16>,
    pub coordinator_ui_port: Option<u16>,
    pub worker_port: Option<u16>,
    pub worker_ui_port: Option<u16>,
    pub worker_cores: Option<String>,
    pub worker_memory: Option<String>,
    pub work_dir: Option<String>,
    /// Helper script whose permissions are normalized at startup.
    pub helper_script: Option<PathBuf>,
    /// Optional defaults file overlaid onto unset fields at transition
    /// time.
    pub defaults_path: Option<PathBuf>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port_offset: 0,
            app_name: None,
            coordinator_port: None,
            coordinator_ui_port: None,
            worker_port: None,
            worker_ui_port: None,
            worker_cores: None,
            worker_memory: None,
            work_dir: None,
            helper_script: None,
            defaults_path: None,
        }
    }
}

impl ClusterConfig {
    pub fn from_file(path: impl AsRef<Path>) -> ClusterResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| ClusterError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| ClusterError::Config(format!("{}: {e}", path.display())))
    }

    /// This config with the defaults file (if any) overlaid onto unset
    /// fields. A missing or unreadable defaults file is logged and
    /// skipped; node-local settings always win.
    pub fn with_cluster_defaults(&self) -> Self {
        let Some(path) = &self.defaults_path else {
            return self.clone();
        };
        let defaults = match Self::from_file(path) {
            Ok(defaults) => {
                info!(path = %path.display(), "loaded cluster defaults");
                defaults
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cluster defaults unavailable, using node config");
                return self.clone();
            }
        };
        let mut merged = self.clone();
        merged.app_name = merged.app_name.or(defaults.app_name);
        merged.coordinator_port = merged.coordinator_port.or(defaults.coordinator_port);
        merged.coordinator_ui_port = merged.coordinator_ui_port.or(defaults.coordinator_ui_port);
        merged.worker_port = merged.worker_port.or(defaults.worker_port);
        merged.worker_ui_port = merged.worker_ui_port.or(defaults.worker_ui_port);
        merged.worker_cores = merged.worker_cores.or(defaults.worker_cores);
        merged.worker_memory = merged.worker_memory.or(defaults.worker_memory);
        merged.work_dir = merged.work_dir.or(defaults.work_dir);
        merged
    }

    pub fn coordinator_endpoint(&self) -> ClusterEndpoint {
        ClusterEndpoint::new(
            self.host.clone(),
            self.coordinator_port
                .unwrap_or(BASE_COORDINATOR_PORT + self.port_offset),
            self.coordinator_ui_port
                .unwrap_or(BASE_COORDINATOR_UI_PORT + self.port_offset),
        )
    }

    pub fn worker_endpoint(&self) -> ClusterEndpoint {
        ClusterEndpoint::new(
            self.host.clone(),
            self.worker_port.unwrap_or(BASE_WORKER_PORT + self.port_offset),
            self.worker_ui_port
                .unwrap_or(BASE_WORKER_UI_PORT + self.port_offset),
        )
    }

    pub fn app_name(&self) -> &str {
        self.app_name.as_deref().unwrap_or(DEFAULT_APP_NAME)
    }

    pub fn worker_cores(&self) -> &str {
        self.worker_cores.as_deref().unwrap_or(DEFAULT_WORKER_CORES)
    }

    pub fn worker_memory(&self) -> &str {
        self.worker_memory.as_deref().unwrap_or(DEFAULT_WORKER_MEMORY)
    }

    pub fn work_dir(&self) -> &str {
        self.work_dir.as_deref().unwrap_or(DEFAULT_WORK_DIR)
    }
}
