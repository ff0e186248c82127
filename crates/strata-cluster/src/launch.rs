//! Compute-process launching.
//!
//! The coordinator and worker compute processes are external programs;
//! `ProcessLauncher` is the seam the lifecycle drives. `CommandLauncher`
//! spawns them as child processes; tests substitute a recording
//! implementation.

use std::path::Path;
use std::process::{Child, Command};
use std::sync::Mutex;

use tracing::{info, warn};

use crate::endpoint::ClusterEndpoint;
use crate::error::{ClusterError, ClusterResult};

/// Parameters for the coordinator compute process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSpec {
    pub endpoint: ClusterEndpoint,
}

/// Parameters for a worker compute process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub endpoint: ClusterEndpoint,
    pub leader_host: String,
    pub leader_port: u16,
    pub cores: String,
    pub memory: String,
    pub work_dir: String,
}

/// Starts compute processes on this node.
pub trait ProcessLauncher: Send + Sync {
    fn start_coordinator(&self, spec: &CoordinatorSpec) -> ClusterResult<()>;
    fn start_worker(&self, spec: &WorkerSpec) -> ClusterResult<()>;
}

/// Launcher that spawns the compute program as child processes and
/// kills them on drop.
pub struct CommandLauncher {
    program: String,
    children: Mutex<Vec<Child>>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            children: Mutex::new(Vec::new()),
        }
    }

    fn spawn(&self, role: &'static str, args: &[String]) -> ClusterResult<()> {
        let child = Command::new(&self.program)
            .args(args)
            .spawn()
            .map_err(|e| ClusterError::ProcessStart {
                role,
                reason: e.to_string(),
            })?;
        info!(role, pid = child.id(), "compute process started");
        self.children.lock().expect("children lock").push(child);
        Ok(())
    }
}

impl ProcessLauncher for CommandLauncher {
    fn start_coordinator(&self, spec: &CoordinatorSpec) -> ClusterResult<()> {
        self.spawn(
            "coordinator",
            &[
                "coordinator".to_string(),
                "--host".to_string(),
                spec.endpoint.host.clone(),
                "--port".to_string(),
                spec.endpoint.port.to_string(),
                "--ui-port".to_string(),
                spec.endpoint.ui_port.to_string(),
            ],
        )
    }

    fn start_worker(&self, spec: &WorkerSpec) -> ClusterResult<()> {
        self.spawn(
            "worker",
            &[
                "worker".to_string(),
                "--host".to_string(),
                spec.endpoint.host.clone(),
                "--port".to_string(),
                spec.endpoint.port.to_string(),
                "--ui-port".to_string(),
                spec.endpoint.ui_port.to_string(),
                "--leader".to_string(),
                format!("{}:{}", spec.leader_host, spec.leader_port),
                "--cores".to_string(),
                spec.cores.clone(),
                "--memory".to_string(),
                spec.memory.clone(),
                "--work-dir".to_string(),
                spec.work_dir.clone(),
            ],
        )
    }
}

impl Drop for CommandLauncher {
    fn drop(&mut self) {
        let mut children = self.children.lock().expect("children lock");
        for child in children.iter_mut() {
            if let Err(e) = child.kill() {
                warn!(pid = child.id(), error = %e, "failed to kill compute process");
            }
        }
    }
}

/// Make the compute helper script executable by owner and group.
///
/// A failure is logged and ignored: the script may live on a read-only
/// install and already carry the right mode.
pub fn normalize_script_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o770)) {
            warn!(path = %path.display(), error = %e, "could not adjust helper script permissions");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
