//! ClusterCoordinator — the leader-election lifecycle of one node.
//!
//! Election callbacks arrive on membership-service threads and must not
//! block there; they are converted to `ClusterEvent`s and drained by a
//! dedicated transition thread, so role transitions are serialized and
//! run in arrival order. The compute engine lives in a shared slot that
//! the router reads on every query: `None` until this node (as leader)
//! connects an engine, `None` again after shutdown.
//!
//! A deposed leader keeps its last engine handle until the next
//! transition replaces it. Queries racing a transition can observe the
//! stale handle; the router surfaces engine errors rather than guessing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use tracing::{error, info, warn};

use strata_query::{ComputeEngine, ScanEngine};

use crate::config::ClusterConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::launch::{self, CoordinatorSpec, ProcessLauncher, WorkerSpec};
use crate::membership::{ExecutionHandler, GroupEventListener, MembershipProvider};

/// Group every execution node joins.
pub const EXECUTION_GROUP: &str = "strata_execution";
/// Group property carrying the elected coordinator's host.
pub const LEADER_HOST_PROP: &str = "COORDINATOR_HOST";
/// Group property carrying the elected coordinator's port.
pub const LEADER_PORT_PROP: &str = "COORDINATOR_PORT";

/// Where this node currently sits in the election lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Clustering disabled; this node runs its own engine.
    Standalone,
    /// Joined the group, no transition processed yet.
    Joining,
    Leader,
    Follower,
}

/// The engine slot shared between the coordinator (writer) and the
/// router (reader).
pub type SharedEngine = Arc<RwLock<Option<Arc<dyn ComputeEngine>>>>;

pub fn new_shared_engine() -> SharedEngine {
    Arc::new(RwLock::new(None))
}

/// Connects to (or hosts) a compute engine.
pub trait EngineConnector: Send + Sync {
    /// An engine embedded in this process, for standalone nodes.
    fn connect_local(&self, app_name: &str) -> ClusterResult<Arc<dyn ComputeEngine>>;

    /// A client for the coordinator process at `host:port`.
    fn connect(&self, host: &str, port: u16, app_name: &str)
    -> ClusterResult<Arc<dyn ComputeEngine>>;
}

/// Connector backed by the in-process scan engine. Standalone
/// deployments and tests use it; it ignores the endpoint.
pub struct ScanEngineConnector;

impl EngineConnector for ScanEngineConnector {
    fn connect_local(&self, app_name: &str) -> ClusterResult<Arc<dyn ComputeEngine>> {
        info!(app_name, "starting in-process scan engine");
        Ok(Arc::new(ScanEngine::new()))
    }

    fn connect(
        &self,
        host: &str,
        port: u16,
        app_name: &str,
    ) -> ClusterResult<Arc<dyn ComputeEngine>> {
        info!(app_name, host, port, "starting in-process scan engine for leader");
        Ok(Arc::new(ScanEngine::new()))
    }
}

/// Transition events, queued from membership callbacks.
enum ClusterEvent {
    BecomingLeader,
    LeaderUpdate,
    MembersChanged,
    Shutdown,
}

/// Bridges membership callbacks onto the transition queue. Send errors
/// mean the coordinator is already shutting down and are ignored.
struct EventForwarder {
    tx: Mutex<Sender<ClusterEvent>>,
}

impl GroupEventListener for EventForwarder {
    fn on_becoming_leader(&self) {
        let _ = self.tx.lock().expect("event tx lock").send(ClusterEvent::BecomingLeader);
    }

    fn on_leader_update(&self) {
        let _ = self.tx.lock().expect("event tx lock").send(ClusterEvent::LeaderUpdate);
    }

    fn on_members_change_for_leader(&self) {
        let _ = self.tx.lock().expect("event tx lock").send(ClusterEvent::MembersChanged);
    }
}

struct CoordinatorShared {
    config: ClusterConfig,
    membership: Arc<dyn MembershipProvider>,
    launcher: Arc<dyn ProcessLauncher>,
    connector: Arc<dyn EngineConnector>,
    engine: SharedEngine,
    role: Mutex<NodeRole>,
    worker_count: Arc<AtomicUsize>,
}

/// Drives one node through the election lifecycle.
pub struct ClusterCoordinator {
    shared: Arc<CoordinatorShared>,
    tx: Sender<ClusterEvent>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ClusterCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCoordinator")
            .field("role", &self.shared.role.lock().map(|r| *r).ok())
            .finish_non_exhaustive()
    }
}

impl ClusterCoordinator {
    /// Bring this node up.
    ///
    /// Standalone nodes connect their engine immediately. Clustered
    /// nodes register `handler` for forwarded calls and join the
    /// execution group; a join failure is fatal. The shared `engine`
    /// slot and `worker_count` are the same values the router holds.
    pub fn new(
        config: ClusterConfig,
        membership: Arc<dyn MembershipProvider>,
        launcher: Arc<dyn ProcessLauncher>,
        connector: Arc<dyn EngineConnector>,
        engine: SharedEngine,
        worker_count: Arc<AtomicUsize>,
        handler: Arc<dyn ExecutionHandler>,
    ) -> ClusterResult<Self> {
        let clustered = membership.clustering_enabled();
        let shared = Arc::new(CoordinatorShared {
            config,
            membership,
            launcher,
            connector,
            engine,
            role: Mutex::new(if clustered {
                NodeRole::Joining
            } else {
                NodeRole::Standalone
            }),
            worker_count,
        });

        let (tx, rx) = mpsc::channel();
        if !clustered {
            let local = shared
                .connector
                .connect_local(shared.config.app_name())?;
            *shared.engine.write().expect("engine lock") = Some(local);
            info!("node started standalone");
            return Ok(Self {
                shared,
                tx,
                worker: None,
            });
        }

        if let Some(script) = &shared.config.helper_script {
            launch::normalize_script_permissions(script);
        }

        let worker = {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name("strata-cluster-transitions".to_string())
                .spawn(move || transition_loop(&shared, rx))
                .map_err(|e| ClusterError::Membership(e.to_string()))?
        };

        shared
            .membership
            .register_execution_handler(EXECUTION_GROUP, handler)?;
        shared
            .membership
            .join_group(
                EXECUTION_GROUP,
                Arc::new(EventForwarder {
                    tx: Mutex::new(tx.clone()),
                }),
            )
            .map_err(|e| ClusterError::Join(e.to_string()))?;
        info!("node joined execution group");

        Ok(Self {
            shared,
            tx,
            worker: Some(worker),
        })
    }

    pub fn role(&self) -> NodeRole {
        *self.shared.role.lock().expect("role lock")
    }

    /// Stop the engine and the transition worker. Idempotent.
    pub fn stop(&mut self) {
        let engine = self.shared.engine.write().expect("engine lock").take();
        if let Some(engine) = engine {
            engine.stop();
        }
        let _ = self.tx.send(ClusterEvent::Shutdown);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!("transition worker panicked");
        }
    }
}

impl Drop for ClusterCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drains transition events in arrival order. Handler errors are
/// logged; the loop keeps serving later events.
fn transition_loop(shared: &CoordinatorShared, rx: Receiver<ClusterEvent>) {
    for event in rx {
        let outcome = match event {
            ClusterEvent::BecomingLeader => handle_becoming_leader(shared),
            ClusterEvent::LeaderUpdate => handle_leader_update(shared),
            ClusterEvent::MembersChanged => handle_members_changed(shared),
            ClusterEvent::Shutdown => break,
        };
        if let Err(e) = outcome {
            error!(error = %e, "cluster transition failed");
        }
    }
}

/// Elected leader: start the coordinator process and publish its
/// endpoint to the group.
fn handle_becoming_leader(shared: &CoordinatorShared) -> ClusterResult<()> {
    *shared.role.lock().expect("role lock") = NodeRole::Leader;
    let config = shared.config.with_cluster_defaults();
    let endpoint = config.coordinator_endpoint();

    shared
        .launcher
        .start_coordinator(&CoordinatorSpec {
            endpoint: endpoint.clone(),
        })?;
    shared
        .membership
        .set_property(EXECUTION_GROUP, LEADER_HOST_PROP, &endpoint.host)?;
    shared
        .membership
        .set_property(EXECUTION_GROUP, LEADER_PORT_PROP, &endpoint.port.to_string())?;
    info!(endpoint = %endpoint.url(), "elected leader, coordinator published");
    Ok(())
}

/// Leadership established or changed: start this node's worker against
/// the published coordinator, and on the leader (re)connect the engine.
fn handle_leader_update(shared: &CoordinatorShared) -> ClusterResult<()> {
    let config = shared.config.with_cluster_defaults();
    let leader_host = shared
        .membership
        .get_property(EXECUTION_GROUP, LEADER_HOST_PROP)?
        .ok_or_else(|| ClusterError::LeaderUnpublished(LEADER_HOST_PROP.to_string()))?;
    let leader_port: u16 = shared
        .membership
        .get_property(EXECUTION_GROUP, LEADER_PORT_PROP)?
        .ok_or_else(|| ClusterError::LeaderUnpublished(LEADER_PORT_PROP.to_string()))?
        .parse()
        .map_err(|e| ClusterError::Membership(format!("bad {LEADER_PORT_PROP}: {e}")))?;

    shared.launcher.start_worker(&WorkerSpec {
        endpoint: config.worker_endpoint(),
        leader_host: leader_host.clone(),
        leader_port,
        cores: config.worker_cores().to_string(),
        memory: config.worker_memory().to_string(),
        work_dir: config.work_dir().to_string(),
    })?;
    info!(leader = %leader_host, "worker started against leader");

    if shared.membership.is_leader(EXECUTION_GROUP)? {
        let engine = shared
            .connector
            .connect(&leader_host, leader_port, config.app_name())?;
        let previous = shared
            .engine
            .write()
            .expect("engine lock")
            .replace(engine);
        if let Some(previous) = previous {
            previous.stop();
        }
        info!("engine connected on leader");
    } else {
        *shared.role.lock().expect("role lock") = NodeRole::Follower;
    }
    Ok(())
}

/// Membership changed: refresh the worker-count hint the router reads.
fn handle_members_changed(shared: &CoordinatorShared) -> ClusterResult<()> {
    match shared.membership.members(EXECUTION_GROUP) {
        Ok(members) => {
            shared.worker_count.store(members.len(), Ordering::SeqCst);
            info!(workers = members.len(), "cluster membership changed");
        }
        Err(e) => warn!(error = %e, "could not refresh member count"),
    }
    Ok(())
}
