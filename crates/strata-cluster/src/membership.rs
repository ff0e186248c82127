//! Membership seam — the external group-membership/election service.
//!
//! Leader election itself is out of scope: an external service decides
//! who leads and delivers transition events. `MembershipProvider` is
//! the narrow surface Strata consumes; `GroupEventListener` is the
//! callback trait a node registers when joining a group.
//!
//! `LocalGroupHub` is the in-process implementation used by standalone
//! deployments' tests and multi-node simulations: one shared hub, one
//! `LocalMember` handle per logical node, and explicit `elect`/`part`
//! drivers that fire callbacks in the delivery order the real service
//! guarantees (leader's `on_becoming_leader`, then `on_leader_update`
//! on every member, then `on_members_change_for_leader` on the leader).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use strata_store::{ExecutionCall, QueryResult};

use crate::error::{ClusterError, ClusterResult};

/// Election callbacks delivered to a group member.
///
/// Implementations must not block: handlers are expected to enqueue
/// work for the coordinator's transition worker and return.
pub trait GroupEventListener: Send + Sync {
    /// This node has been elected leader.
    fn on_becoming_leader(&self);

    /// Leadership was established or changed; fires on every node,
    /// including the leader itself.
    fn on_leader_update(&self);

    /// Group membership changed; fires on the leader.
    fn on_members_change_for_leader(&self);
}

/// Remote execution entry point a node exposes to its peers.
///
/// The error side is a plain string: it crosses the node boundary.
pub trait ExecutionHandler: Send + Sync {
    fn execute(&self, call: ExecutionCall) -> Result<Option<QueryResult>, String>;
}

/// The membership/election service surface.
pub trait MembershipProvider: Send + Sync {
    /// Whether this node participates in a cluster at all.
    fn clustering_enabled(&self) -> bool;

    /// Join a group and register for its election callbacks.
    fn join_group(&self, group: &str, listener: Arc<dyn GroupEventListener>) -> ClusterResult<()>;

    /// Expose an execution handler for calls forwarded to this node.
    fn register_execution_handler(
        &self,
        group: &str,
        handler: Arc<dyn ExecutionHandler>,
    ) -> ClusterResult<()>;

    /// Whether this node is the group's current leader.
    fn is_leader(&self, group: &str) -> ClusterResult<bool>;

    /// The current leader's node id.
    fn leader_of(&self, group: &str) -> ClusterResult<String>;

    /// Execute a call on the target node and return its result.
    /// Blocks until the remote node answers or errors; no timeout.
    fn forward_call(
        &self,
        group: &str,
        target: &str,
        call: ExecutionCall,
    ) -> ClusterResult<Option<QueryResult>>;

    /// Current member ids, in join order.
    fn members(&self, group: &str) -> ClusterResult<Vec<String>>;

    /// Read a shared group property.
    fn get_property(&self, group: &str, key: &str) -> ClusterResult<Option<String>>;

    /// Publish a shared group property.
    fn set_property(&self, group: &str, key: &str, value: &str) -> ClusterResult<()>;
}

/// Membership provider for nodes with clustering disabled.
///
/// `clustering_enabled` is false and every group operation is an
/// error; a standalone coordinator never invokes them.
pub struct DisabledMembership;

impl MembershipProvider for DisabledMembership {
    fn clustering_enabled(&self) -> bool {
        false
    }

    fn join_group(&self, group: &str, _: Arc<dyn GroupEventListener>) -> ClusterResult<()> {
        Err(ClusterError::Membership(format!(
            "clustering disabled, cannot join group: {group}"
        )))
    }

    fn register_execution_handler(
        &self,
        group: &str,
        _: Arc<dyn ExecutionHandler>,
    ) -> ClusterResult<()> {
        Err(ClusterError::Membership(format!(
            "clustering disabled, cannot register handler for group: {group}"
        )))
    }

    fn is_leader(&self, _: &str) -> ClusterResult<bool> {
        Ok(true)
    }

    fn leader_of(&self, group: &str) -> ClusterResult<String> {
        Err(ClusterError::NoLeader(group.to_string()))
    }

    fn forward_call(
        &self,
        _: &str,
        _: &str,
        _: ExecutionCall,
    ) -> ClusterResult<Option<QueryResult>> {
        Err(ClusterError::Forward("clustering disabled".to_string()))
    }

    fn members(&self, _: &str) -> ClusterResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn get_property(&self, _: &str, _: &str) -> ClusterResult<Option<String>> {
        Ok(None)
    }

    fn set_property(&self, _: &str, _: &str, _: &str) -> ClusterResult<()> {
        Ok(())
    }
}

/// Per-group state inside the hub.
#[derive(Default)]
struct GroupState {
    members: Vec<String>,
    leader: Option<String>,
    properties: HashMap<String, String>,
    listeners: HashMap<String, Arc<dyn GroupEventListener>>,
    handlers: HashMap<String, Arc<dyn ExecutionHandler>>,
}

/// Shared in-process election hub.
#[derive(Clone, Default)]
pub struct LocalGroupHub {
    groups: Arc<Mutex<HashMap<String, GroupState>>>,
}

impl LocalGroupHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A membership handle for one logical node.
    pub fn member(&self, node_id: impl Into<String>) -> LocalMember {
        LocalMember {
            hub: self.clone(),
            node_id: node_id.into(),
        }
    }

    /// Make `node_id` the group leader and fire callbacks in delivery
    /// order.
    pub fn elect(&self, group: &str, node_id: &str) {
        let (leader_listener, member_listeners) = {
            let mut groups = self.groups.lock().expect("hub lock");
            let state = groups.entry(group.to_string()).or_default();
            state.leader = Some(node_id.to_string());
            let leader = state.listeners.get(node_id).cloned();
            let members: Vec<_> = state
                .members
                .iter()
                .filter_map(|m| state.listeners.get(m).cloned())
                .collect();
            (leader, members)
        };
        // Callbacks fire outside the hub lock; listeners may call back in.
        info!(group, leader = node_id, "leader elected");
        if let Some(listener) = &leader_listener {
            listener.on_becoming_leader();
        }
        for listener in &member_listeners {
            listener.on_leader_update();
        }
        if let Some(listener) = &leader_listener {
            listener.on_members_change_for_leader();
        }
    }

    /// Remove a node from the group, notifying the leader.
    pub fn part(&self, group: &str, node_id: &str) {
        let leader_listener = {
            let mut groups = self.groups.lock().expect("hub lock");
            let state = groups.entry(group.to_string()).or_default();
            state.members.retain(|m| m != node_id);
            state.listeners.remove(node_id);
            state.handlers.remove(node_id);
            if state.leader.as_deref() == Some(node_id) {
                state.leader = None;
                None
            } else {
                state
                    .leader
                    .as_ref()
                    .and_then(|l| state.listeners.get(l).cloned())
            }
        };
        debug!(group, node_id, "member left");
        if let Some(listener) = leader_listener {
            listener.on_members_change_for_leader();
        }
    }
}

/// One logical node's view of the hub.
#[derive(Clone)]
pub struct LocalMember {
    hub: LocalGroupHub,
    node_id: String,
}

impl LocalMember {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

impl MembershipProvider for LocalMember {
    fn clustering_enabled(&self) -> bool {
        true
    }

    fn join_group(&self, group: &str, listener: Arc<dyn GroupEventListener>) -> ClusterResult<()> {
        let (joined_leader, leader_listener) = {
            let mut groups = self.hub.groups.lock().expect("hub lock");
            let state = groups.entry(group.to_string()).or_default();
            if !state.members.contains(&self.node_id) {
                state.members.push(self.node_id.clone());
            }
            state.listeners.insert(self.node_id.clone(), listener.clone());
            let leader_listener = state
                .leader
                .as_ref()
                .filter(|l| l.as_str() != self.node_id)
                .and_then(|l| state.listeners.get(l).cloned());
            (state.leader.is_some(), leader_listener)
        };
        info!(group, node_id = %self.node_id, "joined cluster group");
        // A late joiner learns about an already-elected leader, and the
        // leader learns about the new member.
        if joined_leader {
            listener.on_leader_update();
        }
        if let Some(leader) = leader_listener {
            leader.on_members_change_for_leader();
        }
        Ok(())
    }

    fn register_execution_handler(
        &self,
        group: &str,
        handler: Arc<dyn ExecutionHandler>,
    ) -> ClusterResult<()> {
        let mut groups = self.hub.groups.lock().expect("hub lock");
        let state = groups.entry(group.to_string()).or_default();
        state.handlers.insert(self.node_id.clone(), handler);
        Ok(())
    }

    fn is_leader(&self, group: &str) -> ClusterResult<bool> {
        let groups = self.hub.groups.lock().expect("hub lock");
        Ok(groups
            .get(group)
            .and_then(|s| s.leader.as_deref())
            .is_some_and(|l| l == self.node_id))
    }

    fn leader_of(&self, group: &str) -> ClusterResult<String> {
        let groups = self.hub.groups.lock().expect("hub lock");
        groups
            .get(group)
            .and_then(|s| s.leader.clone())
            .ok_or_else(|| ClusterError::NoLeader(group.to_string()))
    }

    fn forward_call(
        &self,
        group: &str,
        target: &str,
        call: ExecutionCall,
    ) -> ClusterResult<Option<QueryResult>> {
        let handler = {
            let groups = self.hub.groups.lock().expect("hub lock");
            groups
                .get(group)
                .and_then(|s| s.handlers.get(target).cloned())
                .ok_or_else(|| {
                    ClusterError::Forward(format!("no execution handler on node: {target}"))
                })?
        };
        // Executes outside the hub lock: the remote handler may itself
        // touch membership state.
        handler.execute(call).map_err(ClusterError::Forward)
    }

    fn members(&self, group: &str) -> ClusterResult<Vec<String>> {
        let groups = self.hub.groups.lock().expect("hub lock");
        Ok(groups.get(group).map(|s| s.members.clone()).unwrap_or_default())
    }

    fn get_property(&self, group: &str, key: &str) -> ClusterResult<Option<String>> {
        let groups = self.hub.groups.lock().expect("hub lock");
        Ok(groups
            .get(group)
            .and_then(|s| s.properties.get(key).cloned()))
    }

    fn set_property(&self, group: &str, key: &str, value: &str) -> ClusterResult<()> {
        let mut groups = self.hub.groups.lock().expect("hub lock");
        let state = groups.entry(group.to_string()).or_default();
        state.properties.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingListener {
        becoming_leader: AtomicUsize,
        leader_update: AtomicUsize,
        members_change: AtomicUsize,
    }

    impl GroupEventListener for CountingListener {
        fn on_becoming_leader(&self) {
            self.becoming_leader.fetch_add(1, Ordering::SeqCst);
        }
        fn on_leader_update(&self) {
            self.leader_update.fetch_add(1, Ordering::SeqCst);
        }
        fn on_members_change_for_leader(&self) {
            self.members_change.fetch_add(1, Ordering::SeqCst);
        }
    }

    const GROUP: &str = "test_group";

    #[test]
    fn election_fires_callbacks_in_order() {
        let hub = LocalGroupHub::new();
        let a = hub.member("node-a");
        let b = hub.member("node-b");
        let la = Arc::new(CountingListener::default());
        let lb = Arc::new(CountingListener::default());
        a.join_group(GROUP, la.clone()).unwrap();
        b.join_group(GROUP, lb.clone()).unwrap();

        hub.elect(GROUP, "node-a");

        assert_eq!(la.becoming_leader.load(Ordering::SeqCst), 1);
        assert_eq!(la.leader_update.load(Ordering::SeqCst), 1);
        assert_eq!(la.members_change.load(Ordering::SeqCst), 1);
        assert_eq!(lb.becoming_leader.load(Ordering::SeqCst), 0);
        assert_eq!(lb.leader_update.load(Ordering::SeqCst), 1);
        assert_eq!(lb.members_change.load(Ordering::SeqCst), 0);

        assert!(a.is_leader(GROUP).unwrap());
        assert!(!b.is_leader(GROUP).unwrap());
        assert_eq!(a.leader_of(GROUP).unwrap(), "node-a");
    }

    #[test]
    fn late_joiner_sees_existing_leader() {
        let hub = LocalGroupHub::new();
        let a = hub.member("node-a");
        let la = Arc::new(CountingListener::default());
        a.join_group(GROUP, la.clone()).unwrap();
        hub.elect(GROUP, "node-a");

        let b = hub.member("node-b");
        let lb = Arc::new(CountingListener::default());
        b.join_group(GROUP, lb.clone()).unwrap();

        assert_eq!(lb.leader_update.load(Ordering::SeqCst), 1);
        // Leader heard about the new member.
        assert_eq!(la.members_change.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn leader_of_without_election_fails() {
        let hub = LocalGroupHub::new();
        let a = hub.member("node-a");
        a.join_group(GROUP, Arc::new(CountingListener::default()))
            .unwrap();

        assert!(matches!(
            a.leader_of(GROUP).unwrap_err(),
            ClusterError::NoLeader(_)
        ));
    }

    #[test]
    fn properties_are_shared_across_members() {
        let hub = LocalGroupHub::new();
        let a = hub.member("node-a");
        let b = hub.member("node-b");

        a.set_property(GROUP, "COORDINATOR_HOST", "10.0.0.1").unwrap();
        assert_eq!(
            b.get_property(GROUP, "COORDINATOR_HOST").unwrap(),
            Some("10.0.0.1".to_string())
        );
        assert_eq!(b.get_property(GROUP, "missing").unwrap(), None);
    }

    #[test]
    fn forward_call_reaches_target_handler() {
        struct Echo;
        impl ExecutionHandler for Echo {
            fn execute(&self, call: ExecutionCall) -> Result<Option<QueryResult>, String> {
                Ok(Some(QueryResult::new(
                    vec![call.query],
                    vec![vec![serde_json::json!(call.tenant_id)]],
                )))
            }
        }

        let hub = LocalGroupHub::new();
        let a = hub.member("node-a");
        let b = hub.member("node-b");
        b.register_execution_handler(GROUP, Arc::new(Echo)).unwrap();

        let result = a
            .forward_call(
                GROUP,
                "node-b",
                ExecutionCall {
                    tenant_id: 5,
                    query: "select 1".to_string(),
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(result.columns, vec!["select 1"]);
    }

    #[test]
    fn forward_call_to_unknown_node_fails() {
        let hub = LocalGroupHub::new();
        let a = hub.member("node-a");
        let err = a
            .forward_call(
                GROUP,
                "node-x",
                ExecutionCall {
                    tenant_id: 1,
                    query: "select 1".to_string(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ClusterError::Forward(_)));
    }

    #[test]
    fn parting_member_notifies_leader() {
        let hub = LocalGroupHub::new();
        let a = hub.member("node-a");
        let b = hub.member("node-b");
        let la = Arc::new(CountingListener::default());
        a.join_group(GROUP, la.clone()).unwrap();
        b.join_group(GROUP, Arc::new(CountingListener::default()))
            .unwrap();
        hub.elect(GROUP, "node-a");

        hub.part(GROUP, "node-b");

        assert_eq!(a.members(GROUP).unwrap(), vec!["node-a"]);
        assert_eq!(la.members_change.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disabled_membership_rejects_group_operations() {
        let m = DisabledMembership;
        assert!(!m.clustering_enabled());
        assert!(m.leader_of(GROUP).is_err());
        assert!(
            m.forward_call(
                GROUP,
                "anyone",
                ExecutionCall {
                    tenant_id: 1,
                    query: "select 1".to_string()
                }
            )
            .is_err()
        );
    }
}
