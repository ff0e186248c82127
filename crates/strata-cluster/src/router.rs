//! QueryRouter — classify statements and route them to the leader.
//!
//! Followers forward every query to the current leader and return its
//! answer verbatim; the leader (or a standalone node) executes locally.
//! Local execution classifies on the first tokens: DEFINE TABLE goes to
//! the translator, INSERT INTO runs the embedded select and upserts the
//! rows, anything else is tenant-encoded and submitted to the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use strata_query::{ExecResult, QueryError, QueryTranslator, UpsertRecordGenerator};
use strata_store::{ExecutionCall, QueryResult, RecordStore};

use crate::coordinator::{EXECUTION_GROUP, SharedEngine};
use crate::membership::{ExecutionHandler, MembershipProvider};

const TERM_DEFINE: &str = "define";
const TERM_TABLE: &str = "table";
const TERM_INSERT: &str = "insert";
const TERM_INTO: &str = "into";

/// Routes tenant queries to the right node and statement handler.
pub struct QueryRouter {
    membership: Arc<dyn MembershipProvider>,
    engine: SharedEngine,
    store: Arc<dyn RecordStore>,
    translator: QueryTranslator,
    generator: UpsertRecordGenerator,
    worker_count: Arc<AtomicUsize>,
    local_cores: usize,
}

impl QueryRouter {
    pub fn new(
        membership: Arc<dyn MembershipProvider>,
        engine: SharedEngine,
        store: Arc<dyn RecordStore>,
        translator: QueryTranslator,
        generator: UpsertRecordGenerator,
        worker_count: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            membership,
            engine,
            store,
            translator,
            generator,
            worker_count,
            local_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    /// Cores this node contributes to the partition hint.
    pub fn with_local_cores(mut self, cores: usize) -> Self {
        self.local_cores = cores;
        self
    }

    /// Execute a tenant query, forwarding to the leader when this node
    /// is a clustered follower.
    ///
    /// Statements without a result set (DEFINE TABLE, INSERT INTO)
    /// return `None`.
    pub fn execute_query(
        &self,
        tenant_id: i32,
        query: &str,
    ) -> ExecResult<Option<QueryResult>> {
        if self.membership.clustering_enabled() {
            let is_leader = self
                .membership
                .is_leader(EXECUTION_GROUP)
                .map_err(|e| QueryError::Coordination(e.to_string()))?;
            if !is_leader {
                let leader = self
                    .membership
                    .leader_of(EXECUTION_GROUP)
                    .map_err(|e| QueryError::Coordination(e.to_string()))?;
                debug!(%tenant_id, %leader, "forwarding query to leader");
                return self
                    .membership
                    .forward_call(
                        EXECUTION_GROUP,
                        &leader,
                        ExecutionCall {
                            tenant_id,
                            query: query.to_string(),
                        },
                    )
                    .map_err(|e| QueryError::Coordination(e.to_string()));
            }
        }
        self.execute_query_local(tenant_id, query)
    }

    /// Execute on this node, without consulting the cluster.
    pub fn execute_query_local(
        &self,
        tenant_id: i32,
        query: &str,
    ) -> ExecResult<Option<QueryResult>> {
        let mut query = query.trim();
        if let Some(stripped) = query.strip_suffix(';') {
            query = stripped.trim_end();
        }
        let tokens: Vec<&str> = query.split_whitespace().collect();
        if tokens.len() >= 3 {
            if tokens[0].eq_ignore_ascii_case(TERM_DEFINE)
                && tokens[1].eq_ignore_ascii_case(TERM_TABLE)
            {
                let engine = self.engine_handle()?;
                self.translator
                    .process_define_table(engine.as_ref(), tenant_id, query, &tokens)?;
                return Ok(None);
            }
            if tokens[0].eq_ignore_ascii_case(TERM_INSERT)
                && tokens[1].eq_ignore_ascii_case(TERM_INTO)
            {
                self.process_insert_into(tenant_id, query, tokens[2])?;
                return Ok(None);
            }
        }
        let engine = self.engine_handle()?;
        let encoded = QueryTranslator::encode_query_with_tenant_id(tenant_id, query);
        debug!(%tenant_id, %encoded, "submitting query");
        engine.submit(&encoded).map(Some)
    }

    /// `INSERT INTO <table> <select...>`: run the embedded select and
    /// upsert its rows into the target table.
    fn process_insert_into(&self, tenant_id: i32, query: &str, table: &str) -> ExecResult<()> {
        let idx = query
            .find(table)
            .ok_or_else(|| QueryError::Engine(format!("malformed insert statement: {query}")))?;
        let select = query[idx + table.len()..].trim();
        let encoded = QueryTranslator::encode_query_with_tenant_id(tenant_id, select);

        let engine = self.engine_handle()?;
        let result = engine.submit(&encoded)?;
        let records = self
            .generator
            .generate_insert_records_for_table(tenant_id, table, &result)?;
        debug!(%tenant_id, table, rows = records.len(), "upserting insert results");
        self.store.put(records)?;
        Ok(())
    }

    /// Suggested partition count for the compute engine: cluster worker
    /// count times the cores each worker contributes.
    pub fn num_partitions_hint(&self) -> usize {
        self.worker_count.load(Ordering::SeqCst).max(1) * self.local_cores
    }

    fn engine_handle(&self) -> ExecResult<Arc<dyn strata_query::ComputeEngine>> {
        let slot = self.engine.read().expect("engine lock");
        slot.clone().ok_or(QueryError::EngineUnavailable)
    }
}

/// Forwarded calls execute locally on the receiving node; re-routing
/// here could loop during a leadership change.
impl ExecutionHandler for QueryRouter {
    fn execute(&self, call: ExecutionCall) -> Result<Option<QueryResult>, String> {
        self.execute_query_local(call.tenant_id, &call.query)
            .map_err(|e| e.to_string())
    }
}
