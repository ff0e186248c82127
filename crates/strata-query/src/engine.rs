//! ComputeEngine — the seam to the external SQL compute engine.
//!
//! The engine is a black box that accepts SQL text against a
//! tenant-encoded catalog namespace and materializes rows. Every call
//! is synchronous and blocking: the calling thread is suspended until
//! rows (or an error) come back.
//!
//! `TableRelation` is the scan/insert adapter that exposes a record
//! store table as a queryable view. `ScanEngine` is the in-process
//! engine used by standalone mode and tests; it answers only
//! `SELECT *|col-list FROM <view>` over registered views and must not
//! grow SQL parsing beyond that.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::debug;

use strata_store::{ColumnDef, QueryResult, Record, RecordStore};

use crate::error::{ExecResult, QueryError};

/// The compute engine seam.
pub trait ComputeEngine: Send + Sync {
    /// Submit SQL text and block until rows are materialized.
    fn submit(&self, query: &str) -> ExecResult<QueryResult>;

    /// Register a named view backed by a scan/insert adapter.
    fn register_view(&self, name: &str, relation: TableRelation) -> ExecResult<()>;

    /// Release engine resources. Idempotent.
    fn stop(&self);
}

/// Scan/insert adapter binding a view to a physical record store table.
#[derive(Clone)]
pub struct TableRelation {
    tenant_id: i32,
    table: String,
    columns: Vec<ColumnDef>,
    store: Arc<dyn RecordStore>,
}

impl TableRelation {
    pub fn new(
        tenant_id: i32,
        table: impl Into<String>,
        columns: Vec<ColumnDef>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            tenant_id,
            table: table.into(),
            columns,
            store,
        }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Materialize all records, projected onto the defining schema's
    /// column order. Columns absent from a record surface as null.
    pub fn scan(&self) -> ExecResult<QueryResult> {
        let records = self.store.scan(self.tenant_id, &self.table)?;
        let columns: Vec<String> = self.columns.iter().map(|c| c.name.clone()).collect();
        let rows = records
            .into_iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.values.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Ok(QueryResult::new(columns, rows))
    }

    /// Write rows into the backing table. Identities are allocated by
    /// the store; upsert identity assignment happens upstream.
    pub fn insert(&self, result: &QueryResult) -> ExecResult<()> {
        let records: Vec<Record> = result
            .rows
            .iter()
            .map(|row| {
                let values: HashMap<String, Value> = result
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                Record::new(self.tenant_id, &self.table, values)
            })
            .collect();
        self.store.put(records)?;
        Ok(())
    }
}

/// Scan-only in-process engine over registered views.
#[derive(Default)]
pub struct ScanEngine {
    views: RwLock<HashMap<String, TableRelation>>,
}

impl ScanEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn unsupported(query: &str) -> QueryError {
        QueryError::Engine(format!(
            "unsupported query (scan engine handles only 'select <cols> from <view>'): {query}"
        ))
    }
}

impl ComputeEngine for ScanEngine {
    fn submit(&self, query: &str) -> ExecResult<QueryResult> {
        let tokens: Vec<&str> = query.split_whitespace().collect();
        if tokens.len() < 4 || !tokens[0].eq_ignore_ascii_case("select") {
            return Err(Self::unsupported(query));
        }
        let from_idx = tokens
            .iter()
            .position(|t| t.eq_ignore_ascii_case("from"))
            .ok_or_else(|| Self::unsupported(query))?;
        if from_idx + 2 != tokens.len() {
            return Err(Self::unsupported(query));
        }

        let view_name = tokens[from_idx + 1];
        let relation = {
            let views = self.views.read().expect("views lock");
            views
                .get(view_name)
                .cloned()
                .ok_or_else(|| QueryError::Engine(format!("unknown view: {view_name}")))?
        };
        let full = relation.scan()?;

        let selection = tokens[1..from_idx].join("");
        if selection == "*" {
            return Ok(full);
        }

        // Explicit column list: project in the requested order.
        let mut columns = Vec::new();
        let mut indices = Vec::new();
        for name in selection.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let idx = full
                .column_index(name)
                .ok_or_else(|| QueryError::Engine(format!("unknown column: {name}")))?;
            columns.push(name.to_string());
            indices.push(idx);
        }
        let rows = full
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(QueryResult::new(columns, rows))
    }

    fn register_view(&self, name: &str, relation: TableRelation) -> ExecResult<()> {
        let mut views = self.views.write().expect("views lock");
        debug!(view = name, "view registered");
        views.insert(name.to_string(), relation);
        Ok(())
    }

    fn stop(&self) {
        let mut views = self.views.write().expect("views lock");
        views.clear();
    }
}
