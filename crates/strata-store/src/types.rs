//! Core data types shared across the Strata workspace.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single record in an analytics table.
///
/// `id` is optional: records carrying a deterministic upsert identity
/// set it explicitly; records without one get a store-allocated id on
/// `put`. The payload is a flat column → value map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Option<String>,
    pub tenant_id: i32,
    pub table: String,
    pub values: HashMap<String, Value>,
}

impl Record {
    /// A record with a pre-assigned identity (upsert semantics).
    pub fn with_id(
        id: impl Into<String>,
        tenant_id: i32,
        table: impl Into<String>,
        values: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            tenant_id,
            table: table.into(),
            values,
        }
    }

    /// A record whose identity will be allocated by the store.
    pub fn new(tenant_id: i32, table: impl Into<String>, values: HashMap<String, Value>) -> Self {
        Self {
            id: None,
            tenant_id,
            table: table.into(),
            values,
        }
    }
}

/// A materialized query result: ordered column names plus rows of
/// values in the same order. Every row has exactly `columns.len()`
/// values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Position of a column in the result, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// A column definition in a table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: String,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }
}

/// The payload forwarded from a follower to the leader: the full
/// (tenant, query) pair, executed remotely and answered verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionCall {
    pub tenant_id: i32,
    pub query: String,
}
