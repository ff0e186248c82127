//! QueryTranslator — tenant-scoped SQL rewriting and DEFINE TABLE.
//!
//! Table references are detected with a token-positional heuristic: an
//! identifier counts as a table reference only when it immediately
//! follows FROM or JOIN. Identifiers in subqueries, aliases, and
//! qualified references are left alone. This is the documented
//! contract, not a shortcut to be upgraded to a real parser.

use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use strata_store::{ColumnDef, RecordStore, TableKeyStore};

use crate::engine::{ComputeEngine, TableRelation};
use crate::error::{ExecResult, QueryError};

const TERM_FROM: &str = "from";
const TERM_JOIN: &str = "join";
const TERM_AS: &str = "as";
const TERM_PRIMARY: &str = "primary";
const TERM_KEY: &str = "key";

/// Rewrites tenant-scoped SQL and registers DEFINE TABLE statements.
#[derive(Clone)]
pub struct QueryTranslator {
    store: Arc<dyn RecordStore>,
    keys: TableKeyStore,
}

impl QueryTranslator {
    pub fn new(store: Arc<dyn RecordStore>, keys: TableKeyStore) -> Self {
        Self { store, keys }
    }

    /// Tenant-encoded catalog name: `T{t}_{name}` for t >= 0,
    /// `X{-t}_{name}` for the reserved negative namespace.
    pub fn encode_table_name(tenant_id: i32, table: &str) -> String {
        if tenant_id < 0 {
            format!("X{}_{}", -tenant_id, table)
        } else {
            format!("T{tenant_id}_{table}")
        }
    }

    /// Replace every table reference in the query with its
    /// tenant-encoded form.
    ///
    /// A token equal (case-insensitively) to FROM or JOIN marks the
    /// following token as a table reference iff its first character is
    /// a letter; collected names are then replaced throughout the query
    /// with whole-word matching.
    pub fn encode_query_with_tenant_id(tenant_id: i32, query: &str) -> String {
        let tokens: Vec<&str> = query.split_whitespace().collect();
        let mut table_names: Vec<&str> = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let is_ref_marker = tokens[i].eq_ignore_ascii_case(TERM_FROM)
                || tokens[i].eq_ignore_ascii_case(TERM_JOIN);
            if is_ref_marker
                && let Some(next) = tokens.get(i + 1)
                && next.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            {
                table_names.push(next);
                // The reference itself can't also be a FROM/JOIN marker.
                i += 1;
            }
            i += 1;
        }

        let mut result = query.to_string();
        for name in table_names {
            let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(name)))
                .expect("escaped identifier is a valid pattern");
            let encoded = Self::encode_table_name(tenant_id, name);
            result = pattern.replace_all(&result, encoded.as_str()).into_owned();
        }
        result.trim().to_string()
    }

    /// Handle a `DEFINE TABLE <name> (<schema>) [AS <alias>]` statement.
    ///
    /// `tokens` is the whitespace tokenization of `query`; the caller
    /// guarantees at least three tokens.
    pub fn process_define_table(
        &self,
        engine: &dyn ComputeEngine,
        tenant_id: i32,
        query: &str,
        tokens: &[&str],
    ) -> ExecResult<()> {
        let table_name = tokens[2];
        let mut alias = table_name;
        let mut query = query;
        let as_token = tokens[tokens.len() - 2];
        if as_token.eq_ignore_ascii_case(TERM_AS) {
            alias = tokens[tokens.len() - 1];
            if let Some(idx) = query.rfind(as_token) {
                query = &query[..idx];
            }
        }
        let name_idx = query.find(table_name).ok_or(QueryError::InvalidDefineTable)?;
        let schema_string = query[name_idx + table_name.len()..].trim();
        self.register_table(engine, tenant_id, table_name, alias, schema_string)
    }

    /// Persist the table and register it as a queryable view under the
    /// tenant-encoded alias.
    fn register_table(
        &self,
        engine: &dyn ComputeEngine,
        tenant_id: i32,
        table_name: &str,
        alias: &str,
        schema_string: &str,
    ) -> ExecResult<()> {
        if !(schema_string.starts_with('(') && schema_string.ends_with(')')) {
            return Err(QueryError::InvalidDefineTable);
        }
        let inner = schema_string[1..schema_string.len() - 1].trim();
        let schema = self.process_primary_key_and_return_schema(tenant_id, table_name, inner)?;

        if !self.store.table_exists(tenant_id, table_name)? {
            self.store.create_table(tenant_id, table_name)?;
        }
        let columns = parse_columns(&schema);
        self.store
            .set_table_schema(tenant_id, table_name, columns.clone())?;

        let relation = TableRelation::new(tenant_id, table_name, columns, self.store.clone());
        let view = Self::encode_table_name(tenant_id, alias);
        engine.register_view(&view, relation)?;
        debug!(tenant_id, table = table_name, view, "table registered");
        Ok(())
    }

    /// Extract and persist the primary-key clause, returning the schema
    /// text with the clause removed.
    ///
    /// The clause is located from the last case-insensitive PRIMARY
    /// keyword, split at the nearest preceding comma. If the trailing
    /// segment's second token does not start with KEY, the whole schema
    /// is treated as key-less and returned unchanged.
    fn process_primary_key_and_return_schema(
        &self,
        tenant_id: i32,
        table_name: &str,
        schema_string: &str,
    ) -> ExecResult<String> {
        if let Some(primary_idx) = schema_string.to_ascii_lowercase().rfind(TERM_PRIMARY) {
            // No preceding comma means the key clause is the whole schema.
            let split_idx = schema_string[..primary_idx].rfind(',');
            let (head, last_section) = match split_idx {
                Some(idx) => (&schema_string[..idx], schema_string[idx + 1..].trim()),
                None => ("", schema_string.trim()),
            };
            let last_tokens: Vec<&str> = last_section.split_whitespace().collect();
            if last_tokens.len() >= 2 && last_tokens[1].to_ascii_lowercase().starts_with(TERM_KEY) {
                let key_idx = last_section
                    .to_ascii_lowercase()
                    .find(TERM_KEY)
                    .ok_or(QueryError::InvalidDefineTable)?;
                let keys_section = last_section[key_idx + TERM_KEY.len()..].trim();
                if !(keys_section.starts_with('(') && keys_section.ends_with(')')) {
                    return Err(QueryError::InvalidDefineTable);
                }
                let keys: Vec<String> = keys_section[1..keys_section.len() - 1]
                    .split(',')
                    .map(|k| k.trim().to_string())
                    .collect();
                self.keys.register_table_keys(tenant_id, table_name, &keys)?;
                return Ok(head.trim().to_string());
            }
        }
        self.keys.register_table_keys(tenant_id, table_name, &[])?;
        Ok(schema_string.to_string())
    }
}

/// Parse `name type, name type, ...` into column definitions.
fn parse_columns(schema: &str) -> Vec<ColumnDef> {
    schema
        .split(',')
        .filter_map(|segment| {
            let mut parts = segment.split_whitespace();
            let name = parts.next()?;
            let column_type = parts.collect::<Vec<_>>().join(" ");
            Some(ColumnDef::new(name, column_type))
        })
        .collect()
}
