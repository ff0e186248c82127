//! RecordStore — the storage seam, plus the redb-backed default backend.
//!
//! `RecordStore` is what the query layer programs against: tenant-scoped
//! tables with create/put/get semantics. `RedbRecordStore` keeps all
//! tenants in a single redb database, values JSON-serialized into redb's
//! `&[u8]` columns. Supports on-disk and in-memory backends (the latter
//! for testing).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::tables::{RECORDS, TABLES};
use crate::types::{ColumnDef, Record};

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// The record store seam.
///
/// Implementations must be shareable across threads; every query on
/// every node goes through a handle to one of these.
pub trait RecordStore: Send + Sync {
    /// Whether a table exists for the tenant.
    fn table_exists(&self, tenant_id: i32, table: &str) -> StoreResult<bool>;

    /// Create a table for the tenant. Creating an existing table is a no-op.
    fn create_table(&self, tenant_id: i32, table: &str) -> StoreResult<()>;

    /// Delete a table and all its records. Returns true if it existed.
    fn delete_table(&self, tenant_id: i32, table: &str) -> StoreResult<bool>;

    /// Attach a column schema to an existing table.
    fn set_table_schema(
        &self,
        tenant_id: i32,
        table: &str,
        schema: Vec<ColumnDef>,
    ) -> StoreResult<()>;

    /// Read back a table's column schema, if one was set.
    fn get_table_schema(&self, tenant_id: i32, table: &str) -> StoreResult<Option<Vec<ColumnDef>>>;

    /// Insert or overwrite records. Records without an identity get a
    /// store-allocated one; records with an identity overwrite any
    /// existing record sharing it. Fails with `TableNotFound` if a
    /// record's table was never created.
    fn put(&self, records: Vec<Record>) -> StoreResult<()>;

    /// Fetch records by identity. Missing identities are skipped; a
    /// missing table is an error.
    fn get(&self, tenant_id: i32, table: &str, ids: &[String]) -> StoreResult<Vec<Record>>;

    /// Full scan of a table's records.
    fn scan(&self, tenant_id: i32, table: &str) -> StoreResult<Vec<Record>>;

    /// List the tenant's table names.
    fn list_tables(&self, tenant_id: i32) -> StoreResult<Vec<String>>;
}

/// Per-table catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableMeta {
    schema: Option<Vec<ColumnDef>>,
}

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct RedbRecordStore {
    db: Arc<Database>,
}

fn table_key(tenant_id: i32, table: &str) -> String {
    format!("{tenant_id}:{table}")
}

fn record_key(tenant_id: i32, table: &str, id: &str) -> String {
    format!("{tenant_id}:{table}:{id}")
}

impl RedbRecordStore {
    /// Open (or create) a persistent record store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "record store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory record store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory record store opened");
        Ok(store)
    }

    /// Create all redb tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(TABLES).map_err(map_err!(Table))?;
        txn.open_table(RECORDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn read_meta(&self, tenant_id: i32, table: &str) -> StoreResult<Option<TableMeta>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let tables = txn.open_table(TABLES).map_err(map_err!(Table))?;
        match tables
            .get(table_key(tenant_id, table).as_str())
            .map_err(map_err!(Read))?
        {
            Some(guard) => {
                let meta: TableMeta =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    fn write_meta(&self, tenant_id: i32, table: &str, meta: &TableMeta) -> StoreResult<()> {
        let key = table_key(tenant_id, table);
        let value = serde_json::to_vec(meta).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut tables = txn.open_table(TABLES).map_err(map_err!(Table))?;
            tables
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl RecordStore for RedbRecordStore {
    fn table_exists(&self, tenant_id: i32, table: &str) -> StoreResult<bool> {
        Ok(self.read_meta(tenant_id, table)?.is_some())
    }

    fn create_table(&self, tenant_id: i32, table: &str) -> StoreResult<()> {
        if self.table_exists(tenant_id, table)? {
            return Ok(());
        }
        self.write_meta(tenant_id, table, &TableMeta { schema: None })?;
        debug!(tenant_id, table, "table created");
        Ok(())
    }

    fn delete_table(&self, tenant_id: i32, table: &str) -> StoreResult<bool> {
        let prefix = format!("{}:", table_key(tenant_id, table));
        // Collect record keys in a read transaction first.
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let records = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            records
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let k = key.value().to_string();
                    k.starts_with(&prefix).then_some(k)
                })
                .collect()
        };
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut tables = txn.open_table(TABLES).map_err(map_err!(Table))?;
            existed = tables
                .remove(table_key(tenant_id, table).as_str())
                .map_err(map_err!(Write))?
                .is_some();
            let mut records = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            for key in &keys {
                records.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(tenant_id, table, existed, "table deleted");
        Ok(existed)
    }

    fn set_table_schema(
        &self,
        tenant_id: i32,
        table: &str,
        schema: Vec<ColumnDef>,
    ) -> StoreResult<()> {
        let mut meta = self
            .read_meta(tenant_id, table)?
            .ok_or_else(|| StoreError::TableNotFound {
                tenant_id,
                table: table.to_string(),
            })?;
        meta.schema = Some(schema);
        self.write_meta(tenant_id, table, &meta)
    }

    fn get_table_schema(&self, tenant_id: i32, table: &str) -> StoreResult<Option<Vec<ColumnDef>>> {
        let meta = self
            .read_meta(tenant_id, table)?
            .ok_or_else(|| StoreError::TableNotFound {
                tenant_id,
                table: table.to_string(),
            })?;
        Ok(meta.schema)
    }

    fn put(&self, records: Vec<Record>) -> StoreResult<()> {
        for record in &records {
            if !self.table_exists(record.tenant_id, &record.table)? {
                return Err(StoreError::TableNotFound {
                    tenant_id: record.tenant_id,
                    table: record.table.clone(),
                });
            }
        }
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            for record in &records {
                let id = match &record.id {
                    Some(id) => id.clone(),
                    None => Uuid::new_v4().to_string(),
                };
                let key = record_key(record.tenant_id, &record.table, &id);
                let value = serde_json::to_vec(&record.values).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count = records.len(), "records stored");
        Ok(())
    }

    fn get(&self, tenant_id: i32, table: &str, ids: &[String]) -> StoreResult<Vec<Record>> {
        if !self.table_exists(tenant_id, table)? {
            return Err(StoreError::TableNotFound {
                tenant_id,
                table: table.to_string(),
            });
        }
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let records = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for id in ids {
            let key = record_key(tenant_id, table, id);
            if let Some(guard) = records.get(key.as_str()).map_err(map_err!(Read))? {
                let values: HashMap<String, Value> =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                results.push(Record::with_id(id.clone(), tenant_id, table, values));
            }
        }
        Ok(results)
    }

    fn scan(&self, tenant_id: i32, table: &str) -> StoreResult<Vec<Record>> {
        if !self.table_exists(tenant_id, table)? {
            return Err(StoreError::TableNotFound {
                tenant_id,
                table: table.to_string(),
            });
        }
        let prefix = format!("{}:", table_key(tenant_id, table));
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let records = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in records.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if let Some(id) = key.value().strip_prefix(&prefix) {
                let values: HashMap<String, Value> =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(Record::with_id(id, tenant_id, table, values));
            }
        }
        Ok(results)
    }

    fn list_tables(&self, tenant_id: i32) -> StoreResult<Vec<String>> {
        let prefix = format!("{tenant_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let tables = txn.open_table(TABLES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in tables.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            if let Some(name) = key.value().strip_prefix(&prefix) {
                results.push(name.to_string());
            }
        }
        Ok(results)
    }
}
