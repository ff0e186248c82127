//! TableKeyStore — persisted primary-key column lists.
//!
//! DEFINE TABLE registers a table's primary-key columns here (possibly
//! an empty list); every INSERT reads them back to derive deterministic
//! upsert identities. The metadata lives in an ordinary record table in
//! a reserved tenant namespace, one record per (tenant, table).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::RecordStore;
use crate::types::Record;

/// Reserved tenant namespace holding table-key metadata.
pub const KEYS_TENANT_ID: i32 = -1000;

/// Metadata table name within the reserved namespace.
pub const KEYS_TABLE: &str = "__table_keys";

/// Payload column carrying the serialized key list.
const KEYS_COLUMN: &str = "keys";

/// Persists and retrieves per-table primary-key column lists.
#[derive(Clone)]
pub struct TableKeyStore {
    store: Arc<dyn RecordStore>,
}

/// Metadata record identity derived from (tenant, table).
fn keys_record_id(tenant_id: i32, table: &str) -> String {
    format!("{tenant_id}_{table}")
}

impl TableKeyStore {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Persist a table's key-column list, overwriting any previous one.
    ///
    /// If the write fails because the metadata table does not exist yet,
    /// the table is created and the write retried exactly once.
    pub fn register_table_keys(
        &self,
        tenant_id: i32,
        table: &str,
        keys: &[String],
    ) -> StoreResult<()> {
        let mut values: HashMap<String, Value> = HashMap::new();
        values.insert(KEYS_COLUMN.to_string(), json!(keys));
        let record = Record::with_id(
            keys_record_id(tenant_id, table),
            KEYS_TENANT_ID,
            KEYS_TABLE,
            values,
        );
        match self.store.put(vec![record.clone()]) {
            Ok(()) => {}
            Err(StoreError::TableNotFound { .. }) => {
                self.store.create_table(KEYS_TENANT_ID, KEYS_TABLE)?;
                self.store.put(vec![record])?;
            }
            Err(e) => return Err(e),
        }
        debug!(tenant_id, table, ?keys, "table keys registered");
        Ok(())
    }

    /// Load a table's key-column list.
    ///
    /// Fails with `KeysNotFound` if the table was never registered, and
    /// with `CorruptKeys` if the stored payload cannot be decoded.
    pub fn load_table_keys(&self, tenant_id: i32, table: &str) -> StoreResult<Vec<String>> {
        let id = keys_record_id(tenant_id, table);
        let records = self.store.get(KEYS_TENANT_ID, KEYS_TABLE, &[id])?;
        let record = records.first().ok_or(StoreError::KeysNotFound {
            tenant_id,
            table: table.to_string(),
        })?;
        let payload = record.values.get(KEYS_COLUMN).ok_or(StoreError::CorruptKeys {
            tenant_id,
            table: table.to_string(),
        })?;
        serde_json::from_value(payload.clone()).map_err(|_| StoreError::CorruptKeys {
            tenant_id,
            table: table.to_string(),
        })
    }
}
