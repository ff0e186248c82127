//! UpsertRecordGenerator — result rows to idempotent upsert records.
//!
//! Tables registered with a primary key get deterministic record
//! identities: a name-based UUID over the concatenated key values, so
//! re-running an insert overwrites instead of duplicating. Key-less
//! tables get store-allocated identities and plain append semantics.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use strata_store::{QueryResult, Record, TableKeyStore};

use crate::error::ExecResult;

/// Appended to every identity input so the hashed string is never
/// empty, even when all key values are null or empty.
const ID_SENTINEL: char = 'X';

/// Turns query results into records for the record store.
#[derive(Clone)]
pub struct UpsertRecordGenerator {
    keys: TableKeyStore,
}

impl UpsertRecordGenerator {
    pub fn new(keys: TableKeyStore) -> Self {
        Self { keys }
    }

    /// Convert every row of `result` into a record for (tenant, table).
    ///
    /// The table's keys must have been registered (possibly as an empty
    /// list) by a DEFINE TABLE statement; a missing registration is an
    /// error. With a non-empty key list each record carries a
    /// deterministic identity derived from its key values.
    pub fn generate_insert_records_for_table(
        &self,
        tenant_id: i32,
        table: &str,
        result: &QueryResult,
    ) -> ExecResult<Vec<Record>> {
        let keys = self.keys.load_table_keys(tenant_id, table)?;
        let key_indices = generate_table_key_indices(&keys, &result.columns);

        let records = result
            .rows
            .iter()
            .map(|row| {
                let values = extract_values_from_row(row, &result.columns);
                if keys.is_empty() {
                    Record::new(tenant_id, table, values)
                } else {
                    let id = generate_insert_record_id(row, &key_indices);
                    Record::with_id(id, tenant_id, table, values)
                }
            })
            .collect();
        Ok(records)
    }
}

/// Resolve key column names to ordinal positions in the current column
/// list.
///
/// A key column absent from the projection is silently skipped. After a
/// schema change this can shrink the effective key and produce colliding
/// identities; that permissive behavior is deliberate and pinned by
/// tests, do not change it without revisiting the upsert contract.
fn generate_table_key_indices(keys: &[String], columns: &[String]) -> Vec<usize> {
    keys.iter()
        .filter_map(|key| columns.iter().position(|c| c == key))
        .collect()
}

/// Deterministic record identity: a name-based UUID over the string
/// forms of the key values, in key-list order.
fn generate_insert_record_id(row: &[Value], key_indices: &[usize]) -> String {
    let mut input = String::new();
    for &idx in key_indices {
        if let Some(fragment) = key_fragment(&row[idx]) {
            input.push_str(&fragment);
        }
    }
    input.push(ID_SENTINEL);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, input.as_bytes()).to_string()
}

/// String form of a key value; nulls contribute nothing.
fn key_fragment(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn extract_values_from_row(row: &[Value], columns: &[String]) -> HashMap<String, Value> {
    columns.iter().cloned().zip(row.iter().cloned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use strata_store::{RecordStore, RedbRecordStore, StoreError};

    fn test_generator() -> (UpsertRecordGenerator, TableKeyStore) {
        let store: Arc<dyn RecordStore> = Arc::new(RedbRecordStore::open_in_memory().unwrap());
        let keys = TableKeyStore::new(store);
        (UpsertRecordGenerator::new(keys.clone()), keys)
    }

    fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
        QueryResult::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    #[test]
    fn identity_is_deterministic() {
        let (generator, keys) = test_generator();
        keys.register_table_keys(5, "orders", &["id".to_string()])
            .unwrap();
        let data = result(&["id", "amount"], vec![vec![json!(1), json!(100)]]);

        let first = generator
            .generate_insert_records_for_table(5, "orders", &data)
            .unwrap();
        let second = generator
            .generate_insert_records_for_table(5, "orders", &data)
            .unwrap();

        assert_eq!(first[0].id, second[0].id);
        assert!(first[0].id.is_some());
    }

    #[test]
    fn different_key_values_yield_different_identities() {
        let (generator, keys) = test_generator();
        keys.register_table_keys(5, "orders", &["id".to_string()])
            .unwrap();
        let data = result(
            &["id", "amount"],
            vec![vec![json!(1), json!(100)], vec![json!(2), json!(100)]],
        );

        let records = generator
            .generate_insert_records_for_table(5, "orders", &data)
            .unwrap();
        assert_ne!(records[0].id, records[1].id);
    }

    #[test]
    fn identity_ignores_non_key_columns() {
        let (generator, keys) = test_generator();
        keys.register_table_keys(5, "orders", &["id".to_string()])
            .unwrap();

        let before = result(&["id", "amount"], vec![vec![json!(1), json!(100)]]);
        let after = result(&["id", "amount"], vec![vec![json!(1), json!(999)]]);

        let a = generator
            .generate_insert_records_for_table(5, "orders", &before)
            .unwrap();
        let b = generator
            .generate_insert_records_for_table(5, "orders", &after)
            .unwrap();

        // Same key, updated payload: overwrite-not-duplicate.
        assert_eq!(a[0].id, b[0].id);
        assert_ne!(a[0].values, b[0].values);
    }

    #[test]
    fn empty_key_list_leaves_identity_to_the_store() {
        let (generator, keys) = test_generator();
        keys.register_table_keys(5, "events", &[]).unwrap();
        let data = result(&["a"], vec![vec![json!(1)]]);

        let records = generator
            .generate_insert_records_for_table(5, "events", &data)
            .unwrap();
        assert!(records[0].id.is_none());
    }

    #[test]
    fn unregistered_table_is_an_error() {
        let (generator, _) = test_generator();
        let data = result(&["a"], vec![vec![json!(1)]]);

        let err = generator
            .generate_insert_records_for_table(5, "unknown", &data)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::QueryError::Store(StoreError::KeysNotFound { .. })
        ));
    }

    #[test]
    fn all_null_keys_still_get_an_identity() {
        let (generator, keys) = test_generator();
        keys.register_table_keys(5, "orders", &["id".to_string()])
            .unwrap();
        let data = result(&["id"], vec![vec![Value::Null]]);

        let records = generator
            .generate_insert_records_for_table(5, "orders", &data)
            .unwrap();
        // The sentinel guarantees a non-empty hash input.
        assert!(records[0].id.is_some());
    }

    #[test]
    fn missing_key_column_is_silently_skipped() {
        let (generator, keys) = test_generator();
        keys.register_table_keys(5, "orders", &["id".to_string(), "region".to_string()])
            .unwrap();

        // "region" was dropped from the projection: the identity
        // degrades to id-only, so these two rows collide. Latent risk,
        // preserved on purpose.
        let data = result(
            &["id", "amount"],
            vec![vec![json!(1), json!(100)], vec![json!(1), json!(200)]],
        );
        let records = generator
            .generate_insert_records_for_table(5, "orders", &data)
            .unwrap();

        assert_eq!(records[0].id, records[1].id);
    }

    #[test]
    fn string_and_number_fragments_are_raw_text() {
        let (generator, keys) = test_generator();
        keys.register_table_keys(5, "orders", &["a".to_string(), "b".to_string()])
            .unwrap();

        // "1" + "2" concatenates identically whether the values are
        // strings or numbers; the identity input is raw text.
        let as_strings = result(&["a", "b"], vec![vec![json!("1"), json!("2")]]);
        let as_numbers = result(&["a", "b"], vec![vec![json!(1), json!(2)]]);

        let a = generator
            .generate_insert_records_for_table(5, "orders", &as_strings)
            .unwrap();
        let b = generator
            .generate_insert_records_for_table(5, "orders", &as_numbers)
            .unwrap();
        assert_eq!(a[0].id, b[0].id);
    }

    #[test]
    fn payload_carries_every_column() {
        let (generator, keys) = test_generator();
        keys.register_table_keys(5, "orders", &["id".to_string()])
            .unwrap();
        let data = result(&["id", "amount"], vec![vec![json!(1), json!(100)]]);

        let records = generator
            .generate_insert_records_for_table(5, "orders", &data)
            .unwrap();
        assert_eq!(records[0].values["id"], json!(1));
        assert_eq!(records[0].values["amount"], json!(100));
    }
}
