//! redb table definitions for the record store backend.

use redb::TableDefinition;

/// Table catalog: `{tenant}:{table}` → JSON `TableMeta`.
pub const TABLES: TableDefinition<&str, &[u8]> = TableDefinition::new("tables");

/// Record payloads: `{tenant}:{table}:{record_id}` → JSON value map.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
