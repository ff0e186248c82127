//! strata-store — the multi-tenant analytics record store substrate.
//!
//! Every tenant owns a flat namespace of tables; each table holds
//! schemaless records addressed by a string identity. The `RecordStore`
//! trait is the seam the rest of Strata programs against; the default
//! backend is `RedbRecordStore`, an embedded redb database with
//! JSON-serialized values (in-memory variant for testing).
//!
//! `TableKeyStore` layers primary-key metadata on top: the key-column
//! list registered by a DEFINE TABLE statement, read back on every
//! insert to derive deterministic upsert identities.

pub mod error;
pub mod keys;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use keys::TableKeyStore;
pub use store::{RecordStore, RedbRecordStore};
pub use types::{ColumnDef, ExecutionCall, QueryResult, Record};
