//! Error types for the Strata record store.

use thiserror::Error;

/// Result type alias for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("table not found for tenant {tenant_id}: {table}")]
    TableNotFound { tenant_id: i32, table: String },

    #[error("table keys cannot be found for tenant {tenant_id} table: {table}")]
    KeysNotFound { tenant_id: i32, table: String },

    #[error("corrupted table keys for tenant {tenant_id} table: {table}")]
    CorruptKeys { tenant_id: i32, table: String },
}
