//! Query execution error types.

use thiserror::Error;

/// Result type alias for query execution operations.
pub type ExecResult<T> = Result<T, QueryError>;

/// Errors scoped to a single query; none of them affect node state.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(
        "invalid define table query, must be in the format of 'define table <table> \
         (name1 type1, name2 type2, name3 type3, ... primary key(name1, name2, ...))'"
    )]
    InvalidDefineTable,

    #[error("engine error: {0}")]
    Engine(String),

    #[error("compute engine is not initialized on this node")]
    EngineUnavailable,

    #[error("record store error: {0}")]
    Store(#[from] strata_store::StoreError),

    #[error("cluster coordination error: {0}")]
    Coordination(String),
}
