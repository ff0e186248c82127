//! strata-query — the tenant-aware query layer.
//!
//! Sits between the query router and the external compute engine:
//!
//! - **`translator`** — rewrites tenant-scoped SQL with tenant-encoded
//!   table names and parses DEFINE TABLE statements
//! - **`upsert`** — turns query results into upsert records with
//!   deterministic identities
//! - **`engine`** — the `ComputeEngine` seam, the `TableRelation`
//!   scan/insert adapter, and a scan-only engine for standalone use
//!
//! The rewriting here is deliberately a token-positional heuristic, not
//! an AST transform; its documented edge cases are part of the contract.

pub mod engine;
pub mod error;
pub mod translator;
pub mod upsert;

pub use engine::{ComputeEngine, ScanEngine, TableRelation};
pub use error::{ExecResult, QueryError};
pub use translator::QueryTranslator;
pub use upsert::UpsertRecordGenerator;
