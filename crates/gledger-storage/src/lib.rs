//! Storage collaborator layer for the GTID ledger.
//!
//! The persistor consumes a small capability set — a transactional table
//! handle, an execution context, and an engine that hands both out — and
//! this crate defines that surface plus the stock in-memory implementation.

pub mod engine;
pub mod memory;
pub mod row;
pub mod session;

pub use engine::{LedgerTable, LockMode, OpenFlags, StorageEngine};
pub use memory::{JournalEntry, MemoryEngine};
pub use row::{ColumnKind, ColumnSpec, Datum, RowImage, RowKey, TableSchema};
pub use session::{OpenTablesBackup, QueryTablesBackup, RowOp, Session};

/// Name of the ledger table inside the host engine.
pub const LEDGER_TABLE_NAME: &str = "executed_gtids";

/// Minimum number of columns the persistor requires.
pub const LEDGER_COLUMN_COUNT: usize = 3;
