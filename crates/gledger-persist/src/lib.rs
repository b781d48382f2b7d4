//! Persistence layer for the GTID ledger.
//!
//! Three pieces stack here, leaves first:
//!
//! - [`scope::TableScope`] wraps one bounded interaction with the ledger
//!   table: fresh execution context, saved statement state, suppressed
//!   replication log, all released on every exit path.
//! - [`persistor::GtidPersistor`] appends, reads back, erases, and compacts
//!   the ledger through a scope.
//! - [`worker::CompressionWorker`] sleeps on a condition variable and runs
//!   compaction passes when the persistor's append volume signals it.

pub mod config;
pub mod persistor;
pub mod scope;
pub mod stats;
pub mod worker;

pub use config::{DEFAULT_COMPRESSION_PERIOD, LedgerConfig};
pub use persistor::{CompressOutcome, GtidPersistor};
pub use scope::TableScope;
pub use stats::{LedgerStats, LedgerStatsSnapshot};
pub use worker::{CompressSync, CompressionWorker};
