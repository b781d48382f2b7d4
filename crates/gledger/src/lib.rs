//! Durable, self-compacting ledger of executed global transaction
//! identifiers.
//!
//! [`GtidLedger`] wires the three moving pieces together: a storage engine
//! (the in-memory one by default, any [`StorageEngine`] by injection), the
//! transactional persistor, and the background compaction worker. Opening
//! the ledger spawns the worker; [`GtidLedger::shutdown`] terminates and
//! joins it.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

pub use gledger_error::{LedgerError, Result};
pub use gledger_persist::{
    CompressOutcome, CompressionWorker, DEFAULT_COMPRESSION_PERIOD, GtidPersistor, LedgerConfig,
    LedgerStatsSnapshot, TableScope,
};
pub use gledger_storage::{
    JournalEntry, LedgerTable, LockMode, MemoryEngine, OpenFlags, RowImage, RowKey, Session,
    StorageEngine, TableSchema,
};
pub use gledger_types::{Gno, Gtid, GtidSet, Interval, MalformedSid, Sid};
pub use gledger_types::set::MalformedInterval;

/// The assembled ledger: engine, persistor, and compaction worker.
pub struct GtidLedger {
    persistor: Arc<GtidPersistor>,
    worker: Option<CompressionWorker>,
}

impl GtidLedger {
    /// Open a ledger backed by a fresh in-memory engine.
    pub fn open(config: LedgerConfig) -> Result<Self> {
        Self::with_engine(Arc::new(MemoryEngine::new()), config)
    }

    /// Open a ledger over a caller-provided engine.
    pub fn with_engine(engine: Arc<dyn StorageEngine>, config: LedgerConfig) -> Result<Self> {
        let persistor = Arc::new(GtidPersistor::new(engine, &config));
        let worker = CompressionWorker::spawn(Arc::clone(&persistor))?;
        debug!(
            compression_period = persistor.compression_period(),
            "gtid ledger opened"
        );
        Ok(Self {
            persistor,
            worker: Some(worker),
        })
    }

    /// Append one identifier.
    pub fn save(&self, gtid: Gtid) -> Result<()> {
        self.persistor.save(None, gtid)
    }

    /// Append every interval of a set in one transaction.
    pub fn save_set(&self, set: &GtidSet) -> Result<()> {
        self.persistor.save_set(None, set)
    }

    /// Read the full ledger into `into` under the set's own write lock.
    pub fn fetch_into(&self, into: &RwLock<GtidSet>) -> Result<()> {
        self.persistor.fetch(None, into)
    }

    /// Read the full ledger into a fresh set.
    pub fn fetch(&self) -> Result<GtidSet> {
        let target = RwLock::new(GtidSet::new());
        self.persistor.fetch(None, &target)?;
        Ok(target.into_inner())
    }

    /// Delete every row.
    pub fn reset(&self) -> Result<()> {
        self.persistor.reset(None)
    }

    /// Run one foreground compaction pass.
    pub fn compress(&self) -> Result<CompressOutcome> {
        self.persistor.compress(None)
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> LedgerStatsSnapshot {
        self.persistor.stats()
    }

    /// The persistor, for callers that thread their own sessions.
    #[must_use]
    pub fn persistor(&self) -> &Arc<GtidPersistor> {
        &self.persistor
    }

    /// Terminate the compaction worker and join it.
    pub fn shutdown(mut self) -> Result<()> {
        match self.worker.take() {
            Some(worker) => worker.terminate(),
            None => Ok(()),
        }
    }
}
