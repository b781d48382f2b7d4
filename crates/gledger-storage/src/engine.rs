//! Storage collaborator traits.
//!
//! The persistor talks to the host engine through this small capability set
//! so that any row-oriented transactional store can back the ledger. The
//! in-memory engine in [`crate::memory`] is the stock implementation; tests
//! substitute fakes at the same seam.

use gledger_error::Result;

use crate::row::{RowImage, RowKey, TableSchema};
use crate::session::Session;

bitflags::bitflags! {
    /// Permission flags for opening the ledger table.
    ///
    /// The access scope passes all of them so ledger maintenance keeps
    /// working while the host is read-locked, flushing, or tearing the
    /// session down.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u8 {
        const IGNORE_GLOBAL_READ_LOCK = 1 << 0;
        const IGNORE_GLOBAL_READ_ONLY = 1 << 1;
        const IGNORE_FLUSH            = 1 << 2;
        const IGNORE_LOCK_TIMEOUT     = 1 << 3;
        const IGNORE_KILLED           = 1 << 4;
    }
}

impl OpenFlags {
    /// The full set the ledger scope uses.
    #[must_use]
    pub const fn ledger_scope() -> Self {
        Self::all()
    }
}

/// Requested table lock strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared read lock.
    Read,
    /// Exclusive write lock.
    Write,
}

/// One bounded interaction with the ledger table.
///
/// Handles stage their writes per statement; `commit_stmt` either applies
/// them (autocommit) or parks them on the session's outer transaction.
/// Scans return `Ok(None)` at end of scan; that is the sole non-error
/// termination.
///
/// Implementations must make delete-during-scan safe for the key-ordered
/// cursor: `index_init` snapshots the key order before the walk so rows
/// deleted mid-scan never disturb cursor advancement.
pub trait LedgerTable {
    /// Declared shape of the table.
    fn schema(&self) -> &TableSchema;

    /// Stage an insert of a full row image.
    fn insert(&mut self, row: &RowImage) -> Result<()>;

    /// Stage an update, replacing the row identified by `old`'s key.
    fn update(&mut self, old: &RowImage, new: &RowImage) -> Result<()>;

    /// Stage a delete of the row identified by `row`'s key.
    fn delete(&mut self, row: &RowImage) -> Result<()>;

    /// Open a key-ordered cursor over the primary key.
    fn index_init(&mut self) -> Result<()>;

    /// Position the cursor on the first row in key order.
    fn index_first(&mut self) -> Result<Option<RowImage>>;

    /// Advance the cursor one row in key order.
    fn index_next(&mut self) -> Result<Option<RowImage>>;

    /// Point lookup by exact primary key; does not move the scan cursor.
    fn index_read_exact(&mut self, key: &RowKey) -> Result<Option<RowImage>>;

    /// Release the key-ordered cursor.
    fn index_end(&mut self);

    /// Open an unordered full scan.
    fn rnd_init(&mut self) -> Result<()>;

    /// Produce the next row of the full scan.
    fn rnd_next(&mut self) -> Result<Option<RowImage>>;

    /// Release the full scan.
    fn rnd_end(&mut self);

    /// Commit the current statement: apply staged ops directly when no
    /// outer transaction is active, otherwise move them onto the session.
    fn commit_stmt(&mut self, session: &mut Session) -> Result<()>;

    /// Discard the current statement's staged ops.
    fn rollback_stmt(&mut self);
}

/// The engine-level surface the ledger consumes.
pub trait StorageEngine: Send + Sync {
    /// Create a fresh execution context.
    fn new_session(&self) -> Session;

    /// Open and lock the ledger table.
    ///
    /// Blocks while a peer holds an incompatible lock. Failure to open is
    /// `TableUnavailable` and must leave no lock behind.
    fn open_table(
        &self,
        session: &mut Session,
        mode: LockMode,
        flags: OpenFlags,
    ) -> Result<Box<dyn LedgerTable>>;

    /// Commit the session's outer transaction, applying buffered ops.
    fn commit_session(&self, session: &mut Session) -> Result<()>;

    /// Roll back the session's outer transaction, discarding buffered ops.
    fn rollback_session(&self, session: &mut Session);
}
