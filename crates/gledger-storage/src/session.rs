//! Execution context for table access.
//!
//! A [`Session`] plays the role the host server's per-thread context plays
//! around the ledger: it carries the state a concurrent user statement may
//! have open (query tables, open tables), the replication-log switch, the
//! SQL mode, and the pending writes of an explicit outer transaction. The
//! table access scope backs these up, clears them for the duration of the
//! ledger statement, and restores them on every exit path.

use crate::row::{RowImage, RowKey};

/// A staged row mutation, applied to the base table on commit.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOp {
    Insert(RowImage),
    Update { key: RowKey, image: RowImage },
    Delete { key: RowKey },
}

/// Opaque backup of a session's open-tables state.
#[derive(Debug)]
pub struct OpenTablesBackup(Vec<String>);

/// Opaque backup of a session's query-tables state.
#[derive(Debug)]
pub struct QueryTablesBackup(Vec<String>);

/// Per-caller execution context.
#[derive(Debug, Default)]
pub struct Session {
    system: bool,
    killed: bool,
    binlog_enabled: bool,
    sql_mode: u32,
    open_tables: Vec<String>,
    query_tables: Vec<String>,
    in_explicit_txn: bool,
    /// Buffered ops plus the replication decision captured when their
    /// statement committed. The binlog switch may flip again before the
    /// outer commit; the decision made at statement time stands.
    pending_ops: Vec<(RowOp, bool)>,
}

impl Session {
    /// A fresh user session with replication logging enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binlog_enabled: true,
            ..Self::default()
        }
    }

    /// Mark this session as a synthesized system context.
    pub fn set_system(&mut self, system: bool) {
        self.system = system;
    }

    /// Whether this is a synthesized system context.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.system
    }

    /// Flag the session as killed; table opens honor this unless the
    /// ignore-killed flag is set.
    pub fn kill(&mut self) {
        self.killed = true;
    }

    /// Whether the session has been killed.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.killed
    }

    // -- replication log switch --------------------------------------------

    /// Disable replication logging, returning the previous state.
    pub fn disable_binlog(&mut self) -> bool {
        std::mem::replace(&mut self.binlog_enabled, false)
    }

    /// Restore a previously saved replication-log state.
    pub fn set_binlog_enabled(&mut self, enabled: bool) {
        self.binlog_enabled = enabled;
    }

    /// Whether writes committed by this session are replicated.
    #[must_use]
    pub fn binlog_enabled(&self) -> bool {
        self.binlog_enabled
    }

    // -- SQL mode -----------------------------------------------------------

    /// Save and clear the SQL mode, returning the previous value.
    pub fn clear_sql_mode(&mut self) -> u32 {
        std::mem::take(&mut self.sql_mode)
    }

    /// Restore a saved SQL mode.
    pub fn set_sql_mode(&mut self, mode: u32) {
        self.sql_mode = mode;
    }

    /// Current SQL mode bits.
    #[must_use]
    pub fn sql_mode(&self) -> u32 {
        self.sql_mode
    }

    // -- statement state backup/restore ------------------------------------

    /// Record a table as open by the current user statement. Test and host
    /// integration surface; the ledger scope never adds entries here.
    pub fn note_open_table(&mut self, name: impl Into<String>) {
        self.open_tables.push(name.into());
    }

    /// Record a table as referenced by the current user statement.
    pub fn note_query_table(&mut self, name: impl Into<String>) {
        self.query_tables.push(name.into());
    }

    /// Take and clear the open-tables state.
    pub fn backup_open_tables(&mut self) -> OpenTablesBackup {
        OpenTablesBackup(std::mem::take(&mut self.open_tables))
    }

    /// Restore a saved open-tables state.
    pub fn restore_open_tables(&mut self, backup: OpenTablesBackup) {
        self.open_tables = backup.0;
    }

    /// Take and clear the query-tables state.
    pub fn backup_query_tables(&mut self) -> QueryTablesBackup {
        QueryTablesBackup(std::mem::take(&mut self.query_tables))
    }

    /// Restore a saved query-tables state.
    pub fn restore_query_tables(&mut self, backup: QueryTablesBackup) {
        self.query_tables = backup.0;
    }

    /// Tables currently recorded as open.
    #[must_use]
    pub fn open_tables(&self) -> &[String] {
        &self.open_tables
    }

    /// Tables currently recorded as referenced.
    #[must_use]
    pub fn query_tables(&self) -> &[String] {
        &self.query_tables
    }

    // -- transaction state ---------------------------------------------------

    /// Begin an explicit outer transaction. Statement commits buffer their
    /// writes here until the engine commits the session.
    pub fn begin(&mut self) {
        self.in_explicit_txn = true;
    }

    /// Whether an explicit outer transaction is active.
    #[must_use]
    pub fn in_explicit_txn(&self) -> bool {
        self.in_explicit_txn
    }

    /// Buffer statement ops into the outer transaction, recording whether
    /// they are replicated.
    pub fn stage_ops(&mut self, ops: impl IntoIterator<Item = RowOp>, replicate: bool) {
        self.pending_ops
            .extend(ops.into_iter().map(|op| (op, replicate)));
    }

    /// Take every buffered op and close the outer transaction.
    pub fn take_pending_ops(&mut self) -> Vec<(RowOp, bool)> {
        self.in_explicit_txn = false;
        std::mem::take(&mut self.pending_ops)
    }

    /// Buffered ops awaiting the outer commit.
    #[must_use]
    pub fn pending_ops(&self) -> &[(RowOp, bool)] {
        &self.pending_ops
    }
}
