//! Table access scope.
//!
//! One bounded interaction with the ledger table. On open: synthesize an
//! execution context if the caller has none, back up and clear the caller's
//! statement state, suppress the replication log, and lock the table with
//! the full ignore-flag set. On close: commit or roll back the inner
//! statement (and optionally the outer transaction), then restore everything
//! in reverse order. The drop guard runs the rollback variant so no exit
//! path — early `?`, panic, partial open — leaks a lock or leaves the
//! session disturbed.

use gledger_error::{LedgerError, Result};
use gledger_storage::engine::{LedgerTable, LockMode, OpenFlags, StorageEngine};
use gledger_storage::session::{OpenTablesBackup, QueryTablesBackup, Session};
use gledger_storage::{LEDGER_COLUMN_COUNT, LEDGER_TABLE_NAME};
use tracing::warn;

enum SessionSlot<'a> {
    Borrowed(&'a mut Session),
    Owned(Session),
}

impl SessionSlot<'_> {
    fn get_mut(&mut self) -> &mut Session {
        match self {
            SessionSlot::Borrowed(s) => s,
            SessionSlot::Owned(s) => s,
        }
    }
}

struct ScopeBackups {
    open_tables: OpenTablesBackup,
    query_tables: QueryTablesBackup,
    binlog_was: bool,
    sql_mode_was: u32,
    synthesized: bool,
}

fn restore_session(session: &mut Session, backups: ScopeBackups) {
    session.set_sql_mode(backups.sql_mode_was);
    session.set_binlog_enabled(backups.binlog_was);
    session.restore_query_tables(backups.query_tables);
    session.restore_open_tables(backups.open_tables);
}

/// An open, locked ledger table plus the saved session state around it.
pub struct TableScope<'a> {
    engine: &'a dyn StorageEngine,
    session: SessionSlot<'a>,
    table: Option<Box<dyn LedgerTable>>,
    backups: Option<ScopeBackups>,
    closed: bool,
}

impl<'a> TableScope<'a> {
    /// Acquire the ledger table.
    ///
    /// `write` selects the lock strength. A `None` session synthesizes a
    /// fresh system context that lives for the scope's duration.
    ///
    /// # Errors
    ///
    /// [`LedgerError::TableUnavailable`] when the table cannot be opened
    /// (recoverable; a warning is logged), [`LedgerError::SchemaMismatch`]
    /// when it has fewer than three columns. Both leave the session exactly
    /// as it was.
    pub fn open(
        engine: &'a dyn StorageEngine,
        session: Option<&'a mut Session>,
        write: bool,
    ) -> Result<Self> {
        let (mut slot, synthesized) = match session {
            Some(s) => (SessionSlot::Borrowed(s), false),
            None => {
                let mut s = engine.new_session();
                s.set_system(true);
                (SessionSlot::Owned(s), true)
            }
        };

        let sess = slot.get_mut();
        let backups = ScopeBackups {
            open_tables: sess.backup_open_tables(),
            query_tables: sess.backup_query_tables(),
            binlog_was: sess.disable_binlog(),
            sql_mode_was: sess.clear_sql_mode(),
            synthesized,
        };

        let mode = if write {
            LockMode::Write
        } else {
            LockMode::Read
        };
        let table = match engine.open_table(sess, mode, OpenFlags::ledger_scope()) {
            Ok(table) => table,
            Err(error) => {
                restore_session(sess, backups);
                warn!(
                    table = LEDGER_TABLE_NAME,
                    %error,
                    "ledger table is not ready to be used"
                );
                return Err(error);
            }
        };

        let actual = table.schema().column_count();
        if actual < LEDGER_COLUMN_COUNT {
            // Can only happen when someone altered the table after the
            // server came up.
            let mut table = table;
            table.rollback_stmt();
            drop(table);
            restore_session(sess, backups);
            return Err(LedgerError::SchemaMismatch {
                expected: LEDGER_COLUMN_COUNT,
                actual,
            });
        }

        Ok(Self {
            engine,
            session: slot,
            table: Some(table),
            backups: Some(backups),
            closed: false,
        })
    }

    /// The open table handle.
    pub fn table_mut(&mut self) -> &mut dyn LedgerTable {
        match self.table.as_deref_mut() {
            Some(table) => table,
            None => unreachable!("scope table is present until close"),
        }
    }

    /// The session the scope runs under.
    pub fn session_mut(&mut self) -> &mut Session {
        self.session.get_mut()
    }

    /// Release the scope.
    ///
    /// `error` selects rollback over commit for the inner statement;
    /// `commit_outer` additionally resolves the outer transaction the same
    /// way. State restoration happens regardless of the outcome.
    pub fn close(mut self, error: bool, commit_outer: bool) -> Result<()> {
        self.closed = true;
        let mut result = Ok(());

        if let Some(mut table) = self.table.take() {
            if error {
                table.rollback_stmt();
            } else if let Err(e) = table.commit_stmt(self.session.get_mut()) {
                result = Err(e);
            }

            if commit_outer {
                let failed = error || result.is_err();
                if failed {
                    self.engine.rollback_session(self.session.get_mut());
                } else if let Err(e) = self.engine.commit_session(self.session.get_mut()) {
                    result = Err(e);
                }
            }
            // Dropping the handle releases the table lock.
            drop(table);
        }

        if let Some(backups) = self.backups.take() {
            restore_session(self.session.get_mut(), backups);
        }
        result
    }
}

impl Drop for TableScope<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Some(mut table) = self.table.take() {
            table.rollback_stmt();
            drop(table);
        }
        if let Some(backups) = self.backups.take() {
            let synthesized = backups.synthesized;
            restore_session(self.session.get_mut(), backups);
            if synthesized {
                self.engine.rollback_session(self.session.get_mut());
            }
        }
    }
}
