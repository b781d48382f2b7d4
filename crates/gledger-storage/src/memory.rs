//! In-memory transactional engine.
//!
//! Backs the ledger with a `BTreeMap` keyed by `(sid_text, gno_start)` and
//! statement/transaction staging: writes collect on the handle, move to the
//! session on statement commit inside an explicit transaction, and apply to
//! the base map atomically otherwise. A shared/exclusive table lock makes a
//! scope block against an incompatible peer, and committed writes from
//! replication-logged sessions land in a journal so tests can verify the
//! ledger never pollutes it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use gledger_error::{LedgerError, Result};
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::engine::{LedgerTable, LockMode, OpenFlags, StorageEngine};
use crate::row::{RowImage, RowKey, TableSchema};
use crate::session::{RowOp, Session};

/// How long a table open waits for an incompatible peer before giving up,
/// unless `IGNORE_LOCK_TIMEOUT` is set.
const LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// One committed, replication-logged statement.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub ops: Vec<RowOp>,
}

#[derive(Debug, Default)]
struct MemState {
    rows: BTreeMap<RowKey, RowImage>,
    readers: usize,
    writer: bool,
    table_present: bool,
    global_read_lock: bool,
    global_read_only: bool,
    flush_pending: bool,
}

struct MemShared {
    schema: TableSchema,
    state: Mutex<MemState>,
    lock_cv: Condvar,
    journal: Mutex<Vec<JournalEntry>>,
}

fn apply_one(rows: &mut BTreeMap<RowKey, RowImage>, op: &RowOp) -> Result<()> {
    match op {
        RowOp::Insert(image) => {
            let key = RowKey::from_row(image)?;
            if rows.insert(key.clone(), image.clone()).is_some() {
                return Err(LedgerError::storage(format!(
                    "duplicate primary key ('{}', {})",
                    key.sid_text, key.gno_start
                )));
            }
        }
        RowOp::Update { key, image } => {
            if !rows.contains_key(key) {
                return Err(LedgerError::storage(format!(
                    "update target ('{}', {}) vanished",
                    key.sid_text, key.gno_start
                )));
            }
            rows.insert(key.clone(), image.clone());
        }
        RowOp::Delete { key } => {
            if rows.remove(key).is_none() {
                return Err(LedgerError::storage(format!(
                    "delete target ('{}', {}) vanished",
                    key.sid_text, key.gno_start
                )));
            }
        }
    }
    Ok(())
}

impl MemShared {
    /// Apply one statement's ops, journaling the whole batch when the
    /// session is replication-logged.
    fn apply_ops(&self, ops: &[RowOp], replicate: bool) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        self.apply_batch(ops, if replicate { ops.to_vec() } else { Vec::new() })
    }

    /// Apply buffered transaction ops; each carries the replication
    /// decision captured when its statement committed.
    fn apply_staged(&self, staged: &[(RowOp, bool)]) -> Result<()> {
        if staged.is_empty() {
            return Ok(());
        }
        let ops: Vec<RowOp> = staged.iter().map(|(op, _)| op.clone()).collect();
        let replicated: Vec<RowOp> = staged
            .iter()
            .filter(|(_, replicate)| *replicate)
            .map(|(op, _)| op.clone())
            .collect();
        self.apply_batch(&ops, replicated)
    }

    fn apply_batch(&self, ops: &[RowOp], replicated: Vec<RowOp>) -> Result<()> {
        let mut state = self.state.lock();
        // Apply against a copy so a mid-batch failure leaves the base
        // untouched.
        let mut rows = state.rows.clone();
        for op in ops {
            apply_one(&mut rows, op)?;
        }
        state.rows = rows;
        drop(state);
        if !replicated.is_empty() {
            debug!(ops = replicated.len(), "journaling replicated statement");
            self.journal.lock().push(JournalEntry { ops: replicated });
        }
        Ok(())
    }
}

/// The in-process storage engine.
pub struct MemoryEngine {
    shared: Arc<MemShared>,
}

impl MemoryEngine {
    /// Engine with the canonical three-column ledger schema.
    #[must_use]
    pub fn new() -> Self {
        Self::with_schema(TableSchema::ledger_default())
    }

    /// Engine with a caller-provided schema (used to provoke schema
    /// mismatches and width failures in tests).
    #[must_use]
    pub fn with_schema(schema: TableSchema) -> Self {
        Self {
            shared: Arc::new(MemShared {
                schema,
                state: Mutex::new(MemState {
                    table_present: true,
                    ..MemState::default()
                }),
                lock_cv: Condvar::new(),
                journal: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Simulate the ledger table being absent (dropped or not yet created).
    pub fn set_table_present(&self, present: bool) {
        self.shared.state.lock().table_present = present;
    }

    /// Toggle the host's global read lock.
    pub fn set_global_read_lock(&self, locked: bool) {
        self.shared.state.lock().global_read_lock = locked;
    }

    /// Toggle the host's global read-only switch.
    pub fn set_global_read_only(&self, read_only: bool) {
        self.shared.state.lock().global_read_only = read_only;
    }

    /// Toggle a pending flush-tables operation.
    pub fn set_flush_pending(&self, pending: bool) {
        self.shared.state.lock().flush_pending = pending;
    }

    /// Number of rows in the base table.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.shared.state.lock().rows.len()
    }

    /// Snapshot of the base table as `(sid_text, gno_start, gno_end)`
    /// triples in primary-key order.
    #[must_use]
    pub fn dump_rows(&self) -> Vec<(String, u64, u64)> {
        self.shared
            .state
            .lock()
            .rows
            .values()
            .map(|row| {
                (
                    row.text(0).unwrap_or_default().to_owned(),
                    row.u64(1).unwrap_or_default(),
                    row.u64(2).unwrap_or_default(),
                )
            })
            .collect()
    }

    /// Place a raw row directly into the base table, bypassing the
    /// transactional path. Repair/test hook; the text is not validated
    /// beyond the declared column width.
    pub fn seed_row(&self, sid_text: &str, gno_start: u64, gno_end: u64) -> Result<()> {
        let mut row = RowImage::empty(self.shared.schema.column_count());
        row.store_text(&self.shared.schema, 0, sid_text)?;
        row.store_u64(&self.shared.schema, 1, gno_start)?;
        row.store_u64(&self.shared.schema, 2, gno_end)?;
        let key = RowKey::from_row(&row)?;
        self.shared.state.lock().rows.insert(key, row);
        Ok(())
    }

    /// Snapshot of the replication journal.
    #[must_use]
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.shared.journal.lock().clone()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for MemoryEngine {
    fn new_session(&self) -> Session {
        Session::new()
    }

    fn open_table(
        &self,
        session: &mut Session,
        mode: LockMode,
        flags: OpenFlags,
    ) -> Result<Box<dyn LedgerTable>> {
        if session.is_killed() && !flags.contains(OpenFlags::IGNORE_KILLED) {
            return Err(LedgerError::TableUnavailable);
        }

        let mut state = self.shared.state.lock();
        if !state.table_present {
            return Err(LedgerError::TableUnavailable);
        }
        if state.flush_pending && !flags.contains(OpenFlags::IGNORE_FLUSH) {
            return Err(LedgerError::TableUnavailable);
        }
        if mode == LockMode::Write {
            if state.global_read_lock && !flags.contains(OpenFlags::IGNORE_GLOBAL_READ_LOCK) {
                return Err(LedgerError::TableUnavailable);
            }
            if state.global_read_only && !flags.contains(OpenFlags::IGNORE_GLOBAL_READ_ONLY) {
                return Err(LedgerError::TableUnavailable);
            }
        }

        loop {
            let grantable = match mode {
                LockMode::Read => !state.writer,
                LockMode::Write => !state.writer && state.readers == 0,
            };
            if grantable {
                break;
            }
            if flags.contains(OpenFlags::IGNORE_LOCK_TIMEOUT) {
                self.shared.lock_cv.wait(&mut state);
            } else if self
                .shared
                .lock_cv
                .wait_for(&mut state, LOCK_WAIT_TIMEOUT)
                .timed_out()
            {
                return Err(LedgerError::TableUnavailable);
            }
        }
        match mode {
            LockMode::Read => state.readers += 1,
            LockMode::Write => state.writer = true,
        }
        drop(state);

        Ok(Box::new(MemoryTable {
            shared: Arc::clone(&self.shared),
            mode,
            lock_held: true,
            stmt_ops: Vec::new(),
            index_cursor: None,
            rnd_cursor: None,
        }))
    }

    fn commit_session(&self, session: &mut Session) -> Result<()> {
        let staged = session.take_pending_ops();
        self.shared.apply_staged(&staged)
    }

    fn rollback_session(&self, session: &mut Session) {
        let dropped = session.take_pending_ops();
        if !dropped.is_empty() {
            debug!(ops = dropped.len(), "rolled back buffered transaction");
        }
    }
}

/// Snapshot cursor: keys captured at init time, advanced by position.
struct Cursor {
    keys: Vec<RowKey>,
    pos: usize,
}

/// Open handle on the in-memory ledger table.
struct MemoryTable {
    shared: Arc<MemShared>,
    mode: LockMode,
    lock_held: bool,
    stmt_ops: Vec<RowOp>,
    index_cursor: Option<Cursor>,
    rnd_cursor: Option<Cursor>,
}

impl MemoryTable {
    fn require_write(&self) -> Result<()> {
        if self.mode == LockMode::Write {
            Ok(())
        } else {
            Err(LedgerError::storage("table opened without write lock"))
        }
    }

    fn check_shape(&self, row: &RowImage) -> Result<()> {
        if row.field_count() == self.shared.schema.column_count() {
            Ok(())
        } else {
            Err(LedgerError::storage(format!(
                "row has {} fields, table has {} columns",
                row.field_count(),
                self.shared.schema.column_count()
            )))
        }
    }

    fn snapshot_keys(&self) -> Vec<RowKey> {
        self.shared.state.lock().rows.keys().cloned().collect()
    }

    fn advance(&mut self, which: CursorKind) -> Result<Option<RowImage>> {
        let cursor = match which {
            CursorKind::Index => self.index_cursor.as_mut(),
            CursorKind::Rnd => self.rnd_cursor.as_mut(),
        };
        let Some(cursor) = cursor else {
            return Err(LedgerError::storage("scan cursor not initialized"));
        };
        let state = self.shared.state.lock();
        while cursor.pos < cursor.keys.len() {
            let pos = cursor.pos;
            cursor.pos += 1;
            if let Some(row) = state.rows.get(&cursor.keys[pos]) {
                return Ok(Some(row.clone()));
            }
            // Key vanished since the snapshot; skip it.
        }
        Ok(None)
    }

    fn release_lock(&mut self) {
        if !self.lock_held {
            return;
        }
        self.lock_held = false;
        let mut state = self.shared.state.lock();
        match self.mode {
            LockMode::Read => state.readers = state.readers.saturating_sub(1),
            LockMode::Write => state.writer = false,
        }
        drop(state);
        self.shared.lock_cv.notify_all();
    }
}

enum CursorKind {
    Index,
    Rnd,
}

impl LedgerTable for MemoryTable {
    fn schema(&self) -> &TableSchema {
        &self.shared.schema
    }

    fn insert(&mut self, row: &RowImage) -> Result<()> {
        self.require_write()?;
        self.check_shape(row)?;
        let key = RowKey::from_row(row)?;
        let state = self.shared.state.lock();
        let in_base = state.rows.contains_key(&key);
        drop(state);
        let staged = self.stmt_ops.iter().any(|op| {
            matches!(op, RowOp::Insert(image)
                if RowKey::from_row(image).is_ok_and(|k| k == key))
        });
        if in_base || staged {
            return Err(LedgerError::storage(format!(
                "duplicate primary key ('{}', {})",
                key.sid_text, key.gno_start
            )));
        }
        self.stmt_ops.push(RowOp::Insert(row.clone()));
        Ok(())
    }

    fn update(&mut self, old: &RowImage, new: &RowImage) -> Result<()> {
        self.require_write()?;
        self.check_shape(new)?;
        let key = RowKey::from_row(old)?;
        if !self.shared.state.lock().rows.contains_key(&key) {
            return Err(LedgerError::storage(format!(
                "update target ('{}', {}) not found",
                key.sid_text, key.gno_start
            )));
        }
        self.stmt_ops.push(RowOp::Update {
            key,
            image: new.clone(),
        });
        Ok(())
    }

    fn delete(&mut self, row: &RowImage) -> Result<()> {
        self.require_write()?;
        let key = RowKey::from_row(row)?;
        if !self.shared.state.lock().rows.contains_key(&key) {
            return Err(LedgerError::storage(format!(
                "delete target ('{}', {}) not found",
                key.sid_text, key.gno_start
            )));
        }
        self.stmt_ops.push(RowOp::Delete { key });
        Ok(())
    }

    fn index_init(&mut self) -> Result<()> {
        self.index_cursor = Some(Cursor {
            keys: self.snapshot_keys(),
            pos: 0,
        });
        Ok(())
    }

    fn index_first(&mut self) -> Result<Option<RowImage>> {
        if let Some(cursor) = self.index_cursor.as_mut() {
            cursor.pos = 0;
        }
        self.advance(CursorKind::Index)
    }

    fn index_next(&mut self) -> Result<Option<RowImage>> {
        self.advance(CursorKind::Index)
    }

    fn index_read_exact(&mut self, key: &RowKey) -> Result<Option<RowImage>> {
        Ok(self.shared.state.lock().rows.get(key).cloned())
    }

    fn index_end(&mut self) {
        self.index_cursor = None;
    }

    fn rnd_init(&mut self) -> Result<()> {
        self.rnd_cursor = Some(Cursor {
            keys: self.snapshot_keys(),
            pos: 0,
        });
        Ok(())
    }

    fn rnd_next(&mut self) -> Result<Option<RowImage>> {
        self.advance(CursorKind::Rnd)
    }

    fn rnd_end(&mut self) {
        self.rnd_cursor = None;
    }

    fn commit_stmt(&mut self, session: &mut Session) -> Result<()> {
        let ops = std::mem::take(&mut self.stmt_ops);
        if session.in_explicit_txn() {
            let replicate = session.binlog_enabled();
            session.stage_ops(ops, replicate);
            Ok(())
        } else {
            self.shared.apply_ops(&ops, session.binlog_enabled())
        }
    }

    fn rollback_stmt(&mut self) {
        self.stmt_ops.clear();
    }
}

impl Drop for MemoryTable {
    fn drop(&mut self) {
        self.release_lock();
    }
}
