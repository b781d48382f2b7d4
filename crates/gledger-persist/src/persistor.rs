//! The transactional persistor.
//!
//! Appends identifiers into the ledger table, reads the full ledger back,
//! erases it, and drives range compaction. All table access goes through
//! [`TableScope`], so replication-log suppression and state restoration are
//! uniform across operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gledger_error::{LedgerError, Result};
use gledger_storage::engine::{LedgerTable, StorageEngine};
use gledger_storage::row::{RowImage, RowKey, TableSchema};
use gledger_storage::session::Session;
use gledger_types::{GNO_RANGE_SEPARATOR, Gtid, GtidSet, SID_GNO_SEPARATOR};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::LedgerConfig;
use crate::scope::TableScope;
use crate::stats::{LedgerStats, LedgerStatsSnapshot};
use crate::worker::CompressSync;

/// Column ordinals of the ledger table.
const COL_SID: usize = 0;
const COL_GNO_START: usize = 1;
const COL_GNO_END: usize = 2;

/// Result of one compaction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressOutcome {
    /// Whether the pass reached end of scan, i.e. no further run remains
    /// beyond the one it merged.
    pub complete: bool,
    /// Rows removed by merging during this pass.
    pub rows_merged: u64,
}

/// What a first-run walk observed.
struct RunScan {
    /// `(sid, start)` of the surviving first row of the run, when found.
    first: Option<(String, u64)>,
    /// Last row visited: `(sid, start, end)`.
    prev: Option<(String, u64, u64)>,
    rows_merged: u64,
    stopped_early: bool,
}

/// Durable, self-compacting record of executed transaction identifiers.
pub struct GtidPersistor {
    engine: Arc<dyn StorageEngine>,
    sync: Arc<CompressSync>,
    /// Appends since the last compaction signal. Deliberately racy: the
    /// read-modify-write is relaxed and the threshold is a soft hint, so
    /// occasional double-signals or missed signals are fine — compaction is
    /// idempotent.
    append_count: AtomicU64,
    compression_period: AtomicU64,
    stats: LedgerStats,
}

impl GtidPersistor {
    /// Build a persistor over `engine`.
    #[must_use]
    pub fn new(engine: Arc<dyn StorageEngine>, config: &LedgerConfig) -> Self {
        Self {
            engine,
            sync: Arc::new(CompressSync::new()),
            append_count: AtomicU64::new(0),
            compression_period: AtomicU64::new(config.compression_period),
            stats: LedgerStats::new(),
        }
    }

    /// The worker-coordination triple shared with [`crate::CompressionWorker`].
    #[must_use]
    pub fn compress_sync(&self) -> &Arc<CompressSync> {
        &self.sync
    }

    /// Current append threshold; zero disables automatic compaction.
    #[must_use]
    pub fn compression_period(&self) -> u64 {
        self.compression_period.load(Ordering::Relaxed)
    }

    /// Adjust the append threshold at runtime.
    pub fn set_compression_period(&self, period: u64) {
        self.compression_period.store(period, Ordering::Relaxed);
    }

    /// Wake the compaction worker out of band. Spurious signals are
    /// harmless; the worker re-checks its predicate and a no-op compaction
    /// pass changes nothing.
    pub fn signal_compression(&self) {
        self.sync.signal();
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> LedgerStatsSnapshot {
        self.stats.snapshot()
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Append one identifier as a degenerate `[gno, gno]` interval.
    ///
    /// On success the append counter advances; crossing the compression
    /// threshold resets it and signals the compaction worker.
    pub fn save(&self, session: Option<&mut Session>, gtid: Gtid) -> Result<()> {
        let sid_text = gtid.sid.to_text();
        let gno = gtid.gno.get();

        let mut scope = TableScope::open(self.engine.as_ref(), session, true)?;
        let written = Self::write_row(scope.table_mut(), &sid_text, gno, gno);
        let closed = scope.close(written.is_err(), false);
        written.and(closed)?;

        self.stats.record_append();
        let count = self.append_count.fetch_add(1, Ordering::Relaxed) + 1;
        let period = self.compression_period.load(Ordering::Relaxed);
        if period != 0 && count >= period {
            self.append_count.store(0, Ordering::Relaxed);
            self.stats.record_signal();
            // Signalled without holding the worker mutex; the worker
            // re-checks its predicate on every wake.
            self.sync.signal();
        }
        Ok(())
    }

    /// Append every interval of `set` in one statement. Either all rows
    /// are persisted or none.
    pub fn save_set(&self, session: Option<&mut Session>, set: &GtidSet) -> Result<()> {
        let mut scope = TableScope::open(self.engine.as_ref(), session, true)?;
        let mut written = Ok(());
        for (sid, interval) in set.intervals() {
            if let Err(e) = Self::write_row(
                scope.table_mut(),
                &sid.to_text(),
                interval.start().get(),
                interval.end().get(),
            ) {
                written = Err(e);
                break;
            }
        }
        let closed = scope.close(written.is_err(), false);
        written.and(closed)
    }

    /// Scan the ledger and accumulate every row into `into` under the
    /// set's own write lock.
    ///
    /// End of scan is the sole non-error termination. A row that fails to
    /// parse stops the scan; the cause is logged and a storage error is
    /// surfaced. The target set keeps whatever the scan reached.
    pub fn fetch(&self, session: Option<&mut Session>, into: &RwLock<GtidSet>) -> Result<()> {
        let mut scope = TableScope::open(self.engine.as_ref(), session, false)?;
        let scanned = {
            let table = scope.table_mut();
            table.rnd_init()?;
            let walk = loop {
                match table.rnd_next() {
                    Err(e) => break Err(e),
                    Ok(None) => break Ok(()),
                    Ok(Some(row)) => {
                        let text = match Self::encode_row(&row) {
                            Ok(text) => text,
                            Err(e) => break Err(e),
                        };
                        let mut target = into.write();
                        if let Err(error) = target.add_text(&text) {
                            warn!(row = %text, %error, "malformed row in ledger table");
                            break Err(LedgerError::storage(format!(
                                "malformed ledger row '{text}'"
                            )));
                        }
                    }
                }
            };
            table.rnd_end();
            walk
        };
        let closed = scope.close(scanned.is_err(), true);
        scanned.and(closed)
    }

    /// Delete every row.
    ///
    /// Runs under the compaction mutex so it serializes with `compress`.
    /// Rows are deleted one by one inside the transaction; table truncation
    /// would be a non-transactional operation and is never used.
    pub fn reset(&self, session: Option<&mut Session>) -> Result<()> {
        let _compaction_excluded = self.sync.lock();
        let mut scope = TableScope::open(self.engine.as_ref(), session, true)?;
        let deleted = Self::delete_all(scope.table_mut());
        let closed = scope.close(deleted.is_err(), true);
        deleted.and(closed)?;
        self.stats.record_reset();
        Ok(())
    }

    /// Run one pass of range compaction: merge the first run of
    /// consecutive same-SID intervals in primary-key order.
    ///
    /// Merging only the first run bounds the transaction size; the worker
    /// is re-signalled as appends accumulate, so the ledger converges
    /// toward canonical form under normal workloads.
    pub fn compress(&self, session: Option<&mut Session>) -> Result<CompressOutcome> {
        let _reset_excluded = self.sync.lock();
        let result = (|| {
            let mut scope = TableScope::open(self.engine.as_ref(), session, true)?;
            let merged = Self::merge_first_consecutive_rows(scope.table_mut());
            let closed = scope.close(merged.is_err(), true);
            merged.and_then(|outcome| closed.map(|()| outcome))
        })();
        match result {
            Ok(outcome) => {
                if outcome.rows_merged > 0 {
                    info!(
                        rows_merged = outcome.rows_merged,
                        complete = outcome.complete,
                        "compacted ledger rows"
                    );
                } else {
                    debug!("compaction pass found nothing to merge");
                }
                self.stats.record_compression(outcome.rows_merged);
                Ok(outcome)
            }
            Err(e) => {
                self.stats.record_compression_failure();
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Row helpers
    // -----------------------------------------------------------------------

    /// Store the SID text, then `gno_start`, then `gno_end`.
    fn fill_fields(
        schema: &TableSchema,
        row: &mut RowImage,
        sid_text: &str,
        gno_start: u64,
        gno_end: u64,
    ) -> Result<()> {
        row.store_text(schema, COL_SID, sid_text)?;
        row.store_u64(schema, COL_GNO_START, gno_start)?;
        row.store_u64(schema, COL_GNO_END, gno_end)?;
        Ok(())
    }

    /// Clear a record, fill it, and insert it.
    fn write_row(
        table: &mut dyn LedgerTable,
        sid_text: &str,
        gno_start: u64,
        gno_end: u64,
    ) -> Result<()> {
        let mut row = RowImage::empty(table.schema().column_count());
        Self::fill_fields(table.schema(), &mut row, sid_text, gno_start, gno_end)?;
        table.insert(&row)
    }

    /// Locate the row at `(sid_text, gno_start)` through the primary key
    /// and extend its `gno_end`. The index cursor is released on every
    /// path.
    fn update_row(
        table: &mut dyn LedgerTable,
        sid_text: &str,
        gno_start: u64,
        new_gno_end: u64,
    ) -> Result<()> {
        table.index_init()?;
        let key = RowKey::new(sid_text, gno_start);
        let updated = (|| {
            let old = table.index_read_exact(&key)?.ok_or_else(|| {
                LedgerError::storage(format!("ledger row ('{sid_text}', {gno_start}) not found"))
            })?;
            let mut new = old.clone();
            new.store_u64(table.schema(), COL_GNO_END, new_gno_end)?;
            table.update(&old, &new)
        })();
        table.index_end();
        updated
    }

    /// Full scan issuing a delete per row; end of scan is success.
    fn delete_all(table: &mut dyn LedgerTable) -> Result<()> {
        table.rnd_init()?;
        let deleted = loop {
            match table.rnd_next() {
                Err(e) => break Err(e),
                Ok(None) => break Ok(()),
                Ok(Some(row)) => {
                    if let Err(cause) = table.delete(&row) {
                        let row_text = Self::encode_row(&row).unwrap_or_default();
                        error!(row = %row_text, error = %cause, "failed to delete ledger row");
                        break Err(cause);
                    }
                }
            }
        };
        table.rnd_end();
        deleted
    }

    /// Walk the primary key in increasing order and merge the first run of
    /// consecutive intervals: delete every run row after the first, then
    /// extend the first row's `gno_end` to the run's last GNO.
    fn merge_first_consecutive_rows(table: &mut dyn LedgerTable) -> Result<CompressOutcome> {
        table.index_init()?;
        let walked: Result<RunScan> = (|| {
            let mut scan = RunScan {
                first: None,
                prev: None,
                rows_merged: 0,
                stopped_early: false,
            };
            let mut cur = table.index_first()?;
            while let Some(row) = cur {
                let (sid, start, end) = Self::read_interval(&row)?;
                match &scan.prev {
                    Some((prev_sid, prev_start, prev_end))
                        if *prev_sid == sid && prev_end.checked_add(1) == Some(start) =>
                    {
                        if scan.first.is_none() {
                            scan.first = Some((prev_sid.clone(), *prev_start));
                        }
                        // The first run row survives so it can absorb the
                        // whole range; every later run row goes away.
                        table.delete(&row)?;
                        scan.rows_merged += 1;
                    }
                    Some(_) if scan.first.is_some() => {
                        scan.stopped_early = true;
                        break;
                    }
                    _ => {}
                }
                scan.prev = Some((sid, start, end));
                cur = table.index_next()?;
            }
            Ok(scan)
        })();
        table.index_end();
        let scan: RunScan = walked?;

        if let Some((sid, start)) = &scan.first {
            let last_end = scan.prev.as_ref().map_or(*start, |(_, _, end)| *end);
            Self::update_row(table, sid, *start, last_end)?;
        }
        Ok(CompressOutcome {
            complete: !scan.stopped_early,
            rows_merged: scan.rows_merged,
        })
    }

    /// Encode the current row into the canonical `<sid>:<start>-<end>`
    /// text the identifier algebra round-trips.
    fn encode_row(row: &RowImage) -> Result<String> {
        let (sid, start, end) = Self::read_interval(row)?;
        Ok(format!(
            "{sid}{SID_GNO_SEPARATOR}{start}{GNO_RANGE_SEPARATOR}{end}"
        ))
    }

    /// Pull the raw `(sid_text, gno_start, gno_end)` triple out of a row.
    fn read_interval(row: &RowImage) -> Result<(String, u64, u64)> {
        let sid = row
            .text(COL_SID)
            .ok_or_else(|| LedgerError::storage("null or mistyped sid column"))?;
        let start = row
            .u64(COL_GNO_START)
            .ok_or_else(|| LedgerError::storage("null or mistyped gno_start column"))?;
        let end = row
            .u64(COL_GNO_END)
            .ok_or_else(|| LedgerError::storage("null or mistyped gno_end column"))?;
        Ok((sid.to_owned(), start, end))
    }
}
