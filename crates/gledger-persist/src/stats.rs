//! Persistor observability counters.
//!
//! Relaxed atomics, lock-free, safe for concurrent writers. These are
//! advisory numbers for operators and tests; nothing in the ledger's
//! correctness depends on them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter block owned by one persistor instance.
#[derive(Debug, Default)]
pub struct LedgerStats {
    /// Successful single-identifier appends.
    appends: AtomicU64,
    /// Compaction signals sent to the worker.
    compress_signals: AtomicU64,
    /// Compaction passes that ran to completion.
    compression_runs: AtomicU64,
    /// Compaction passes that failed.
    compression_failures: AtomicU64,
    /// Rows removed by merging across all passes.
    rows_merged: AtomicU64,
    /// Full ledger erasures.
    resets: AtomicU64,
}

impl LedgerStats {
    /// A zeroed counter block.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            appends: AtomicU64::new(0),
            compress_signals: AtomicU64::new(0),
            compression_runs: AtomicU64::new(0),
            compression_failures: AtomicU64::new(0),
            rows_merged: AtomicU64::new(0),
            resets: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_append(&self) {
        self.appends.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_signal(&self) {
        self.compress_signals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compression(&self, rows_merged: u64) {
        self.compression_runs.fetch_add(1, Ordering::Relaxed);
        self.rows_merged.fetch_add(rows_merged, Ordering::Relaxed);
    }

    pub(crate) fn record_compression_failure(&self) {
        self.compression_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot every counter.
    #[must_use]
    pub fn snapshot(&self) -> LedgerStatsSnapshot {
        LedgerStatsSnapshot {
            appends: self.appends.load(Ordering::Relaxed),
            compress_signals: self.compress_signals.load(Ordering::Relaxed),
            compression_runs: self.compression_runs.load(Ordering::Relaxed),
            compression_failures: self.compression_failures.load(Ordering::Relaxed),
            rows_merged: self.rows_merged.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStatsSnapshot {
    pub appends: u64,
    pub compress_signals: u64,
    pub compression_runs: u64,
    pub compression_failures: u64,
    pub rows_merged: u64,
    pub resets: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = LedgerStats::new();
        stats.record_append();
        stats.record_append();
        stats.record_signal();
        stats.record_compression(3);
        stats.record_compression_failure();
        stats.record_reset();
        let snap = stats.snapshot();
        assert_eq!(snap.appends, 2);
        assert_eq!(snap.compress_signals, 1);
        assert_eq!(snap.compression_runs, 1);
        assert_eq!(snap.rows_merged, 3);
        assert_eq!(snap.compression_failures, 1);
        assert_eq!(snap.resets, 1);
    }
}
