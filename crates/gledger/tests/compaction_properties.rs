//! Property obligations of the persistor and compactor.
//!
//! The ledger on disk may be non-canonical, but it must always be sound:
//! every executed identifier covered exactly once, nothing lost, nothing
//! invented. Compaction is an identity transformation on that union.

use std::collections::BTreeMap;
use std::sync::Arc;

use gledger::{GtidLedger, Gno, Gtid, GtidSet, LedgerConfig, MemoryEngine, Sid, StorageEngine};
use proptest::prelude::*;

const SIDS: [&str; 3] = [
    "3e11fa47c3114f90914be7ecbcf866bb",
    "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
    "ffffffffffffffffffffffffffffffff",
];

fn gtid(sid_idx: usize, gno: u64) -> Gtid {
    Gtid::new(
        Sid::from_text(SIDS[sid_idx]).unwrap(),
        Gno::new(gno).unwrap(),
    )
}

fn ledger_over(engine: &Arc<MemoryEngine>) -> GtidLedger {
    let dyn_engine: Arc<dyn StorageEngine> = Arc::clone(engine) as _;
    // Automatic signalling off: these properties exercise the foreground
    // operations deterministically.
    GtidLedger::with_engine(
        dyn_engine,
        LedgerConfig {
            compression_period: 0,
        },
    )
    .unwrap()
}

/// Distinct `(sid, gno)` pairs; a server never re-executes an identifier.
fn save_pairs() -> impl Strategy<Value = Vec<(usize, u64)>> {
    proptest::collection::btree_set((0..SIDS.len(), 1..=48u64), 0..48)
        .prop_map(|set| set.into_iter().collect())
}

fn expected_union(pairs: &[(usize, u64)]) -> GtidSet {
    let mut set = GtidSet::new();
    for &(sid_idx, gno) in pairs {
        set.add_gtid(gtid(sid_idx, gno));
    }
    set
}

/// Every row well-formed and no identifier represented by more than one
/// row.
fn assert_rows_sound(rows: &[(String, u64, u64)]) {
    let mut per_sid: BTreeMap<&str, Vec<(u64, u64)>> = BTreeMap::new();
    for (sid, start, end) in rows {
        assert!(*start >= 1, "row start {start} below 1");
        assert!(start <= end, "row bounds [{start}, {end}] inverted");
        per_sid.entry(sid.as_str()).or_default().push((*start, *end));
    }
    for (sid, mut intervals) in per_sid {
        intervals.sort_unstable();
        for pair in intervals.windows(2) {
            assert!(
                pair[0].1 < pair[1].0,
                "rows for {sid} overlap: [{},{}] and [{},{}]",
                pair[0].0,
                pair[0].1,
                pair[1].0,
                pair[1].1
            );
        }
    }
}

proptest! {
    // The fetched union equals the union of everything saved.
    #[test]
    fn fetch_returns_the_saved_union(pairs in save_pairs()) {
        let engine = Arc::new(MemoryEngine::new());
        let ledger = ledger_over(&engine);
        for &(sid_idx, gno) in &pairs {
            ledger.save(gtid(sid_idx, gno)).unwrap();
        }
        let fetched = ledger.fetch().unwrap();
        prop_assert_eq!(fetched, expected_union(&pairs));
        ledger.shutdown().unwrap();
    }

    // Compaction is semantically idempotent.
    #[test]
    fn compress_preserves_semantics(pairs in save_pairs(), passes in 1..4usize) {
        let engine = Arc::new(MemoryEngine::new());
        let ledger = ledger_over(&engine);
        for &(sid_idx, gno) in &pairs {
            ledger.save(gtid(sid_idx, gno)).unwrap();
        }
        let before = ledger.fetch().unwrap();
        for _ in 0..passes {
            ledger.compress().unwrap();
        }
        let after = ledger.fetch().unwrap();
        prop_assert_eq!(before, after);
        ledger.shutdown().unwrap();
    }

    // Compaction never grows the row count.
    #[test]
    fn compress_is_non_expanding(pairs in save_pairs()) {
        let engine = Arc::new(MemoryEngine::new());
        let ledger = ledger_over(&engine);
        for &(sid_idx, gno) in &pairs {
            ledger.save(gtid(sid_idx, gno)).unwrap();
        }
        let mut previous = engine.row_count();
        loop {
            let outcome = ledger.compress().unwrap();
            let current = engine.row_count();
            prop_assert!(current <= previous, "row count grew {previous} -> {current}");
            previous = current;
            if outcome.complete {
                break;
            }
        }
        ledger.shutdown().unwrap();
    }

    // After a reset the ledger is empty.
    #[test]
    fn reset_yields_the_empty_set(pairs in save_pairs()) {
        let engine = Arc::new(MemoryEngine::new());
        let ledger = ledger_over(&engine);
        for &(sid_idx, gno) in &pairs {
            ledger.save(gtid(sid_idx, gno)).unwrap();
        }
        ledger.reset().unwrap();
        prop_assert_eq!(engine.row_count(), 0);
        prop_assert!(ledger.fetch().unwrap().is_empty());
        ledger.shutdown().unwrap();
    }

    // Any interleaving of saves and compaction passes loses nothing,
    // duplicates nothing, and keeps every row well-formed.
    #[test]
    fn interleaved_saves_and_compressions_stay_sound(
        pairs in save_pairs(),
        compress_before in proptest::collection::vec(any::<bool>(), 48),
    ) {
        let engine = Arc::new(MemoryEngine::new());
        let ledger = ledger_over(&engine);
        for (i, &(sid_idx, gno)) in pairs.iter().enumerate() {
            if compress_before.get(i).copied().unwrap_or(false) {
                ledger.compress().unwrap();
                assert_rows_sound(&engine.dump_rows());
            }
            ledger.save(gtid(sid_idx, gno)).unwrap();
        }
        ledger.compress().unwrap();

        assert_rows_sound(&engine.dump_rows());
        let fetched = ledger.fetch().unwrap();
        prop_assert_eq!(fetched, expected_union(&pairs));
        ledger.shutdown().unwrap();
    }

    // Compaction driven to completion reaches the canonical row count:
    // one row per interval of the canonical union.
    #[test]
    fn complete_compaction_reaches_canonical_form(pairs in save_pairs()) {
        let engine = Arc::new(MemoryEngine::new());
        let ledger = ledger_over(&engine);
        for &(sid_idx, gno) in &pairs {
            ledger.save(gtid(sid_idx, gno)).unwrap();
        }
        // Each pass merges at least the first run; completeness means no
        // run was left beyond the merged one.
        for _ in 0..pairs.len().max(1) {
            if ledger.compress().unwrap().complete {
                break;
            }
        }
        let canonical = expected_union(&pairs);
        prop_assert_eq!(engine.row_count(), canonical.interval_count());
        assert_rows_sound(&engine.dump_rows());
        ledger.shutdown().unwrap();
    }
}
