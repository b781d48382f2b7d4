//! End-to-end scenarios over the assembled ledger.

use std::sync::Arc;
use std::thread;

use gledger::{
    GtidLedger, Gno, Gtid, GtidSet, LedgerConfig, LedgerError, MemoryEngine, Sid, StorageEngine,
};
use parking_lot::RwLock;

const SID_A: &str = "3e11fa47c3114f90914be7ecbcf866bb";
const SID_B: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn gtid(sid: &str, gno: u64) -> Gtid {
    Gtid::new(Sid::from_text(sid).unwrap(), Gno::new(gno).unwrap())
}

fn ledger_over(engine: &Arc<MemoryEngine>, period: u64) -> GtidLedger {
    let dyn_engine: Arc<dyn StorageEngine> = Arc::clone(engine) as _;
    GtidLedger::with_engine(
        dyn_engine,
        LedgerConfig {
            compression_period: period,
        },
    )
    .unwrap()
}

#[test]
fn singleton_append() {
    init_logging();
    let engine = Arc::new(MemoryEngine::new());
    let ledger = ledger_over(&engine, 0);

    ledger.save(gtid(SID_A, 5)).unwrap();

    let set = ledger.fetch().unwrap();
    assert!(set.contains_gtid(&gtid(SID_A, 5)));
    assert_eq!(set.gtid_count(), 1);
    assert_eq!(engine.row_count(), 1);
    ledger.shutdown().unwrap();
}

#[test]
fn consecutive_coalescing_over_two_passes() {
    init_logging();
    let engine = Arc::new(MemoryEngine::new());
    let ledger = ledger_over(&engine, 0);
    for gno in [1, 2, 3, 6, 7, 8] {
        ledger.save(gtid(SID_A, gno)).unwrap();
    }

    ledger.compress().unwrap();
    assert_eq!(
        engine.dump_rows(),
        vec![
            (SID_A.to_owned(), 1, 3),
            (SID_A.to_owned(), 6, 6),
            (SID_A.to_owned(), 7, 7),
            (SID_A.to_owned(), 8, 8),
        ]
    );

    ledger.compress().unwrap();
    assert_eq!(
        engine.dump_rows(),
        vec![(SID_A.to_owned(), 1, 3), (SID_A.to_owned(), 6, 8)]
    );

    // The union is untouched by both passes.
    let set = ledger.fetch().unwrap();
    assert_eq!(set.gtid_count(), 6);
    ledger.shutdown().unwrap();
}

#[test]
fn multi_source_non_interference() {
    init_logging();
    let engine = Arc::new(MemoryEngine::new());
    let ledger = ledger_over(&engine, 0);
    // In key order A:5 and B:6 are adjacent with consecutive GNOs; the
    // SID boundary must keep them apart.
    ledger.save(gtid(SID_A, 5)).unwrap();
    ledger.save(gtid(SID_B, 6)).unwrap();

    let outcome = ledger.compress().unwrap();
    assert_eq!(outcome.rows_merged, 0);
    assert_eq!(
        engine.dump_rows(),
        vec![(SID_A.to_owned(), 5, 5), (SID_B.to_owned(), 6, 6)]
    );
    ledger.shutdown().unwrap();
}

#[test]
fn threshold_triggers_exactly_one_signal() {
    init_logging();
    let engine = Arc::new(MemoryEngine::new());
    let ledger = ledger_over(&engine, 4);

    for gno in 1..=4 {
        ledger.save(gtid(SID_A, gno)).unwrap();
    }
    assert_eq!(ledger.stats().compress_signals, 1);

    // The counter was reset; nothing more fires until four more appends.
    for gno in 5..=7 {
        ledger.save(gtid(SID_A, gno)).unwrap();
    }
    assert_eq!(ledger.stats().compress_signals, 1);
    ledger.save(gtid(SID_A, 8)).unwrap();
    assert_eq!(ledger.stats().compress_signals, 2);
    ledger.shutdown().unwrap();
}

#[test]
fn reset_under_contention_serializes_with_compress() {
    init_logging();
    let engine = Arc::new(MemoryEngine::new());
    let ledger = Arc::new(ledger_over(&engine, 0));
    for gno in 1..=16 {
        ledger.save(gtid(SID_A, gno)).unwrap();
    }

    let compressor = {
        let ledger = Arc::clone(&ledger);
        thread::spawn(move || {
            // Either order is fine: a pass before the reset merges rows the
            // reset then deletes; a pass after it is a no-op.
            let _ = ledger.compress();
        })
    };
    ledger.reset().unwrap();
    compressor.join().unwrap();

    assert_eq!(engine.row_count(), 0);
    let set = ledger.fetch().unwrap();
    assert!(set.is_empty());
    Arc::into_inner(ledger).unwrap().shutdown().unwrap();
}

#[test]
fn malformed_row_surfaces_a_storage_error() {
    init_logging();
    let engine = Arc::new(MemoryEngine::new());
    let ledger = ledger_over(&engine, 0);
    ledger.save(gtid(SID_A, 1)).unwrap();
    engine
        .seed_row("not-a-hex-source-id-but-32-chars", 7, 7)
        .unwrap();

    let target = RwLock::new(GtidSet::new());
    let err = ledger.fetch_into(&target).unwrap_err();
    assert!(matches!(err, LedgerError::Storage { .. }));
    assert!(!err.is_recoverable());
    ledger.shutdown().unwrap();
}

#[test]
fn ledger_writes_never_reach_the_replication_journal() {
    init_logging();
    let engine = Arc::new(MemoryEngine::new());
    let ledger = ledger_over(&engine, 2);

    for gno in 1..=6 {
        ledger.save(gtid(SID_A, gno)).unwrap();
    }
    ledger.compress().unwrap();
    ledger.reset().unwrap();
    assert!(engine.journal().is_empty());
    ledger.shutdown().unwrap();
}

#[test]
fn save_joins_a_caller_transaction() {
    init_logging();
    let engine = Arc::new(MemoryEngine::new());
    let ledger = ledger_over(&engine, 0);

    let mut session = engine.new_session();
    session.begin();
    ledger
        .persistor()
        .save(Some(&mut session), gtid(SID_A, 3))
        .unwrap();
    // The append rides the caller's transaction: nothing visible yet.
    assert_eq!(engine.row_count(), 0);
    engine.commit_session(&mut session).unwrap();
    assert_eq!(engine.row_count(), 1);

    // The caller's session came back intact, and the ledger write stays
    // out of the journal even though the session is replication-logged:
    // the replication decision was captured while the scope had the
    // binlog switch off.
    assert!(session.binlog_enabled());
    assert!(engine.journal().is_empty());
    ledger.shutdown().unwrap();
}

#[test]
fn saves_while_host_is_read_only_still_succeed() {
    init_logging();
    let engine = Arc::new(MemoryEngine::new());
    engine.set_global_read_only(true);
    engine.set_global_read_lock(true);
    let ledger = ledger_over(&engine, 0);

    ledger.save(gtid(SID_A, 1)).unwrap();
    assert_eq!(engine.row_count(), 1);
    ledger.shutdown().unwrap();
}

#[test]
fn unavailable_table_is_a_recoverable_outcome() {
    init_logging();
    let engine = Arc::new(MemoryEngine::new());
    engine.set_table_present(false);
    let ledger = ledger_over(&engine, 0);

    let err = ledger.save(gtid(SID_A, 1)).unwrap_err();
    assert!(err.is_recoverable());

    // Once the table shows up the same ledger serves appends.
    engine.set_table_present(true);
    ledger.save(gtid(SID_A, 1)).unwrap();
    ledger.shutdown().unwrap();
}
