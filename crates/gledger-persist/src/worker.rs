//! The background compaction worker.
//!
//! A singleton OS thread that sleeps on a condition variable until the
//! persistor's append volume signals it, then runs one compaction pass.
//! The mutex of the coordination triple doubles as the compaction lock:
//! `compress` and `reset` take it, so at most one of them runs at a time
//! and the worker's terminate flag is always consistent with them.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use gledger_error::{LedgerError, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::persistor::GtidPersistor;

/// The `{mutex, condvar, terminate flag}` triple coordinating the worker
/// with the persistor.
pub struct CompressSync {
    terminate: Mutex<bool>,
    cond: Condvar,
}

impl CompressSync {
    /// A fresh triple with the terminate flag clear.
    #[must_use]
    pub fn new() -> Self {
        Self {
            terminate: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Take the compaction lock. The guard derefs to the terminate flag.
    pub(crate) fn lock(&self) -> MutexGuard<'_, bool> {
        self.terminate.lock()
    }

    /// Wake the worker. Called without the lock held; the worker re-checks
    /// its predicate on every wake, so spurious or early signals are
    /// harmless.
    pub(crate) fn signal(&self) {
        self.cond.notify_one();
    }

    fn wait(&self, guard: &mut MutexGuard<'_, bool>) {
        self.cond.wait(guard);
    }

    fn request_terminate(&self) {
        let mut terminate = self.terminate.lock();
        *terminate = true;
        drop(terminate);
        self.cond.notify_one();
    }
}

impl Default for CompressSync {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner of the background compaction thread.
pub struct CompressionWorker {
    thread: Option<JoinHandle<()>>,
    sync: Arc<CompressSync>,
}

impl CompressionWorker {
    /// Spawn the singleton worker for `persistor`.
    pub fn spawn(persistor: Arc<GtidPersistor>) -> Result<Self> {
        let sync = Arc::clone(persistor.compress_sync());
        let thread = thread::Builder::new()
            .name("gledger-compressor".to_owned())
            .spawn(move || Self::run(&persistor))?;
        Ok(Self {
            thread: Some(thread),
            sync,
        })
    }

    /// Worker loop: Suspended → Running → Terminating.
    ///
    /// Waits with the lock held, re-checks the terminate flag on every
    /// wake, releases the lock, and invokes compaction. Failures are
    /// logged and swallowed; the worker never exits on a compaction error.
    fn run(persistor: &GtidPersistor) {
        let sync = Arc::clone(persistor.compress_sync());
        let mut terminate = sync.lock();
        loop {
            if *terminate {
                break;
            }
            sync.wait(&mut terminate);
            if *terminate {
                break;
            }
            drop(terminate);
            match persistor.compress(None) {
                Ok(outcome) => debug!(
                    rows_merged = outcome.rows_merged,
                    complete = outcome.complete,
                    "background compaction pass finished"
                ),
                Err(error) => warn!(%error, "background compaction failed"),
            }
            terminate = sync.lock();
        }
        drop(terminate);
        debug!("compression worker terminating");
    }

    /// Set the terminate flag, wake the worker, and join it. The join is
    /// the single source of truth for worker termination.
    pub fn terminate(mut self) -> Result<()> {
        self.sync.request_terminate();
        if let Some(handle) = self.thread.take() {
            handle
                .join()
                .map_err(|_| LedgerError::storage("compression worker panicked"))?;
        }
        Ok(())
    }
}

impl Drop for CompressionWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.thread.take() {
            self.sync.request_terminate();
            let _ = handle.join();
        }
    }
}
