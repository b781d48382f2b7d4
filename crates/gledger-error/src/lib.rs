//! Error taxonomy shared by the ledger crates.

use gledger_types::MalformedSid;
use gledger_types::set::MalformedInterval;
use thiserror::Error;

/// Primary error type for ledger operations.
///
/// Every operation resolves to one of three outcomes: success, the single
/// recoverable failure ([`LedgerError::TableUnavailable`]), or a hard
/// failure. [`LedgerError::is_recoverable`] encodes that split.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The ledger table cannot be opened; the ledger is not ready.
    #[error("ledger table is not ready to be used")]
    TableUnavailable,

    /// The ledger table has fewer columns than the persistor requires.
    #[error("ledger table column count mismatch: expected at least {expected}, found {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    /// A source id text form could not be parsed.
    #[error(transparent)]
    MalformedSid(#[from] MalformedSid),

    /// A row text form could not be parsed into an interval.
    #[error(transparent)]
    MalformedInterval(#[from] MalformedInterval),

    /// A field value did not fit its ledger column.
    #[error("value too long for ledger column {column}")]
    RowTooLong { column: usize },

    /// Any non-success reported by the storage layer.
    #[error("storage error: {detail}")]
    Storage { detail: String },

    /// Thread-level I/O failure (worker spawn).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Build a storage error from a detail message.
    pub fn storage(detail: impl Into<String>) -> Self {
        Self::Storage {
            detail: detail.into(),
        }
    }

    /// Whether the caller may treat this failure as transient and retry
    /// later. Only an unavailable table qualifies; everything else is hard.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::TableUnavailable)
    }
}

/// Result type alias using [`LedgerError`].
pub type Result<T> = std::result::Result<T, LedgerError>;
