//! Ledger configuration.

/// Default append count between automatic compaction signals.
pub const DEFAULT_COMPRESSION_PERIOD: u64 = 1000;

/// Tunables for the persistor.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Number of successful appends between compaction signals.
    /// Zero disables automatic compaction entirely.
    pub compression_period: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            compression_period: DEFAULT_COMPRESSION_PERIOD,
        }
    }
}
