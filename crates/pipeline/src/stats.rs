use phone_matcher_protocol::MatchOutput;
use serde::{Deserialize, Serialize};

/// Statistics about one ingestion call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Rows pulled from the stream
    pub rows_read: usize,

    /// Rows whose phone normalized
    pub accepted: usize,

    /// Rows dropped by normalization
    pub rejected: usize,

    /// Registry rows that changed state
    pub affected: u64,

    /// Buffer flushes performed
    pub flushes: usize,

    /// Time taken in milliseconds
    pub elapsed_ms: u64,
}

impl IngestReport {
    pub(crate) fn record(&mut self, accepted: bool) {
        self.rows_read += 1;
        if accepted {
            self.accepted += 1;
        } else {
            self.rejected += 1;
        }
    }
}

/// Outcome of one match call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReport {
    pub rows_read: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub flushes: usize,
    pub elapsed_ms: u64,
    pub output: MatchOutput,
}

impl MatchReport {
    /// Phones absent from the registry.
    #[must_use]
    pub fn unmatched(&self) -> usize {
        self.output.len()
    }
}
