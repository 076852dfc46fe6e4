//! Error types callers match on.

use thiserror::Error;

/// Failures of the persistence store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A referenced record does not exist.
    #[error("{kind} {id} not found")]
    MissingRecord { kind: &'static str, id: String },

    /// A uniqueness rule was violated (e.g. duplicate RUC).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn missing(kind: &'static str, id: impl ToString) -> Self {
        Self::MissingRecord {
            kind,
            id: id.to_string(),
        }
    }
}

/// Failures that terminate a sweep before or outside the per-supplier
/// loop. Per-supplier faults never surface here — they classify that
/// supplier's outcome as `error` and the sweep continues.
#[derive(Error, Debug)]
pub enum SweepError {
    /// The requested process does not exist; no Sweep record is created.
    #[error("process {0} not found")]
    ProcessNotFound(i64),

    /// The process's category has no suppliers; no Sweep record is created.
    #[error("no suppliers registered in this process's category")]
    EmptySupplierSet,

    /// Store failure while creating or finalizing the Sweep record.
    #[error("sweep persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// The event sink went away; emission stops but the Sweep record is
    /// still finalized.
    #[error("event sink disconnected")]
    SinkClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            SweepError::ProcessNotFound(42).to_string(),
            "process 42 not found"
        );
        assert_eq!(
            StoreError::missing("supplier", "179").to_string(),
            "supplier 179 not found"
        );
    }
}
