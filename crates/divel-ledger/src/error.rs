use std::io;

use divel_types::EvidenceId;

/// Errors produced by ledger operations.
///
/// A broken hash chain is not an error here: it is a verification
/// outcome, reported inside a verdict, never raised.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The evidence id already has a record. The ledger is write-once.
    #[error("evidence {0} is already ledgered")]
    DuplicateEvidence(EvidenceId),

    #[error("no record for evidence {0}")]
    NotFound(EvidenceId),

    /// The active backend could not durably persist or answer in time.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The local log failed to replay. Never silently truncated.
    #[error("corrupt ledger log at offset {offset}: {reason}")]
    CorruptLog { offset: u64, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Returns `true` for failures a caller may retry later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
