use async_trait::async_trait;
use divel_types::{
    AppendReceipt, CaseId, EvidenceId, EvidenceSubmission, Fingerprint, FingerprintRecord,
    Provenance,
};
use serde::{Deserialize, Serialize};

use crate::error::LedgerResult;

/// Outcome of cross-checking a record against its external anchor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorCheck {
    /// The record was only ever anchored locally.
    NotAnchored,
    /// The external anchor holds the same fingerprint.
    Confirmed,
    /// The external anchor holds a different fingerprint.
    Mismatch { anchored: Fingerprint },
    /// The record claims an anchor the backend does not know.
    Missing,
    /// The record claims an anchor but this ledger has no backend to ask.
    Unchecked,
}

impl AnchorCheck {
    /// Returns `true` if the anchor contradicts the local record.
    pub fn is_contradiction(&self) -> bool {
        matches!(self, Self::Mismatch { .. } | Self::Missing)
    }
}

/// The ledger contract. Callers depend on this trait only; whether a
/// record lands in the local log alone or is also anchored externally is
/// reported through [`Provenance`], never hidden.
///
/// All implementations must satisfy these invariants:
/// - Write-once: a second append for an evidence id fails with
///   `DuplicateEvidence` and leaves the first record untouched.
/// - Within a case, sequences are contiguous from 1 and every record links
///   to its predecessor's hash (the first links to the genesis sentinel).
/// - Sequence, previous hash, and timestamp are assigned by the ledger.
/// - Readers never observe a partially written record.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Durably record a fingerprint and link it into its case chain.
    async fn append(&self, submission: EvidenceSubmission) -> LedgerResult<AppendReceipt>;

    /// Fetch the record for an evidence id, or `NotFound`.
    async fn get(&self, evidence_id: &EvidenceId) -> LedgerResult<FingerprintRecord>;

    /// All records of a case in ascending sequence order. Empty for an
    /// unknown case.
    async fn chain(&self, case_id: &CaseId) -> LedgerResult<Vec<FingerprintRecord>>;

    /// Every case with at least one record, sorted.
    async fn cases(&self) -> LedgerResult<Vec<CaseId>>;

    /// Cross-check a record against its external anchor.
    ///
    /// Ledgers without an anchoring backend cannot confirm anything.
    async fn confirm_anchor(&self, record: &FingerprintRecord) -> LedgerResult<AnchorCheck> {
        Ok(match record.provenance {
            Provenance::Local => AnchorCheck::NotAnchored,
            Provenance::Chain { .. } => AnchorCheck::Unchecked,
        })
    }

    /// Short name of the active backend, for logs and health output.
    fn backend_name(&self) -> &'static str;
}
