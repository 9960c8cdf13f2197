use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use divel_types::{AppendReceipt, CaseId, EvidenceId, EvidenceSubmission, FingerprintRecord, Provenance};
use tracing::{info, warn};

use crate::anchor::AnchoringBackend;
use crate::error::{LedgerError, LedgerResult};
use crate::local::LocalLedger;
use crate::traits::{AnchorCheck, LedgerStore};

/// Ledger that anchors every record in an external backend, falling back
/// to local-only anchoring when the backend fails or times out.
///
/// The local log is always written first, so an acknowledged record
/// survives a crash regardless of the anchor's fate. A successful anchor
/// is recorded afterwards and surfaces as [`Provenance::Chain`].
pub struct ChainLedger {
    local: LocalLedger,
    backend: Arc<dyn AnchoringBackend>,
    timeout: Duration,
}

impl ChainLedger {
    pub fn new(local: LocalLedger, backend: Arc<dyn AnchoringBackend>, timeout: Duration) -> Self {
        Self {
            local,
            backend,
            timeout,
        }
    }

    /// The underlying local ledger.
    pub fn local(&self) -> &LocalLedger {
        &self.local
    }

    async fn anchor(&self, record: &FingerprintRecord) -> Result<String, String> {
        let submit = self
            .backend
            .submit(&record.case_id, &record.evidence_id, &record.hash);
        match tokio::time::timeout(self.timeout, submit).await {
            Ok(Ok(tx_id)) => Ok(tx_id),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.timeout)),
        }
    }
}

#[async_trait]
impl LedgerStore for ChainLedger {
    async fn append(&self, submission: EvidenceSubmission) -> LedgerResult<AppendReceipt> {
        // The case lock spans the anchor round-trip so the next record in
        // this case sees the final provenance of its predecessor.
        let mut case = self.local.locks().acquire(&submission.case_id).await;
        let reservation = self.local.reserve(&submission.evidence_id)?;
        let record = self.local.commit(&mut case, submission, reservation).await?;

        // From here on the record is durable, so every outcome is a receipt.
        let tx_id = match self.anchor(&record).await {
            Ok(tx_id) => tx_id,
            Err(reason) => {
                warn!(
                    case = %record.case_id,
                    evidence = %record.evidence_id,
                    backend = self.backend.name(),
                    %reason,
                    "anchoring failed; record kept with local provenance"
                );
                return Ok(record.receipt());
            }
        };

        match self.local.mark_anchored(&record.evidence_id, tx_id.clone()).await {
            Ok(anchored) => {
                info!(
                    case = %anchored.case_id,
                    evidence = %anchored.evidence_id,
                    backend = self.backend.name(),
                    "fingerprint anchored"
                );
                Ok(anchored.receipt())
            }
            Err(e) => {
                warn!(
                    case = %record.case_id,
                    evidence = %record.evidence_id,
                    backend = self.backend.name(),
                    tx = %tx_id,
                    error = %e,
                    "anchor accepted but not recorded locally; record kept with local provenance"
                );
                Ok(record.receipt())
            }
        }
    }

    async fn get(&self, evidence_id: &EvidenceId) -> LedgerResult<FingerprintRecord> {
        self.local.get(evidence_id).await
    }

    async fn chain(&self, case_id: &CaseId) -> LedgerResult<Vec<FingerprintRecord>> {
        self.local.chain(case_id).await
    }

    async fn cases(&self) -> LedgerResult<Vec<CaseId>> {
        self.local.cases().await
    }

    async fn confirm_anchor(&self, record: &FingerprintRecord) -> LedgerResult<AnchorCheck> {
        if record.provenance == Provenance::Local {
            return Ok(AnchorCheck::NotAnchored);
        }

        let lookup = self.backend.lookup(&record.evidence_id);
        let anchored = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(anchored)) => anchored,
            Ok(Err(e)) => return Err(LedgerError::BackendUnavailable(e.to_string())),
            Err(_) => {
                return Err(LedgerError::BackendUnavailable(format!(
                    "anchor lookup timed out after {:?}",
                    self.timeout
                )))
            }
        };

        Ok(match anchored {
            Some(hash) if hash == record.hash => AnchorCheck::Confirmed,
            Some(hash) => AnchorCheck::Mismatch { anchored: hash },
            None => AnchorCheck::Missing,
        })
    }

    fn backend_name(&self) -> &'static str {
        "chain"
    }
}
