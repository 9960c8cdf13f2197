use std::sync::Arc;

use divel_crypto::Fingerprinter;
use divel_ledger::{AnchorCheck, ChainOfCustody, LedgerError, LedgerResult, LedgerStore};
use divel_types::{EvidenceId, Fingerprint};
use tracing::{debug, warn};

use crate::verdict::{RecordDiagnostics, TamperReason, VerificationStatus, VerificationVerdict};

/// Compares presented evidence against the ledger.
///
/// Checks run in a fixed order and the first failure decides the verdict:
/// 1. the presented fingerprint equals the stored one
/// 2. the case chain is intact through the record's sequence
/// 3. the external anchor, if any, agrees with the stored fingerprint
///
/// Verification only reads. A mismatch is a verdict, not an error; errors
/// are reserved for a ledger or anchor that cannot answer.
pub struct VerificationEngine<S: LedgerStore + ?Sized> {
    store: Arc<S>,
    custody: ChainOfCustody<S>,
    fingerprinter: Fingerprinter,
}

impl<S: LedgerStore + ?Sized> Clone for VerificationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            custody: self.custody.clone(),
            fingerprinter: self.fingerprinter,
        }
    }
}

impl<S: LedgerStore + ?Sized> VerificationEngine<S> {
    pub fn new(store: Arc<S>, fingerprinter: Fingerprinter) -> Self {
        Self {
            custody: ChainOfCustody::new(Arc::clone(&store)),
            store,
            fingerprinter,
        }
    }

    pub fn fingerprinter(&self) -> Fingerprinter {
        self.fingerprinter
    }

    /// Hash `content` and verify it against the ledger.
    pub async fn verify_bytes(
        &self,
        evidence_id: &EvidenceId,
        content: &[u8],
    ) -> LedgerResult<VerificationVerdict> {
        let computed = self.fingerprinter.fingerprint(content);
        self.verify(evidence_id, computed).await
    }

    /// Verify a freshly computed fingerprint against the ledger.
    pub async fn verify(
        &self,
        evidence_id: &EvidenceId,
        computed_hash: Fingerprint,
    ) -> LedgerResult<VerificationVerdict> {
        let record = match self.store.get(evidence_id).await {
            Ok(record) => record,
            Err(LedgerError::NotFound(_)) => {
                debug!(evidence = %evidence_id, "verification: no record");
                return Ok(VerificationVerdict {
                    evidence_id: evidence_id.clone(),
                    computed_hash,
                    status: VerificationStatus::NotFound,
                    record: None,
                });
            }
            Err(e) => return Err(e),
        };

        let mut diagnostics = RecordDiagnostics::from_record(&record);
        let status = if record.hash != computed_hash {
            VerificationStatus::Tampered(TamperReason::ContentMismatch)
        } else {
            let custody = self.custody.validate(&record.case_id).await?;
            match custody.broken_at_sequence {
                Some(at_sequence) if !custody.is_intact_through(record.sequence) => {
                    VerificationStatus::Tampered(TamperReason::ChainBroken { at_sequence })
                }
                _ => {
                    let anchor = self.store.confirm_anchor(&record).await?;
                    let status = match &anchor {
                        AnchorCheck::Mismatch { anchored } => {
                            VerificationStatus::Tampered(TamperReason::AnchorMismatch {
                                anchored: Some(*anchored),
                            })
                        }
                        AnchorCheck::Missing => {
                            VerificationStatus::Tampered(TamperReason::AnchorMismatch {
                                anchored: None,
                            })
                        }
                        _ => VerificationStatus::Verified,
                    };
                    diagnostics.anchor = Some(anchor);
                    status
                }
            }
        };

        match &status {
            VerificationStatus::Tampered(reason) => warn!(
                evidence = %evidence_id,
                case = %record.case_id,
                sequence = record.sequence,
                %reason,
                "verification failed"
            ),
            _ => debug!(evidence = %evidence_id, case = %record.case_id, "verified"),
        }

        Ok(VerificationVerdict {
            evidence_id: evidence_id.clone(),
            computed_hash,
            status,
            record: Some(diagnostics),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use divel_ledger::{
        ChainLedger, InMemoryAnchor, LocalLedger, LogEntry, RecordLog, SyncMode,
    };
    use divel_types::{
        CaseId, EvidenceSubmission, FileType, Provenance, UploaderRole,
    };

    use super::*;

    const FP: Fingerprinter = Fingerprinter::SHA256;

    fn id(s: &str) -> EvidenceId {
        EvidenceId::new(s).unwrap()
    }

    fn submission(case: &str, ev: &str, content: &[u8]) -> EvidenceSubmission {
        EvidenceSubmission::new(
            CaseId::new(case).unwrap(),
            id(ev),
            FP.fingerprint(content),
            FileType::Video,
            UploaderRole::Police,
        )
    }

    fn local(path: &Path) -> Arc<LocalLedger> {
        Arc::new(LocalLedger::open(path, SyncMode::Flush).unwrap())
    }

    #[tokio::test]
    async fn unknown_evidence_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let engine = VerificationEngine::new(local(&dir.path().join("l.log")), FP);
        let verdict = engine.verify_bytes(&id("ghost"), b"anything").await.unwrap();
        assert_eq!(verdict.status, VerificationStatus::NotFound);
        assert!(verdict.record.is_none());
    }

    #[tokio::test]
    async fn matching_content_is_verified_with_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = local(&dir.path().join("l.log"));
        let receipt = ledger.append(submission("C1", "A", b"bodycam")).await.unwrap();

        let engine = VerificationEngine::new(Arc::clone(&ledger), FP);
        let verdict = engine.verify_bytes(&id("A"), b"bodycam").await.unwrap();
        assert!(verdict.is_verified());

        let diag = verdict.record.unwrap();
        assert_eq!(diag.stored_hash, receipt.hash);
        assert_eq!(diag.provenance, Provenance::Local);
        assert_eq!(diag.uploader_role, UploaderRole::Police);
        assert_eq!(diag.timestamp, receipt.timestamp);
        assert_eq!(diag.anchor, Some(AnchorCheck::NotAnchored));
    }

    #[tokio::test]
    async fn altered_content_is_tampered() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = local(&dir.path().join("l.log"));
        ledger.append(submission("C1", "A", b"original")).await.unwrap();

        let engine = VerificationEngine::new(ledger, FP);
        let verdict = engine.verify_bytes(&id("A"), b"0riginal").await.unwrap();
        assert_eq!(verdict.tamper_reason(), Some(&TamperReason::ContentMismatch));
        assert_eq!(verdict.record.unwrap().stored_hash, FP.fingerprint(b"original"));
    }

    #[tokio::test]
    async fn verify_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = local(&dir.path().join("l.log"));
        ledger.append(submission("C1", "A", b"a")).await.unwrap();
        let engine = VerificationEngine::new(Arc::clone(&ledger), FP);

        let first = engine.verify_bytes(&id("A"), b"a").await.unwrap();
        let second = engine.verify_bytes(&id("A"), b"a").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(ledger.record_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn broken_history_is_tampered_even_when_content_matches() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("original.log");
        {
            let ledger = LocalLedger::open(&original, SyncMode::Flush).unwrap();
            for ev in ["A", "B", "C"] {
                ledger.append(submission("C1", ev, ev.as_bytes())).await.unwrap();
            }
        }

        // Mutate the stored hash of A; the link from B is what breaks.
        let tampered = dir.path().join("tampered.log");
        {
            let (_, entries) = RecordLog::open(&original, SyncMode::Flush).unwrap();
            let (out, _) = RecordLog::open(&tampered, SyncMode::Flush).unwrap();
            for recovered in entries {
                let mut entry = recovered.entry;
                if let LogEntry::Record(record) = &mut entry {
                    if record.sequence == 1 {
                        record.hash = FP.fingerprint(b"forged");
                    }
                }
                out.append(&entry).unwrap();
            }
        }

        let engine = VerificationEngine::new(local(&tampered), FP);

        let b = engine.verify_bytes(&id("B"), b"B").await.unwrap();
        assert_eq!(
            b.tamper_reason(),
            Some(&TamperReason::ChainBroken { at_sequence: 2 })
        );
        let c = engine.verify_bytes(&id("C"), b"C").await.unwrap();
        assert!(c.is_tampered());

        // The forged record itself is consistent with its own link.
        let a = engine.verify_bytes(&id("A"), b"forged").await.unwrap();
        assert!(a.is_verified());
    }

    #[tokio::test]
    async fn fallback_records_verify_locally() {
        let dir = tempfile::tempdir().unwrap();
        let anchor = Arc::new(InMemoryAnchor::new());
        anchor.set_available(false);
        let ledger = Arc::new(ChainLedger::new(
            LocalLedger::open(&dir.path().join("l.log"), SyncMode::Flush).unwrap(),
            anchor.clone(),
            Duration::from_millis(200),
        ));
        let receipt = ledger.append(submission("C1", "A", b"a")).await.unwrap();
        assert_eq!(receipt.provenance, Provenance::Local);

        let engine = VerificationEngine::new(ledger, FP);
        let verdict = engine.verify_bytes(&id("A"), b"a").await.unwrap();
        assert!(verdict.is_verified());
        assert_eq!(verdict.record.unwrap().provenance, Provenance::Local);
    }

    #[tokio::test]
    async fn anchored_records_are_confirmed() {
        let dir = tempfile::tempdir().unwrap();
        let anchor = Arc::new(InMemoryAnchor::new());
        let ledger = Arc::new(ChainLedger::new(
            LocalLedger::open(&dir.path().join("l.log"), SyncMode::Flush).unwrap(),
            anchor.clone(),
            Duration::from_millis(200),
        ));
        ledger.append(submission("C1", "A", b"a")).await.unwrap();

        let engine = VerificationEngine::new(ledger, FP);
        let verdict = engine.verify_bytes(&id("A"), b"a").await.unwrap();
        assert!(verdict.is_verified());
        let diag = verdict.record.unwrap();
        assert!(diag.provenance.is_chain());
        assert_eq!(diag.anchor, Some(AnchorCheck::Confirmed));

        // Once the anchor is unreachable the read fails rather than guessing.
        anchor.set_available(false);
        let err = engine.verify_bytes(&id("A"), b"a").await.unwrap_err();
        assert!(matches!(err, LedgerError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn anchor_unknown_to_backend_is_tampered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l.log");
        {
            let ledger = ChainLedger::new(
                LocalLedger::open(&path, SyncMode::Flush).unwrap(),
                Arc::new(InMemoryAnchor::new()),
                Duration::from_millis(200),
            );
            ledger.append(submission("C1", "A", b"a")).await.unwrap();
        }

        // A fresh backend has never seen the claimed transaction.
        let ledger: Arc<dyn LedgerStore> = Arc::new(ChainLedger::new(
            LocalLedger::open(&path, SyncMode::Flush).unwrap(),
            Arc::new(InMemoryAnchor::new()),
            Duration::from_millis(200),
        ));
        let engine = VerificationEngine::new(ledger, FP);
        let verdict = engine.verify_bytes(&id("A"), b"a").await.unwrap();
        assert_eq!(
            verdict.tamper_reason(),
            Some(&TamperReason::AnchorMismatch { anchored: None })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_verification_during_appends() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = local(&dir.path().join("l.log"));
        ledger.append(submission("C1", "A", b"a")).await.unwrap();
        let engine = VerificationEngine::new(Arc::clone(&ledger), FP);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..32 {
            let ledger = Arc::clone(&ledger);
            let engine = engine.clone();
            tasks.spawn(async move {
                ledger
                    .append(submission("C1", &format!("E{i}"), &[i as u8]))
                    .await
                    .unwrap();
                assert!(engine.verify_bytes(&id("A"), b"a").await.unwrap().is_verified());
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }
        let last = engine.verify_bytes(&id("E31"), &[31]).await.unwrap();
        assert!(last.is_verified());
    }
}
