use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use divel_crypto::ChainVerifier;
use divel_types::{
    AppendReceipt, CaseId, EvidenceId, EvidenceSubmission, FingerprintRecord, Provenance,
    RecordId,
};
use tracing::{debug, info};

use crate::config::{LedgerConfig, SyncMode};
use crate::error::{LedgerError, LedgerResult};
use crate::locks::{CaseGuard, CaseLocks};
use crate::log::{LogEntry, RecordLog, RecoveredEntry};
use crate::traits::LedgerStore;

/// Ledger backed by a durable local append-only log.
///
/// Records live in the [`RecordLog`]; the in-memory index is rebuilt from
/// it on open and is never the source of truth. Log writes run on the
/// blocking pool and update the index in the same task, so an append that
/// reached the log is indexed even if its caller goes away.
pub struct LocalLedger {
    log: Arc<RecordLog>,
    index: Arc<RwLock<LedgerIndex>>,
    locks: CaseLocks,
}

#[derive(Default)]
struct LedgerIndex {
    cases: HashMap<CaseId, Vec<FingerprintRecord>>,
    by_evidence: HashMap<EvidenceId, (CaseId, usize)>,
    /// Evidence ids with an append in flight.
    reserved: HashSet<EvidenceId>,
}

impl LedgerIndex {
    fn record(&self, evidence_id: &EvidenceId) -> Option<&FingerprintRecord> {
        let (case_id, index) = self.by_evidence.get(evidence_id)?;
        self.cases.get(case_id)?.get(*index)
    }

    fn record_mut(&mut self, evidence_id: &EvidenceId) -> Option<&mut FingerprintRecord> {
        let (case_id, index) = self.by_evidence.get(evidence_id)?;
        self.cases.get_mut(case_id)?.get_mut(*index)
    }

    fn insert(&mut self, record: FingerprintRecord) {
        let stream = self.cases.entry(record.case_id.clone()).or_default();
        self.by_evidence.insert(
            record.evidence_id.clone(),
            (record.case_id.clone(), stream.len()),
        );
        stream.push(record);
    }

    /// Rebuild from the log verbatim. Chain links are not checked here:
    /// history mutated out of band must stay visible to validation.
    fn replay(entries: Vec<RecoveredEntry>) -> LedgerResult<Self> {
        let mut index = Self::default();
        for RecoveredEntry { offset, entry } in entries {
            match entry {
                LogEntry::Record(record) => {
                    if index.by_evidence.contains_key(&record.evidence_id) {
                        return Err(LedgerError::CorruptLog {
                            offset,
                            reason: format!("duplicate record for evidence {}", record.evidence_id),
                        });
                    }
                    index.insert(record);
                }
                LogEntry::Anchored { evidence_id, tx_id } => {
                    let record = index.record_mut(&evidence_id).ok_or_else(|| {
                        LedgerError::CorruptLog {
                            offset,
                            reason: format!("anchor for unknown evidence {evidence_id}"),
                        }
                    })?;
                    record.provenance = Provenance::Chain { tx_id };
                }
            }
        }
        Ok(index)
    }
}

/// Claim on an evidence id while its append is in flight.
///
/// Released on drop unless the append committed, so a failed or
/// cancelled append never leaves the id blocked.
pub(crate) struct Reservation {
    index: Arc<RwLock<LedgerIndex>>,
    evidence_id: EvidenceId,
    armed: bool,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            self.index
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .reserved
                .remove(&self.evidence_id);
        }
    }
}

impl LocalLedger {
    /// Open (or create) a ledger at `path`, replaying its log.
    pub fn open(path: &Path, sync_mode: SyncMode) -> LedgerResult<Self> {
        let (log, entries) = RecordLog::open(path, sync_mode)?;
        let index = LedgerIndex::replay(entries)?;

        info!(
            path = %path.display(),
            cases = index.cases.len(),
            records = index.by_evidence.len(),
            "local ledger opened"
        );

        Ok(Self {
            log: Arc::new(log),
            index: Arc::new(RwLock::new(index)),
            locks: CaseLocks::new(),
        })
    }

    pub fn from_config(config: &LedgerConfig) -> LedgerResult<Self> {
        Self::open(&config.log_path, config.sync_mode)
    }

    pub fn path(&self) -> &Path {
        self.log.path()
    }

    /// Total number of records across all cases.
    pub fn record_count(&self) -> LedgerResult<usize> {
        Ok(read_index(&self.index)?.by_evidence.len())
    }

    pub(crate) fn locks(&self) -> &CaseLocks {
        &self.locks
    }

    #[cfg(test)]
    pub(crate) fn log(&self) -> Arc<RecordLog> {
        Arc::clone(&self.log)
    }

    /// Claim `evidence_id` for an append, rejecting ids that are ledgered
    /// or already being appended.
    pub(crate) fn reserve(&self, evidence_id: &EvidenceId) -> LedgerResult<Reservation> {
        let mut index = write_index(&self.index)?;
        if index.by_evidence.contains_key(evidence_id) || index.reserved.contains(evidence_id) {
            return Err(LedgerError::DuplicateEvidence(evidence_id.clone()));
        }
        index.reserved.insert(evidence_id.clone());
        Ok(Reservation {
            index: Arc::clone(&self.index),
            evidence_id: evidence_id.clone(),
            armed: true,
        })
    }

    /// Build, persist, and index the record for `submission`.
    ///
    /// `case` must guard `submission.case_id`; it keeps the chain position
    /// stable between reading it and indexing the new record.
    pub(crate) async fn commit(
        &self,
        case: &mut CaseGuard<'_>,
        submission: EvidenceSubmission,
        reservation: Reservation,
    ) -> LedgerResult<FingerprintRecord> {
        debug_assert_eq!(case.case_id(), &submission.case_id);
        let log = Arc::clone(&self.log);
        let index = Arc::clone(&self.index);
        case.run_blocking(move || write_record(&log, &index, submission, reservation))
            .await
            .map_err(writer_lost)?
    }

    /// Persist an external anchor for an already committed record.
    pub(crate) async fn mark_anchored(
        &self,
        evidence_id: &EvidenceId,
        tx_id: String,
    ) -> LedgerResult<FingerprintRecord> {
        if read_index(&self.index)?.record(evidence_id).is_none() {
            return Err(LedgerError::NotFound(evidence_id.clone()));
        }

        let log = Arc::clone(&self.log);
        let index = Arc::clone(&self.index);
        let evidence_id = evidence_id.clone();
        tokio::task::spawn_blocking(move || -> LedgerResult<FingerprintRecord> {
            log.append(&LogEntry::Anchored {
                evidence_id: evidence_id.clone(),
                tx_id: tx_id.clone(),
            })
            .map_err(into_unavailable)?;

            let mut index = write_index(&index)?;
            let record = index
                .record_mut(&evidence_id)
                .ok_or_else(|| LedgerError::NotFound(evidence_id.clone()))?;
            record.provenance = Provenance::Chain { tx_id };
            Ok(record.clone())
        })
        .await
        .map_err(writer_lost)?
    }
}

fn write_record(
    log: &RecordLog,
    index: &RwLock<LedgerIndex>,
    submission: EvidenceSubmission,
    mut reservation: Reservation,
) -> LedgerResult<FingerprintRecord> {
    let (sequence, previous_hash) = {
        let index = read_index(index)?;
        let stream = index
            .cases
            .get(&submission.case_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let sequence = stream.last().map(|r| r.sequence + 1).unwrap_or(1);
        (sequence, ChainVerifier::next_previous_hash(stream))
    };

    let record = FingerprintRecord {
        record_id: RecordId::new(),
        case_id: submission.case_id,
        evidence_id: submission.evidence_id,
        hash: submission.hash,
        file_type: submission.file_type,
        uploader_role: submission.uploader_role,
        previous_hash,
        sequence,
        timestamp: Utc::now(),
        provenance: Provenance::Local,
    };

    log.append(&LogEntry::Record(record.clone()))
        .map_err(into_unavailable)?;

    let mut index = write_index(index)?;
    index.reserved.remove(&record.evidence_id);
    reservation.armed = false;
    index.insert(record.clone());

    debug!(
        case = %record.case_id,
        evidence = %record.evidence_id,
        sequence,
        "record committed"
    );
    Ok(record)
}

fn read_index(index: &RwLock<LedgerIndex>) -> LedgerResult<RwLockReadGuard<'_, LedgerIndex>> {
    index
        .read()
        .map_err(|_| LedgerError::LockPoisoned("ledger index"))
}

fn write_index(index: &RwLock<LedgerIndex>) -> LedgerResult<RwLockWriteGuard<'_, LedgerIndex>> {
    index
        .write()
        .map_err(|_| LedgerError::LockPoisoned("ledger index"))
}

/// A write the local log could not make durable is a storage outage to
/// the caller.
fn into_unavailable(err: LedgerError) -> LedgerError {
    match err {
        LedgerError::Io(e) => LedgerError::BackendUnavailable(format!("local log write failed: {e}")),
        other => other,
    }
}

fn writer_lost(err: tokio::task::JoinError) -> LedgerError {
    LedgerError::BackendUnavailable(format!("local log writer task failed: {err}"))
}

#[async_trait]
impl LedgerStore for LocalLedger {
    async fn append(&self, submission: EvidenceSubmission) -> LedgerResult<AppendReceipt> {
        let mut case = self.locks.acquire(&submission.case_id).await;
        let reservation = self.reserve(&submission.evidence_id)?;
        let record = self.commit(&mut case, submission, reservation).await?;
        Ok(record.receipt())
    }

    async fn get(&self, evidence_id: &EvidenceId) -> LedgerResult<FingerprintRecord> {
        read_index(&self.index)?
            .record(evidence_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(evidence_id.clone()))
    }

    async fn chain(&self, case_id: &CaseId) -> LedgerResult<Vec<FingerprintRecord>> {
        Ok(read_index(&self.index)?.cases.get(case_id).cloned().unwrap_or_default())
    }

    async fn cases(&self) -> LedgerResult<Vec<CaseId>> {
        let mut cases: Vec<CaseId> = read_index(&self.index)?.cases.keys().cloned().collect();
        cases.sort();
        Ok(cases)
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
