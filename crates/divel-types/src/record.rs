use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evidence::{FileType, UploaderRole};
use crate::fingerprint::Fingerprint;
use crate::identity::{CaseId, EvidenceId, RecordId};

/// Which backend actually anchored a record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Persisted only in the local append-only log.
    Local,
    /// Additionally anchored on the external ledger under `tx_id`.
    Chain { tx_id: String },
}

impl Provenance {
    pub fn is_chain(&self) -> bool {
        matches!(self, Self::Chain { .. })
    }

    /// Transaction id for chain-anchored records.
    pub fn tx_id(&self) -> Option<&str> {
        match self {
            Self::Local => None,
            Self::Chain { tx_id } => Some(tx_id),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "locally anchored"),
            Self::Chain { tx_id } => write!(f, "chain anchored ({tx_id})"),
        }
    }
}

/// What the ingestion path hands to the ledger for one evidence item.
///
/// Sequence, previous hash, and timestamp are absent: the
/// ledger assigns them at write time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSubmission {
    pub case_id: CaseId,
    pub evidence_id: EvidenceId,
    pub hash: Fingerprint,
    pub file_type: FileType,
    pub uploader_role: UploaderRole,
}

impl EvidenceSubmission {
    pub fn new(
        case_id: CaseId,
        evidence_id: EvidenceId,
        hash: Fingerprint,
        file_type: FileType,
        uploader_role: UploaderRole,
    ) -> Self {
        Self {
            case_id,
            evidence_id,
            hash,
            file_type,
            uploader_role,
        }
    }
}

/// One ledgered evidence fingerprint, linked into its case's hash chain.
///
/// Created exactly once by the ledger. The only field that ever changes
/// after the write is `provenance`, upgraded from `Local` to `Chain` when
/// the external anchor confirms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub record_id: RecordId,
    pub case_id: CaseId,
    pub evidence_id: EvidenceId,
    pub hash: Fingerprint,
    pub file_type: FileType,
    pub uploader_role: UploaderRole,
    /// Hash of the preceding record in the case, or [`Fingerprint::genesis`].
    pub previous_hash: Fingerprint,
    /// 1-based position within the case chain.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub provenance: Provenance,
}

impl FingerprintRecord {
    /// Returns `true` if this is the first record of its case.
    pub fn is_genesis(&self) -> bool {
        self.sequence == 1
    }

    /// The receipt handed back to the submitter for this record.
    pub fn receipt(&self) -> AppendReceipt {
        AppendReceipt {
            record_id: self.record_id,
            case_id: self.case_id.clone(),
            evidence_id: self.evidence_id.clone(),
            sequence: self.sequence,
            hash: self.hash,
            previous_hash: self.previous_hash,
            timestamp: self.timestamp,
            provenance: self.provenance.clone(),
        }
    }
}

/// Result of a successful append.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReceipt {
    pub record_id: RecordId,
    pub case_id: CaseId,
    pub evidence_id: EvidenceId,
    pub sequence: u64,
    pub hash: Fingerprint,
    pub previous_hash: Fingerprint,
    pub timestamp: DateTime<Utc>,
    pub provenance: Provenance,
}

impl fmt::Display for AppendReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} [{}] {}",
            self.case_id,
            self.sequence,
            self.hash.short_hex(),
            self.provenance
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FingerprintRecord {
        FingerprintRecord {
            record_id: RecordId::new(),
            case_id: CaseId::new("C1").unwrap(),
            evidence_id: EvidenceId::new("E1").unwrap(),
            hash: Fingerprint::from_digest([0xaa; 32]),
            file_type: FileType::Video,
            uploader_role: UploaderRole::Police,
            previous_hash: Fingerprint::genesis(),
            sequence: 1,
            timestamp: Utc::now(),
            provenance: Provenance::Local,
        }
    }

    #[test]
    fn receipt_mirrors_record() {
        let rec = record();
        let receipt = rec.receipt();
        assert_eq!(receipt.record_id, rec.record_id);
        assert_eq!(receipt.sequence, 1);
        assert_eq!(receipt.previous_hash, Fingerprint::genesis());
        assert!(rec.is_genesis());
    }

    #[test]
    fn receipt_display() {
        let display = record().receipt().to_string();
        assert!(display.starts_with("C1#1 [aaaaaaaa]"));
        assert!(display.contains("locally anchored"));
    }

    #[test]
    fn provenance_accessors() {
        let chain = Provenance::Chain {
            tx_id: "0xabc".into(),
        };
        assert!(chain.is_chain());
        assert_eq!(chain.tx_id(), Some("0xabc"));
        assert_eq!(Provenance::Local.tx_id(), None);
    }

    #[test]
    fn record_json_roundtrip() {
        let rec = record();
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"provenance\":\"local\""));
        let parsed: FingerprintRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rec);
    }
}
