use std::fmt;

use chrono::{DateTime, Utc};
use divel_ledger::AnchorCheck;
use divel_types::{
    CaseId, EvidenceId, FileType, Fingerprint, FingerprintRecord, Provenance, RecordId,
    UploaderRole,
};
use serde::{Deserialize, Serialize};

/// Why a ledgered evidence item failed verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TamperReason {
    /// The presented content does not hash to the ledgered fingerprint.
    ContentMismatch,
    /// The case chain is broken at or before this record.
    ChainBroken { at_sequence: u64 },
    /// The external anchor disagrees with the ledger. `anchored` is `None`
    /// when the anchor has no entry at all.
    AnchorMismatch { anchored: Option<Fingerprint> },
}

impl fmt::Display for TamperReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentMismatch => f.write_str("content does not match the ledgered fingerprint"),
            Self::ChainBroken { at_sequence } => {
                write!(f, "chain of custody broken at sequence {at_sequence}")
            }
            Self::AnchorMismatch {
                anchored: Some(hash),
            } => write!(f, "external anchor holds {}", hash.short_hex()),
            Self::AnchorMismatch { anchored: None } => {
                f.write_str("external anchor has no entry for this evidence")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Tampered(TamperReason),
    NotFound,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "VERIFIED",
            Self::Tampered(_) => "TAMPERED",
            Self::NotFound => "NOT_FOUND",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tampered(reason) => write!(f, "TAMPERED ({reason})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Audit details of the ledgered record a verdict was reached against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDiagnostics {
    pub record_id: RecordId,
    pub case_id: CaseId,
    pub sequence: u64,
    pub stored_hash: Fingerprint,
    pub file_type: FileType,
    pub uploader_role: UploaderRole,
    pub timestamp: DateTime<Utc>,
    pub provenance: Provenance,
    /// Result of the external anchor cross-check, when it ran.
    pub anchor: Option<AnchorCheck>,
}

impl RecordDiagnostics {
    pub(crate) fn from_record(record: &FingerprintRecord) -> Self {
        Self {
            record_id: record.record_id,
            case_id: record.case_id.clone(),
            sequence: record.sequence,
            stored_hash: record.hash,
            file_type: record.file_type,
            uploader_role: record.uploader_role.clone(),
            timestamp: record.timestamp,
            provenance: record.provenance.clone(),
            anchor: None,
        }
    }
}

/// Outcome of verifying one evidence item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub evidence_id: EvidenceId,
    pub computed_hash: Fingerprint,
    #[serde(flatten)]
    pub status: VerificationStatus,
    /// Absent only for `NotFound`.
    pub record: Option<RecordDiagnostics>,
}

impl VerificationVerdict {
    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }

    pub fn is_tampered(&self) -> bool {
        matches!(self.status, VerificationStatus::Tampered(_))
    }

    pub fn tamper_reason(&self) -> Option<&TamperReason> {
        match &self.status {
            VerificationStatus::Tampered(reason) => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels() {
        assert_eq!(VerificationStatus::Verified.to_string(), "VERIFIED");
        assert_eq!(VerificationStatus::NotFound.to_string(), "NOT_FOUND");
        let tampered = VerificationStatus::Tampered(TamperReason::ChainBroken { at_sequence: 3 });
        assert_eq!(
            tampered.to_string(),
            "TAMPERED (chain of custody broken at sequence 3)"
        );
    }

    #[test]
    fn not_found_verdict_json_shape() {
        let verdict = VerificationVerdict {
            evidence_id: EvidenceId::new("E1").unwrap(),
            computed_hash: Fingerprint::genesis(),
            status: VerificationStatus::NotFound,
            record: None,
        };
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["status"], "not_found");
        assert_eq!(json["evidence_id"], "E1");
        assert!(json["record"].is_null());
    }

    #[test]
    fn tampered_verdict_json_shape() {
        let verdict = VerificationVerdict {
            evidence_id: EvidenceId::new("E1").unwrap(),
            computed_hash: Fingerprint::genesis(),
            status: VerificationStatus::Tampered(TamperReason::ContentMismatch),
            record: None,
        };
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["status"], "tampered");
        assert_eq!(json["reason"]["kind"], "content_mismatch");
        assert!(verdict.is_tampered());
        assert_eq!(verdict.tamper_reason(), Some(&TamperReason::ContentMismatch));
    }
}
