use std::sync::Arc;

use divel_crypto::ChainVerifier;
use divel_types::{CaseId, FingerprintRecord};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LedgerResult;
use crate::traits::LedgerStore;

/// Result of validating one case's hash chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub case_id: CaseId,
    pub record_count: u64,
    pub valid: bool,
    /// Position of the first record whose link claim fails.
    pub broken_at_sequence: Option<u64>,
}

impl ValidationResult {
    /// Returns `true` if every link up to and including `sequence` holds.
    pub fn is_intact_through(&self, sequence: u64) -> bool {
        match self.broken_at_sequence {
            None => true,
            Some(broken) => sequence < broken,
        }
    }
}

/// Read-only chain-of-custody validator over a ledger.
///
/// Holds no state of its own; every call re-reads the case chain from the
/// store, so validation can be re-run at any time.
pub struct ChainOfCustody<S: LedgerStore + ?Sized> {
    store: Arc<S>,
}

impl<S: LedgerStore + ?Sized> Clone for ChainOfCustody<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore + ?Sized> ChainOfCustody<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Validate the hash chain of `case_id`. An unknown case is an empty,
    /// valid chain.
    pub async fn validate(&self, case_id: &CaseId) -> LedgerResult<ValidationResult> {
        let records = self.store.chain(case_id).await?;
        let result = Self::validate_records(case_id, &records);
        if let Some(at) = result.broken_at_sequence {
            warn!(case = %case_id, broken_at = at, "chain of custody broken");
        }
        Ok(result)
    }

    /// Validate every case in the ledger.
    pub async fn validate_all(&self) -> LedgerResult<Vec<ValidationResult>> {
        let mut results = Vec::new();
        for case_id in self.store.cases().await? {
            results.push(self.validate(&case_id).await?);
        }
        Ok(results)
    }

    /// Validate an already fetched chain.
    pub fn validate_records(case_id: &CaseId, records: &[FingerprintRecord]) -> ValidationResult {
        let broken_at_sequence = ChainVerifier::first_break(records);
        ValidationResult {
            case_id: case_id.clone(),
            record_count: records.len() as u64,
            valid: broken_at_sequence.is_none(),
            broken_at_sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::config::SyncMode;
    use crate::local::LocalLedger;
    use crate::testing::{case, rewrite_log, submission, temp_ledger};
    use crate::LogEntry;
    use divel_types::Fingerprint;

    #[tokio::test]
    async fn two_record_scenario_is_valid() {
        let (_dir, ledger) = temp_ledger();
        let ledger = Arc::new(ledger);
        ledger.append(submission("C1", "A", b"h1")).await.unwrap();
        ledger.append(submission("C1", "B", b"h2")).await.unwrap();

        let custody = ChainOfCustody::new(ledger);
        let result = custody.validate(&case("C1")).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.record_count, 2);
        assert_eq!(result.broken_at_sequence, None);
        assert!(result.is_intact_through(2));
    }

    #[tokio::test]
    async fn unknown_case_is_empty_and_valid() {
        let (_dir, ledger) = temp_ledger();
        let custody = ChainOfCustody::new(Arc::new(ledger));
        let result = custody.validate(&case("nothing")).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.record_count, 0);
    }

    #[tokio::test]
    async fn tampered_hash_breaks_the_following_link() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("original.log");
        {
            let ledger = LocalLedger::open(&original, SyncMode::Flush).unwrap();
            for (ev, content) in [("A", "a"), ("B", "b"), ("C", "c"), ("D", "d")] {
                ledger
                    .append(submission("C1", ev, content.as_bytes()))
                    .await
                    .unwrap();
            }
        }

        let tampered = dir.path().join("tampered.log");
        rewrite_log(&original, &tampered, |entry| {
            if let LogEntry::Record(record) = entry {
                if record.sequence == 2 {
                    record.hash = Fingerprint::from_digest([0xee; 32]);
                }
            }
        });

        let ledger = LocalLedger::open(&tampered, SyncMode::Flush).unwrap();
        let custody = ChainOfCustody::new(Arc::new(ledger));
        let result = custody.validate(&case("C1")).await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.broken_at_sequence, Some(3));
        assert!(result.is_intact_through(2));
        assert!(!result.is_intact_through(3));
    }

    #[tokio::test]
    async fn validate_all_covers_every_case() {
        let (_dir, ledger) = temp_ledger();
        let ledger = Arc::new(ledger);
        ledger.append(submission("C2", "X", b"x")).await.unwrap();
        ledger.append(submission("C1", "A", b"a")).await.unwrap();
        ledger.append(submission("C1", "B", b"b")).await.unwrap();

        let results = ChainOfCustody::new(ledger).validate_all().await.unwrap();
        let summary: Vec<(&str, u64, bool)> = results
            .iter()
            .map(|r| (r.case_id.as_str(), r.record_count, r.valid))
            .collect();
        assert_eq!(summary, [("C1", 2, true), ("C2", 1, true)]);
    }

    #[test]
    fn works_over_trait_objects() {
        let (_dir, ledger) = temp_ledger();
        let store: Arc<dyn LedgerStore> = Arc::new(ledger);
        let custody = ChainOfCustody::new(store);
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        assert!(rt.block_on(custody.validate(&case("C1"))).unwrap().valid);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn every_prefix_stays_valid(
            contents in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..12)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let (_dir, ledger) = temp_ledger();
                let ledger = Arc::new(ledger);
                let custody = ChainOfCustody::new(Arc::clone(&ledger));
                for (i, content) in contents.iter().enumerate() {
                    ledger
                        .append(submission("C1", &format!("E{i}"), content))
                        .await
                        .unwrap();
                    let result = custody.validate(&case("C1")).await.unwrap();
                    assert!(result.valid);
                    assert_eq!(result.record_count, i as u64 + 1);
                }
            });
        }
    }
}
