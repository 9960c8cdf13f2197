use divel_types::{Fingerprint, FingerprintRecord};

/// Trait for records that participate in a per-case hash chain.
pub trait ChainLink {
    /// The record's own content fingerprint.
    fn link_hash(&self) -> Fingerprint;
    /// The fingerprint this record claims precedes it.
    fn previous_hash(&self) -> Fingerprint;
    /// The 1-based position this record claims in its chain.
    fn sequence(&self) -> u64;
}

impl ChainLink for FingerprintRecord {
    fn link_hash(&self) -> Fingerprint {
        self.hash
    }

    fn previous_hash(&self) -> Fingerprint {
        self.previous_hash
    }

    fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Hash chain link verifier.
///
/// A chain is intact when, for every position `i` (1-based):
/// 1. the record at `i` claims sequence `i`
/// 2. the first record's previous hash is the genesis sentinel
/// 3. every later record's previous hash equals its predecessor's hash
///
/// Breaks are reported at the position of the record whose claim fails,
/// so a mutated hash at position `i` surfaces as a break at `i + 1`.
pub struct ChainVerifier;

impl ChainVerifier {
    /// Verify a full chain, stopping at the first break.
    pub fn verify_chain(links: &[impl ChainLink]) -> Result<(), ChainError> {
        let mut expected_prev = Fingerprint::genesis();

        for (index, link) in links.iter().enumerate() {
            let position = index as u64 + 1;
            if link.sequence() != position {
                return Err(ChainError::SequenceGap {
                    expected: position,
                    found: link.sequence(),
                });
            }

            if link.previous_hash() != expected_prev {
                return Err(if position == 1 {
                    ChainError::GenesisMismatch
                } else {
                    ChainError::BrokenLink { sequence: position }
                });
            }

            expected_prev = link.link_hash();
        }

        Ok(())
    }

    /// The position of the first break, if any.
    pub fn first_break(links: &[impl ChainLink]) -> Option<u64> {
        Self::verify_chain(links).err().map(|e| e.sequence())
    }

    /// The previous hash a record appended after `links` must carry.
    pub fn next_previous_hash(links: &[impl ChainLink]) -> Fingerprint {
        links
            .last()
            .map(ChainLink::link_hash)
            .unwrap_or_else(Fingerprint::genesis)
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("first record does not link to the genesis sentinel")]
    GenesisMismatch,

    #[error("broken link at sequence {sequence}: previous hash does not match")]
    BrokenLink { sequence: u64 },

    #[error("sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },
}

impl ChainError {
    /// The chain position at which the break was detected.
    pub fn sequence(&self) -> u64 {
        match self {
            Self::GenesisMismatch => 1,
            Self::BrokenLink { sequence } => *sequence,
            Self::SequenceGap { expected, .. } => *expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestLink {
        hash: Fingerprint,
        prev: Fingerprint,
        seq: u64,
    }

    impl ChainLink for TestLink {
        fn link_hash(&self) -> Fingerprint {
            self.hash
        }
        fn previous_hash(&self) -> Fingerprint {
            self.prev
        }
        fn sequence(&self) -> u64 {
            self.seq
        }
    }

    fn build_chain(count: usize) -> Vec<TestLink> {
        let mut chain: Vec<TestLink> = Vec::new();
        for i in 0..count {
            let prev = ChainVerifier::next_previous_hash(&chain);
            chain.push(TestLink {
                hash: Fingerprint::from_digest([i as u8 + 1; 32]),
                prev,
                seq: i as u64 + 1,
            });
        }
        chain
    }

    #[test]
    fn empty_chain_is_valid() {
        let chain: Vec<TestLink> = vec![];
        assert!(ChainVerifier::verify_chain(&chain).is_ok());
        assert_eq!(ChainVerifier::next_previous_hash(&chain), Fingerprint::genesis());
    }

    #[test]
    fn multi_link_chain() {
        let chain = build_chain(10);
        assert!(ChainVerifier::verify_chain(&chain).is_ok());
        assert_eq!(ChainVerifier::first_break(&chain), None);
    }

    #[test]
    fn genesis_must_link_to_sentinel() {
        let mut chain = build_chain(2);
        chain[0].prev = Fingerprint::from_digest([9; 32]);
        let err = ChainVerifier::verify_chain(&chain).unwrap_err();
        assert_eq!(err, ChainError::GenesisMismatch);
        assert_eq!(err.sequence(), 1);
    }

    #[test]
    fn mutated_hash_breaks_next_link() {
        let mut chain = build_chain(4);
        chain[1].hash = Fingerprint::from_digest([0xee; 32]);
        assert_eq!(
            ChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::BrokenLink { sequence: 3 }
        );
    }

    #[test]
    fn mutated_last_hash_is_undetectable_by_links() {
        // Only the content comparison in verification catches this one.
        let mut chain = build_chain(3);
        chain[2].hash = Fingerprint::from_digest([0xee; 32]);
        assert!(ChainVerifier::verify_chain(&chain).is_ok());
    }

    #[test]
    fn reordering_detected() {
        let mut chain = build_chain(3);
        chain.swap(1, 2);
        assert_eq!(
            ChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::SequenceGap {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn silent_insertion_detected() {
        let mut chain = build_chain(3);
        let first = chain[0].hash;
        chain.insert(
            1,
            TestLink {
                hash: Fingerprint::from_digest([0x42; 32]),
                prev: first,
                seq: 2,
            },
        );
        // The inserted link looks fine; the original second record no longer fits.
        assert_eq!(ChainVerifier::first_break(&chain), Some(3));
    }
}
