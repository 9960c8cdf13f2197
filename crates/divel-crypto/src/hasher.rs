use std::fmt;
use std::io::{self, Read};

use divel_types::Fingerprint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Digest algorithm behind a [`Fingerprinter`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256, the digest the evidence front end displays.
    #[default]
    Sha256,
    Blake3,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

/// Content-only evidence fingerprinter.
///
/// Fingerprints depend on the bytes alone: filename, MIME type, and
/// upload path never enter the digest, so the same evidence re-uploaded
/// under another name produces the same fingerprint. The algorithm is a
/// ledger-wide setting; mixing algorithms within one ledger makes every
/// verification fail.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Fingerprinter {
    algorithm: HashAlgorithm,
}

/// Read buffer size for streaming fingerprints.
const CHUNK_SIZE: usize = 64 * 1024;

impl Fingerprinter {
    pub const SHA256: Self = Self {
        algorithm: HashAlgorithm::Sha256,
    };
    pub const BLAKE3: Self = Self {
        algorithm: HashAlgorithm::Blake3,
    };

    pub const fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Fingerprint a complete byte sequence. Total: never fails.
    pub fn fingerprint(&self, data: &[u8]) -> Fingerprint {
        match self.algorithm {
            HashAlgorithm::Sha256 => Fingerprint::from_digest(Sha256::digest(data).into()),
            HashAlgorithm::Blake3 => Fingerprint::from_digest(*blake3::hash(data).as_bytes()),
        }
    }

    /// Fingerprint a byte stream without buffering it whole.
    ///
    /// The only failure is an I/O error from the reader itself.
    pub fn fingerprint_reader<R: Read>(&self, mut reader: R) -> io::Result<Fingerprint> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        match self.algorithm {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                loop {
                    let n = read_chunk(&mut reader, &mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(Fingerprint::from_digest(hasher.finalize().into()))
            }
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                loop {
                    let n = read_chunk(&mut reader, &mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(Fingerprint::from_digest(*hasher.finalize().as_bytes()))
            }
        }
    }

    /// Returns `true` if `data` fingerprints to `expected`.
    pub fn matches(&self, data: &[u8], expected: &Fingerprint) -> bool {
        self.fingerprint(data) == *expected
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
