use std::path::PathBuf;
use std::time::Duration;

use divel_crypto::{Fingerprinter, HashAlgorithm};
use serde::{Deserialize, Serialize};

/// Flush/sync strategy for the local log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Flush and `fsync` every entry before acknowledging it.
    #[default]
    EveryWrite,
    /// Flush to the OS only. Loses acknowledged records on power failure;
    /// for tests and throwaway ledgers.
    Flush,
}

/// Which anchoring backend a [`crate::ChainLedger`] talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnchorBackendKind {
    /// Process-local simulated chain ([`crate::InMemoryAnchor`]). Its
    /// anchors die with the process; records anchored by an earlier process
    /// then fail verification as `Missing`.
    #[default]
    InMemory,
}

/// External anchoring settings. Absent means local-only operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    pub backend: AnchorBackendKind,
    /// Upper bound on every call to the anchoring backend.
    pub timeout_ms: u64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            backend: AnchorBackendKind::default(),
            timeout_ms: 5_000,
        }
    }
}

impl AnchorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration for opening a ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Path of the append-only record log.
    pub log_path: PathBuf,
    pub sync_mode: SyncMode,
    /// Fingerprint algorithm used on ingestion and verification.
    pub hash_algorithm: HashAlgorithm,
    pub anchor: Option<AnchorConfig>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("divel-ledger.log"),
            sync_mode: SyncMode::default(),
            hash_algorithm: HashAlgorithm::default(),
            anchor: None,
        }
    }
}

impl LedgerConfig {
    /// Local-only configuration writing to `log_path`.
    pub fn local(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            ..Default::default()
        }
    }

    /// Enable anchoring with the given settings.
    pub fn with_anchor(mut self, anchor: AnchorConfig) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn fingerprinter(&self) -> Fingerprinter {
        Fingerprinter::new(self.hash_algorithm)
    }
}
