//! Append-only evidence fingerprint ledger for divel.
//!
//! This crate provides:
//! - The [`LedgerStore`] contract every backend satisfies
//! - [`LocalLedger`]: crash-consistent append-only log on local disk
//! - [`ChainLedger`]: external anchoring with local fallback
//! - [`ChainOfCustody`]: per-case hash chain validation
//! - Per-case write serialization ([`CaseLocks`])

pub mod anchor;
pub mod chain;
pub mod config;
pub mod custody;
pub mod error;
pub mod local;
pub mod locks;
pub mod log;
pub mod traits;

use std::sync::Arc;

use tracing::info;

pub use anchor::{AnchorError, AnchoringBackend, InMemoryAnchor};
pub use chain::ChainLedger;
pub use config::{AnchorBackendKind, AnchorConfig, LedgerConfig, SyncMode};
pub use custody::{ChainOfCustody, ValidationResult};
pub use error::{LedgerError, LedgerResult};
pub use local::LocalLedger;
pub use locks::{CaseGuard, CaseLocks};
pub use log::{LogEntry, RecordLog, RecoveredEntry};
pub use traits::{AnchorCheck, LedgerStore};

/// Open the ledger described by `config`.
///
/// Without an `anchor` section this is a plain [`LocalLedger`].
pub fn open_ledger(config: &LedgerConfig) -> LedgerResult<Arc<dyn LedgerStore>> {
    match &config.anchor {
        None => {
            info!(path = %config.log_path.display(), "opening local ledger");
            Ok(Arc::new(LocalLedger::from_config(config)?))
        }
        Some(anchor) => {
            let backend: Arc<dyn AnchoringBackend> = match anchor.backend {
                AnchorBackendKind::InMemory => Arc::new(InMemoryAnchor::new()),
            };
            open_ledger_with_backend(config, backend)
        }
    }
}

/// Open a [`ChainLedger`] over `config`'s local log, anchoring in `backend`.
pub fn open_ledger_with_backend(
    config: &LedgerConfig,
    backend: Arc<dyn AnchoringBackend>,
) -> LedgerResult<Arc<dyn LedgerStore>> {
    let timeout = config.anchor.clone().unwrap_or_default().timeout();
    info!(
        path = %config.log_path.display(),
        backend = backend.name(),
        ?timeout,
        "opening anchored ledger"
    );
    let local = LocalLedger::from_config(config)?;
    Ok(Arc::new(ChainLedger::new(local, backend, timeout)))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::submission;

    #[tokio::test]
    async fn local_config_opens_local_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig::local(dir.path().join("ledger.log"));
        let ledger = open_ledger(&config).unwrap();
        assert_eq!(ledger.backend_name(), "local");
        let receipt = ledger.append(submission("C1", "A", b"a")).await.unwrap();
        assert!(!receipt.provenance.is_chain());
    }

    #[tokio::test]
    async fn anchor_config_opens_chain_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            LedgerConfig::local(dir.path().join("ledger.log")).with_anchor(AnchorConfig::default());
        let ledger = open_ledger(&config).unwrap();
        assert_eq!(ledger.backend_name(), "chain");
        let receipt = ledger.append(submission("C1", "A", b"a")).await.unwrap();
        assert!(receipt.provenance.is_chain());
    }
}
