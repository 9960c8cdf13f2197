use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use divel_types::{CaseId, EvidenceId, Fingerprint};
use tracing::debug;

/// Errors reported by an anchoring backend.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AnchorError {
    /// The backend could not be reached.
    #[error("anchor backend unreachable: {0}")]
    Unreachable(String),

    /// The backend refused the submission.
    #[error("anchor rejected submission: {0}")]
    Rejected(String),
}

/// An external, tamper-evident store fingerprints can be anchored in.
///
/// Implementations are consulted under a timeout by [`crate::ChainLedger`];
/// they do not need to enforce one themselves.
#[async_trait]
pub trait AnchoringBackend: Send + Sync {
    /// Anchor a fingerprint. Returns the backend's transaction id.
    async fn submit(
        &self,
        case_id: &CaseId,
        evidence_id: &EvidenceId,
        hash: &Fingerprint,
    ) -> Result<String, AnchorError>;

    /// The fingerprint anchored for `evidence_id`, if any.
    async fn lookup(&self, evidence_id: &EvidenceId) -> Result<Option<Fingerprint>, AnchorError>;

    fn name(&self) -> &'static str;
}

#[derive(Default)]
struct AnchorState {
    /// Anchored fingerprints by block height.
    blocks: Vec<Fingerprint>,
    by_evidence: HashMap<EvidenceId, usize>,
}

/// Process-local simulated chain.
///
/// Each submission becomes a block whose transaction id commits to the
/// block height and contents. Availability and latency can be toggled to
/// exercise fallback paths.
pub struct InMemoryAnchor {
    state: RwLock<AnchorState>,
    available: AtomicBool,
    latency_ms: AtomicU64,
}

impl Default for InMemoryAnchor {
    fn default() -> Self {
        Self {
            state: RwLock::new(AnchorState::default()),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }
}

impl InMemoryAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of anchored blocks.
    pub fn height(&self) -> usize {
        self.state.read().map(|s| s.blocks.len()).unwrap_or_default()
    }

    /// Overwrite the anchored fingerprint for `evidence_id`.
    #[cfg(test)]
    pub(crate) fn rewrite(&self, evidence_id: &EvidenceId, hash: Fingerprint) {
        let mut state = self.state.write().unwrap();
        let index = state.by_evidence[evidence_id];
        state.blocks[index] = hash;
    }

    async fn simulate_network(&self) -> Result<(), AnchorError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(AnchorError::Unreachable("in-memory anchor is offline".into()));
        }
        Ok(())
    }
}

fn transaction_id(
    height: usize,
    case_id: &CaseId,
    evidence_id: &EvidenceId,
    hash: &Fingerprint,
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(height as u64).to_le_bytes());
    hasher.update(case_id.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(evidence_id.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(hash.as_bytes());
    format!("0x{}", hasher.finalize().to_hex())
}

#[async_trait]
impl AnchoringBackend for InMemoryAnchor {
    async fn submit(
        &self,
        case_id: &CaseId,
        evidence_id: &EvidenceId,
        hash: &Fingerprint,
    ) -> Result<String, AnchorError> {
        self.simulate_network().await?;

        let mut state = self
            .state
            .write()
            .map_err(|_| AnchorError::Unreachable("anchor state poisoned".into()))?;
        if state.by_evidence.contains_key(evidence_id) {
            return Err(AnchorError::Rejected(format!(
                "evidence {evidence_id} is already anchored"
            )));
        }

        let height = state.blocks.len();
        let tx_id = transaction_id(height, case_id, evidence_id, hash);
        state.blocks.push(*hash);
        state.by_evidence.insert(evidence_id.clone(), height);

        debug!(evidence = %evidence_id, height, tx = %tx_id, "anchored fingerprint");
        Ok(tx_id)
    }

    async fn lookup(&self, evidence_id: &EvidenceId) -> Result<Option<Fingerprint>, AnchorError> {
        self.simulate_network().await?;

        let state = self
            .state
            .read()
            .map_err(|_| AnchorError::Unreachable("anchor state poisoned".into()))?;
        Ok(state
            .by_evidence
            .get(evidence_id)
            .and_then(|&i| state.blocks.get(i))
            .copied())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
