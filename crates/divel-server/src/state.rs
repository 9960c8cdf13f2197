use std::sync::Arc;

use divel_crypto::Fingerprinter;
use divel_ledger::{ChainOfCustody, LedgerStore};
use divel_verify::VerificationEngine;

/// Shared handler state. Cheap to clone: everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub custody: ChainOfCustody<dyn LedgerStore>,
    pub verifier: VerificationEngine<dyn LedgerStore>,
    pub fingerprinter: Fingerprinter,
}

impl AppState {
    pub fn new(ledger: Arc<dyn LedgerStore>, fingerprinter: Fingerprinter) -> Self {
        Self {
            custody: ChainOfCustody::new(Arc::clone(&ledger)),
            verifier: VerificationEngine::new(Arc::clone(&ledger), fingerprinter),
            ledger,
            fingerprinter,
        }
    }
}
