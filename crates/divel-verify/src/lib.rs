//! Evidence verification for divel.
//!
//! [`VerificationEngine`] takes an evidence id and freshly retrieved
//! content, and reports whether the content, its case's chain of custody,
//! and any external anchor still agree with what was ledgered at upload.

pub mod engine;
pub mod verdict;

pub use engine::VerificationEngine;
pub use verdict::{RecordDiagnostics, TamperReason, VerificationStatus, VerificationVerdict};
