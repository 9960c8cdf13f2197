//! Foundation types for the divel evidence ledger.
//!
//! Every other divel crate depends on `divel-types`.
//!
//! # Key Types
//!
//! - [`Fingerprint`]: 256-bit content digest, hex on the wire
//! - [`CaseId`] / [`EvidenceId`]: validated opaque identifiers
//! - [`FingerprintRecord`]: one ledgered evidence item in its case chain
//! - [`Provenance`]: which backend anchored a record
//! - [`AppendReceipt`]: what a submitter gets back from an append

pub mod error;
pub mod evidence;
pub mod fingerprint;
pub mod identity;
pub mod record;

pub use error::TypeError;
pub use evidence::{FileType, UploaderRole};
pub use fingerprint::Fingerprint;
pub use identity::{CaseId, EvidenceId, RecordId};
pub use record::{AppendReceipt, EvidenceSubmission, FingerprintRecord, Provenance};
