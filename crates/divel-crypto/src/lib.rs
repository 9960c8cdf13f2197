//! Hashing primitives for the divel evidence ledger.
//!
//! Provides the content fingerprinter used on both the ingestion and the
//! verification paths, and the link verifier that checks per-case hash
//! chains.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod chain;
pub mod hasher;

pub use chain::{ChainError, ChainLink, ChainVerifier};
pub use hasher::{Fingerprinter, HashAlgorithm};
