//! HTTP server for the divel evidence ledger.
//!
//! A thin adapter over [`divel_ledger`] and [`divel_verify`]: evidence
//! bodies are fingerprinted on arrival and only the fingerprint is kept.
//! Authentication and evidence storage are left to the surrounding
//! deployment.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::DivelServer;
pub use state::AppState;
