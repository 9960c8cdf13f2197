use std::fs;
use std::path::Path;

use anyhow::Context;
use divel_ledger::LedgerConfig;
use divel_server::ServerConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::Cli;

/// Top-level `divel.toml`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DivelConfig {
    pub ledger: LedgerConfig,
    pub server: ServerConfig,
}

impl DivelConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// The config file named on the command line (or defaults), with
    /// command-line overrides applied.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(ledger) = &cli.ledger {
            config.ledger.log_path = ledger.clone();
        }
        Ok(config)
    }
}
