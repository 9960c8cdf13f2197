use std::sync::Arc;

use divel_crypto::Fingerprinter;
use divel_ledger::LedgerStore;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::AppState;

/// divel ledger HTTP server.
pub struct DivelServer {
    config: ServerConfig,
    state: AppState,
}

impl DivelServer {
    pub fn new(
        config: ServerConfig,
        ledger: Arc<dyn LedgerStore>,
        fingerprinter: Fingerprinter,
    ) -> Self {
        Self {
            config,
            state: AppState::new(ledger, fingerprinter),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone(), &self.config)
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            addr = %self.config.bind_addr,
            backend = self.state.ledger.backend_name(),
            "divel server listening"
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
