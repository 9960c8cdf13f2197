use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handler;
use crate::state::AppState;

/// Build the axum router with all divel endpoints.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let router = Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route(
            "/v1/cases/:case_id/evidence/:evidence_id",
            post(handler::append_handler),
        )
        .route("/v1/cases/:case_id/chain", get(handler::chain_handler))
        .route("/v1/cases/:case_id/validate", get(handler::validate_handler))
        .route("/v1/evidence/:evidence_id", get(handler::get_record_handler))
        .route("/v1/evidence/:evidence_id/verify", post(handler::verify_handler))
        .layer(DefaultBodyLimit::max(config.max_evidence_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if config.allow_any_origin {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
