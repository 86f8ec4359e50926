//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, admin, health, metered};
use crate::state::AppState;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Session (bearer token auth)
/// - `POST /v1/accounts/bootstrap` - Idempotent signup initialization
/// - `GET /v1/credits/balance` - Get current balance
/// - `GET /v1/credits/transactions` - List transaction history
///
/// ## Metered API (API key auth, billed per call)
/// - `GET /api/data` - Paginated dataset
/// - `POST /api/v1/ai/chat` - Chat completion billed by prompt length
///
/// ## Admin (`x-admin-token` auth)
/// - `POST /v1/admin/users` - Upsert a user profile
/// - `POST /v1/admin/api-keys` - Mint an API key
/// - `POST /v1/admin/credits/adjust` - Signed balance correction
/// - `POST /v1/admin/credits/freeze` - Reserve credits
/// - `POST /v1/admin/credits/unfreeze` - Release reserved credits
/// - `POST /v1/admin/distribute` - Run the monthly distribution job
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    // Build CORS layer
    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        // Session surface
        .route("/v1/accounts/bootstrap", post(accounts::bootstrap))
        .route("/v1/credits/balance", get(accounts::get_balance))
        .route("/v1/credits/transactions", get(accounts::list_transactions))
        // Metered API
        .route("/api/data", get(metered::get_data))
        .route("/api/v1/ai/chat", post(metered::chat))
        // Admin surface
        .route("/v1/admin/users", post(admin::upsert_user))
        .route("/v1/admin/api-keys", post(admin::mint_api_key))
        .route("/v1/admin/credits/adjust", post(admin::adjust_credits))
        .route("/v1/admin/credits/freeze", post(admin::freeze_credits))
        .route("/v1/admin/credits/unfreeze", post(admin::unfreeze_credits))
        .route("/v1/admin/distribute", post(admin::distribute))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
