pub mod config;
pub mod documents;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod notes;
pub mod prompts;
pub mod provider;
pub mod report;
pub mod session;
pub mod state;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::info;

/// Browser frontends allowed to call the API with credentials.
pub const ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:3000", "https://botsmann.com"];

pub fn build_state() -> state::AppState {
    let state = state::AppState::from_env();
    let config = state.config.resolve();
    info!(provider = %config.kind, model = %config.model, "research provider configured");
    state
}

pub fn build_app(state: state::AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/research", post(handlers::research))
        .route("/chat", post(handlers::chat))
        .route("/discover", post(handlers::discover))
        .layer(cors_layer())
        .with_state(state)
}

// Credentialed CORS rejects `*`, so methods and headers mirror the preflight.
fn cors_layer() -> CorsLayer {
    let origins = ALLOWED_ORIGINS.map(HeaderValue::from_static);
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}
