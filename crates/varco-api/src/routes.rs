//! API route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// Create the full router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::liveness))
        .route("/health/ready", get(handlers::readiness))
        // Authentication flow
        .route("/authorize", get(handlers::auth::authorize))
        .route("/callback", get(handlers::auth::callback))
        .route("/logout", get(handlers::auth::logout))
        // Session status and silent probing
        .route("/check-session", get(handlers::session::check_session))
        .route("/probe", get(handlers::session::probe))
        // Profile sync trigger for protected routes
        .route("/profile/sync", post(handlers::session::profile_sync))
        .with_state(state)
}
