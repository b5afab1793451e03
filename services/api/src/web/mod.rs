pub mod auth;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

pub use middleware::{require_admin, require_auth};
pub use ws_handler::ws_handler;

use state::AppState;

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Builds every API route. CORS, tracing and the Swagger UI are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(rest::health_handler))
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/verify/{token}", get(auth::verify_handler))
        .route("/notes", get(rest::list_notes_handler))
        .route("/ws", get(ws_handler));

    // Protected routes (auth required)
    let member_routes = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route("/favorites", get(rest::list_favorites_handler))
        .route(
            "/favorites/{note_id}",
            put(rest::add_favorite_handler).delete(rest::remove_favorite_handler),
        )
        .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), require_auth));

    // Admin routes: require_auth runs first, then require_admin
    let admin_routes = Router::new()
        .route("/notes", post(rest::upload_note_handler))
        .route("/notes/{id}", delete(rest::delete_note_handler))
        .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), require_admin))
        .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), require_auth));

    let body_limit = app_state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .merge(public_routes)
        .merge(member_routes)
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state)
}
