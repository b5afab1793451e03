//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
    Extension,
};
use std::sync::Arc;
use study_notes_core::AuthSession;
use tracing::warn;

use crate::error::HttpError;
use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Reads the login session id from the `session` cookie.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
}

/// Resolves the session cookie to a live login session, if there is one.
pub async fn optional_session(state: &AppState, headers: &HeaderMap) -> Option<AuthSession> {
    let session_id = session_id_from_headers(headers)?;
    match state.accounts.session(&session_id).await {
        Ok(session) => Some(session),
        Err(e) => {
            warn!(error = %e, "Ignoring unusable session cookie");
            None
        }
    }
}

/// Middleware that validates the auth session cookie.
///
/// If valid, inserts the `AuthSession` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let session_id = session_id_from_headers(req.headers())
        .ok_or_else(|| HttpError::Unauthorized("Authentication required".to_string()))?;

    let session = state.accounts.session(&session_id).await.map_err(|e| {
        warn!(error = %e, "Failed to validate auth session");
        HttpError::Unauthorized("Session not found or expired".to_string())
    })?;

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Middleware for note management routes. Must run after [`require_auth`].
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    if !state.features().admin_panel {
        return Err(HttpError::Forbidden("Note management is disabled".to_string()));
    }
    if !session.identity.is_admin() {
        warn!(user_id = %session.identity.user_id, "Non-admin attempted note management");
        return Err(HttpError::Forbidden("Only admins can manage notes".to_string()));
    }
    Ok(next.run(req).await)
}
