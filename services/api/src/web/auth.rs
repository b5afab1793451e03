//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for sign-up, e-mail verification, login, logout and
//! the current identity.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_notes_core::{AuthSession, Identity, SignUpProfile};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::HttpError;
use crate::web::middleware::{session_id_from_headers, SESSION_COOKIE};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    /// `student` or `admin`.
    pub role: String,
}

impl From<&Identity> for AuthResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            user_id: identity.user_id,
            email: identity.email.clone(),
            role: identity.role.to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SignupResponse {
    pub user_id: Uuid,
    pub email: String,
    /// Always true: the account cannot log in until the e-mail is verified.
    pub verification_required: bool,
}

fn session_cookie(session_id: &str, max_age_seconds: i64) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, session_id, max_age_seconds
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new, unverified user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created, verification pending", body = SignupResponse),
        (status = 400, description = "Invalid e-mail, short password or already registered"),
        (status = 502, description = "Database error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let profile = SignUpProfile {
        display_name: req.display_name,
    };
    let identity = state.accounts.register(&req.email, &req.password, &profile).await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            user_id: identity.user_id,
            email: identity.email,
            verification_required: true,
        }),
    ))
}

/// GET /auth/verify/{token} - Confirm the e-mail address of an account
#[utoipa::path(
    get,
    path = "/auth/verify/{token}",
    params(("token" = String, Path, description = "The token from the verification link.")),
    responses(
        (status = 200, description = "E-mail verified", body = AuthResponse),
        (status = 404, description = "Unknown or already used token")
    )
)]
pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<AuthResponse>, HttpError> {
    let identity = state.accounts.verify(&token).await?;
    Ok(Json(AuthResponse::from(&identity)))
}

/// POST /auth/login - Login with a verified account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Invalid credentials or e-mail not confirmed"),
        (status = 502, description = "Database error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let session = state.accounts.login(&req.email, &req.password).await?;
    info!(user_id = %session.identity.user_id, "Login succeeded");

    let cookie = session_cookie(&session.id, state.accounts.session_ttl().num_seconds());
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse::from(&session.identity)),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpError> {
    let session_id = session_id_from_headers(&headers)
        .ok_or_else(|| HttpError::Unauthorized("No session found".to_string()))?;

    if let Err(e) = state.accounts.logout(&session_id).await {
        // The cookie is cleared regardless.
        warn!(error = %e, "Failed to delete auth session");
    }

    Ok((StatusCode::OK, [(header::SET_COOKIE, session_cookie("", 0))]))
}

/// GET /auth/me - The identity behind the session cookie
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current identity", body = AuthResponse),
        (status = 401, description = "No active session")
    )
)]
pub async fn me_handler(Extension(session): Extension<AuthSession>) -> Json<AuthResponse> {
    Json(AuthResponse::from(&session.identity))
}
