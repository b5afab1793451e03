//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::HttpError;
use crate::web::auth::{self, AuthResponse, LoginRequest, SignupRequest, SignupResponse};
use crate::web::middleware::optional_session;
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_notes_core::catalog::{publish_note, remove_note};
use study_notes_core::{
    compute_visible, AuthSession, Category, FavoriteMark, FavoriteSet, FavoritesMode, Note, NoteDraft, UploadFile,
};
use tracing::{info, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::signup_handler,
        auth::verify_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        list_notes_handler,
        upload_note_handler,
        delete_note_handler,
        list_favorites_handler,
        add_favorite_handler,
        remove_favorite_handler,
    ),
    components(
        schemas(
            NoteResponse,
            NoteListResponse,
            HealthResponse,
            SignupRequest,
            SignupResponse,
            LoginRequest,
            AuthResponse
        )
    ),
    tags(
        (name = "Study Notes API", description = "Browse, favorite and manage shared exam-prep notes.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
}

/// A note as shown on a card.
#[derive(Serialize, ToSchema)]
pub struct NoteResponse {
    pub id: Uuid,
    pub title: String,
    pub subject: String,
    pub file_url: String,
    pub created_at: DateTime<Utc>,
    pub is_favorite: bool,
}

impl NoteResponse {
    fn new(note: &Note, is_favorite: bool) -> Self {
        Self {
            id: note.id,
            title: note.title.clone(),
            subject: note.subject.clone(),
            file_url: note.file_url.clone(),
            created_at: note.created_at,
            is_favorite,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct NoteListResponse {
    pub category: String,
    pub search_term: String,
    /// Notes in the catalog before filtering.
    pub total: usize,
    pub notes: Vec<NoteResponse>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotesQuery {
    /// All, Biology, Chemistry, Physics, English or Favorites. Defaults to All.
    pub category: Option<String>,
    /// Case-insensitive search over title and subject.
    pub q: Option<String>,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn require_synced_favorites(state: &AppState) -> Result<(), HttpError> {
    match state.features().favorites {
        FavoritesMode::Synced => Ok(()),
        FavoritesMode::Local | FavoritesMode::Disabled => Err(HttpError::Forbidden(
            "Favorites are not stored on this server".to_string(),
        )),
    }
}

async fn favorite_set(state: &AppState, user_id: Uuid) -> Result<FavoriteSet, HttpError> {
    let rows = state.favorites.list_for_user(user_id).await?;
    Ok(rows.into_iter().filter_map(|row| row.note).collect())
}

fn field_error(e: axum::extract::multipart::MultipartError) -> HttpError {
    HttpError::Validation(format!("Failed to read multipart data: {e}"))
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// List the notes matching a category and search term, newest first.
///
/// Favorite flags are filled in when a valid session cookie is sent.
#[utoipa::path(
    get,
    path = "/notes",
    params(NotesQuery),
    responses(
        (status = 200, description = "Visible notes", body = NoteListResponse),
        (status = 400, description = "Unknown or unavailable category"),
        (status = 502, description = "Database error")
    )
)]
pub async fn list_notes_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<NotesQuery>,
) -> Result<Json<NoteListResponse>, HttpError> {
    let category = match query.category.as_deref() {
        Some(raw) if !raw.trim().is_empty() => raw
            .parse::<Category>()
            .map_err(|e| HttpError::Validation(e.to_string()))?,
        _ => Category::All,
    };
    if !state.features().offers(category) {
        return Err(HttpError::Validation(format!("The {category} category is not available")));
    }
    let search_term = query.q.unwrap_or_default();

    let notes = state.notes.list_newest_first().await?;
    let favorites = match (state.features().favorites, optional_session(&state, &headers).await) {
        (FavoritesMode::Synced, Some(session)) => favorite_set(&state, session.identity.user_id).await?,
        _ => FavoriteSet::new(),
    };

    let visible = compute_visible(&notes, &favorites, category, &search_term)
        .into_iter()
        .map(|note| NoteResponse::new(note, favorites.contains(note.id)))
        .collect();

    Ok(Json(NoteListResponse {
        category: category.to_string(),
        search_term,
        total: notes.len(),
        notes: visible,
    }))
}

/// Upload a new note. Admin only.
///
/// Accepts multipart/form-data with `title`, `subject` and `file` parts.
#[utoipa::path(
    post,
    path = "/notes",
    request_body(content_type = "multipart/form-data", description = "title, subject and file parts."),
    responses(
        (status = 201, description = "Note stored", body = NoteResponse),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Not an admin"),
        (status = 413, description = "File too large"),
        (status = 502, description = "Storage or database error")
    )
)]
pub async fn upload_note_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let limit = state.config.max_upload_bytes;
    let mut draft = NoteDraft::default();

    while let Some(field) = multipart.next_field().await.map_err(field_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => draft.title = field.text().await.map_err(field_error)?,
            "subject" => draft.subject = field.text().await.map_err(field_error)?,
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(field_error)?;
                if bytes.len() > limit {
                    return Err(HttpError::PayloadTooLarge(limit));
                }
                draft.file = Some(UploadFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            other => warn!(field = other, "Ignoring unexpected multipart field"),
        }
    }

    let note = publish_note(state.store.as_ref(), state.notes.as_ref(), draft).await?;
    info!(note_id = %note.id, user_id = %session.identity.user_id, "Note uploaded");
    Ok((StatusCode::CREATED, Json(NoteResponse::new(&note, false))))
}

/// Delete a note and its file. Admin only.
#[utoipa::path(
    delete,
    path = "/notes/{id}",
    params(("id" = Uuid, Path, description = "The note to delete.")),
    responses(
        (status = 204, description = "Note deleted"),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Unknown note"),
        (status = 502, description = "Storage or database error")
    )
)]
pub async fn delete_note_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HttpError> {
    let note = state.notes.get(id).await?;
    remove_note(state.store.as_ref(), state.notes.as_ref(), note.id, &note.file_url).await?;
    info!(note_id = %id, user_id = %session.identity.user_id, "Note deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// The caller's favorite notes, most recently marked first.
#[utoipa::path(
    get,
    path = "/favorites",
    responses(
        (status = 200, description = "Favorite notes", body = Vec<NoteResponse>),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Favorites are not stored on this server")
    )
)]
pub async fn list_favorites_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<Vec<NoteResponse>>, HttpError> {
    require_synced_favorites(&state)?;
    let rows = state.favorites.list_for_user(session.identity.user_id).await?;
    Ok(Json(
        rows.iter()
            .filter_map(|row| row.note.as_ref())
            .map(|note| NoteResponse::new(note, true))
            .collect(),
    ))
}

/// Mark a note as favorite. Marking twice is harmless.
#[utoipa::path(
    put,
    path = "/favorites/{note_id}",
    params(("note_id" = Uuid, Path, description = "The note to mark.")),
    responses(
        (status = 204, description = "Marked"),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "Unknown note")
    )
)]
pub async fn add_favorite_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Path(note_id): Path<Uuid>,
) -> Result<StatusCode, HttpError> {
    require_synced_favorites(&state)?;
    state.notes.get(note_id).await?;
    state
        .favorites
        .insert(FavoriteMark {
            user_id: session.identity.user_id,
            note_id,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Remove a favorite mark. Removing an absent mark is harmless.
#[utoipa::path(
    delete,
    path = "/favorites/{note_id}",
    params(("note_id" = Uuid, Path, description = "The note to unmark.")),
    responses(
        (status = 204, description = "Unmarked"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn remove_favorite_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Path(note_id): Path<Uuid>,
) -> Result<StatusCode, HttpError> {
    require_synced_favorites(&state)?;
    state
        .favorites
        .delete(FavoriteMark {
            user_id: session.identity.user_id,
            note_id,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
