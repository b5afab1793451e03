//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the notes screen in the
//! browser and the API server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use study_notes_core::{CatalogView, Identity, NoteCard, ScreenError};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================
// NOTE: The bytes of a file being uploaded are sent as raw Binary frames between
// `begin_upload` and `finish_upload`, not as part of this enum.
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SignIn {
        email: String,
        password: String,
    },
    SignUp {
        email: String,
        password: String,
        #[serde(default)]
        display_name: Option<String>,
    },
    SignOut,

    /// Selects one of the offered categories by label, e.g. `"Biology"`.
    SelectCategory { category: String },
    Search { term: String },
    /// Re-fetches the note list.
    Refresh,

    ToggleFavorite { note_id: Uuid },

    /// Announces a file. Its bytes follow as binary frames.
    BeginUpload {
        title: String,
        subject: String,
        file_name: String,
        #[serde(default)]
        content_type: Option<String>,
    },
    /// Submits the announced file with its metadata.
    FinishUpload,
    /// Discards the announced file.
    CancelUpload,

    /// Deletes a note shown in the current list. Its file is located from the
    /// stored row, never from the client.
    DeleteNote {
        id: Uuid,
        /// The answer to the confirmation prompt.
        confirmed: bool,
    },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full screen state. Sent on connect and after every change.
    View(ViewPayload),

    /// Reports a failed action. The screen stays usable.
    Error { kind: String, message: String },

    /// The account was created; a verification link has been issued.
    SignUpPending { email: String },

    UploadStarted { file_name: String },
    Uploaded { note_id: Uuid, title: String },

    FavoriteToggled { note_id: Uuid, is_favorite: bool },

    Deleted { note_id: Uuid },
    DeleteCancelled { note_id: Uuid },
}

impl ServerMessage {
    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

impl From<&ScreenError> for ServerMessage {
    fn from(e: &ScreenError) -> Self {
        ServerMessage::error(e.kind(), e.to_string())
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ViewerPayload {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CardPayload {
    pub id: Uuid,
    pub title: String,
    pub subject: String,
    pub file_url: String,
    pub created_at: DateTime<Utc>,
    pub is_favorite: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ViewPayload {
    pub viewer: Option<ViewerPayload>,
    pub categories: Vec<String>,
    pub category: String,
    pub search_term: String,
    pub busy: bool,
    pub can_manage: bool,
    pub total_notes: usize,
    pub notes: Vec<CardPayload>,
}

impl From<&Identity> for ViewerPayload {
    fn from(identity: &Identity) -> Self {
        Self {
            user_id: identity.user_id,
            email: identity.email.clone(),
            role: identity.role.to_string(),
        }
    }
}

impl From<&NoteCard> for CardPayload {
    fn from(card: &NoteCard) -> Self {
        Self {
            id: card.note.id,
            title: card.note.title.clone(),
            subject: card.note.subject.clone(),
            file_url: card.note.file_url.clone(),
            created_at: card.note.created_at,
            is_favorite: card.is_favorite,
        }
    }
}

impl From<&CatalogView> for ViewPayload {
    fn from(view: &CatalogView) -> Self {
        Self {
            viewer: view.viewer.as_ref().map(ViewerPayload::from),
            categories: view.categories.iter().map(|c| c.to_string()).collect(),
            category: view.category.to_string(),
            search_term: view.search_term.clone(),
            busy: view.busy,
            can_manage: view.can_manage,
            total_notes: view.total_notes,
            notes: view.cards.iter().map(CardPayload::from).collect(),
        }
    }
}
