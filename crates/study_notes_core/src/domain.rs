//! crates/study_notes_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A stored study document's metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    /// Free text typed by the uploader, not one of the fixed categories.
    pub subject: String,
    pub file_url: String,
    pub created_at: DateTime<Utc>,
}

/// The fields of a note row before the table store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    pub title: String,
    pub subject: String,
    pub file_url: String,
}

/// A user-to-note bookmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FavoriteMark {
    pub user_id: Uuid,
    pub note_id: Uuid,
}

/// A favorite mark as returned by the table store, joined with its note.
/// `note` is `None` when the mark points at a note that has since been deleted.
#[derive(Debug, Clone)]
pub struct FavoriteRow {
    pub mark: FavoriteMark,
    pub note: Option<Note>,
}

//=========================================================================================
// Identity
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Student,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// An authenticated user. The role is a claim issued by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// An established login session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub identity: Identity,
    pub expires_at: DateTime<Utc>,
}

/// Optional fields collected by the sign-up form.
#[derive(Debug, Clone, Default)]
pub struct SignUpProfile {
    pub display_name: Option<String>,
}

/// Notifications delivered by the auth collaborator at any point in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Identity),
    SignedOut,
    TokenExpired,
}

//=========================================================================================
// Upload input
//=========================================================================================

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// The raw contents of the upload form. Any field may still be blank.
#[derive(Debug, Clone, Default)]
pub struct NoteDraft {
    pub title: String,
    pub subject: String,
    pub file: Option<UploadFile>,
}

/// A delete action as issued from a note card.
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub id: Uuid,
    pub file_url: String,
    /// Whether the user answered the confirmation prompt affirmatively.
    pub confirmed: bool,
}
