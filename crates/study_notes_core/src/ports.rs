//! crates/study_notes_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary to the persistence collaborator: auth provider,
//! object store and the two tables. Any backend satisfying them is interchangeable.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{AuthSession, FavoriteMark, FavoriteRow, NewNote, Note, SessionEvent, SignUpProfile};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The collaborator refused the request; the message is meant for the user.
    #[error("{0}")]
    Rejected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Stream of session notifications handed out by [`AuthProvider::session_changes`].
pub type SessionEventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send>>;

/// Adapts a broadcast receiver into a [`SessionEventStream`].
///
/// Lagged receivers skip the missed events and keep listening; the stream ends
/// once every sender is dropped.
pub fn session_event_stream(rx: broadcast::Receiver<SessionEvent>) -> SessionEventStream {
    Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((event, rx)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }))
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns the session established earlier, if it is still valid.
    async fn current_session(&self) -> PortResult<Option<AuthSession>>;

    /// Subscribes to sign-in, sign-out and expiry notifications.
    fn session_changes(&self) -> SessionEventStream;

    /// Registers a new account. The account stays unusable until the e-mail
    /// address is verified, so no session is returned.
    async fn sign_up(&self, email: &str, password: &str, profile: &SignUpProfile) -> PortResult<()>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthSession>;

    async fn sign_out(&self) -> PortResult<()>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn store(&self, object_name: &str, bytes: Bytes, content_type: Option<&str>) -> PortResult<()>;

    /// The publicly resolvable address of a stored object.
    fn public_url(&self, object_name: &str) -> String;

    async fn remove(&self, object_name: &str) -> PortResult<()>;
}

#[async_trait]
pub trait NoteTable: Send + Sync {
    /// Every note, newest `created_at` first.
    async fn list_newest_first(&self) -> PortResult<Vec<Note>>;

    async fn get(&self, id: Uuid) -> PortResult<Note>;

    async fn insert(&self, note: NewNote) -> PortResult<Note>;

    async fn delete(&self, id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait FavoriteTable: Send + Sync {
    /// All marks of one user, each joined with its note when it still exists.
    async fn list_for_user(&self, user_id: Uuid) -> PortResult<Vec<FavoriteRow>>;

    async fn insert(&self, mark: FavoriteMark) -> PortResult<()>;

    async fn delete(&self, mark: FavoriteMark) -> PortResult<()>;
}
