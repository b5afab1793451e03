//! services/api/src/web/state.rs
//!
//! Defines the application's shared and connection-specific states.

use crate::accounts::AccountService;
use crate::config::Config;
use bytes::Bytes;
use std::sync::Arc;
use study_notes_core::ports::{FavoriteTable, NoteTable, ObjectStore};
use study_notes_core::{CatalogPorts, FeatureConfig, NoteDraft, UploadFile};

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub notes: Arc<dyn NoteTable>,
    pub favorites: Arc<dyn FavoriteTable>,
    pub store: Arc<dyn ObjectStore>,
    pub accounts: AccountService,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn catalog_ports(&self) -> CatalogPorts {
        CatalogPorts {
            notes: self.notes.clone(),
            favorites: self.favorites.clone(),
            store: self.store.clone(),
        }
    }

    pub fn features(&self) -> FeatureConfig {
        self.config.features
    }
}

//=========================================================================================
// PendingUpload (Specific to One WebSocket Connection)
//=========================================================================================

/// An upload announced with `begin_upload` whose bytes are still arriving as
/// binary frames.
#[derive(Debug)]
pub struct PendingUpload {
    pub title: String,
    pub subject: String,
    pub file_name: String,
    pub content_type: Option<String>,
    buffer: Vec<u8>,
}

impl PendingUpload {
    pub fn new(title: String, subject: String, file_name: String, content_type: Option<String>) -> Self {
        Self {
            title,
            subject,
            file_name,
            content_type,
            buffer: Vec::new(),
        }
    }

    /// Appends a chunk. Fails without appending if the total would exceed `limit`.
    pub fn push(&mut self, chunk: &[u8], limit: usize) -> Result<(), usize> {
        if self.buffer.len() + chunk.len() > limit {
            return Err(limit);
        }
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    pub fn into_draft(self) -> NoteDraft {
        NoteDraft {
            title: self.title,
            subject: self.subject,
            file: Some(UploadFile {
                file_name: self.file_name,
                content_type: self.content_type,
                bytes: Bytes::from(self.buffer),
            }),
        }
    }
}
