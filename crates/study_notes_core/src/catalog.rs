//! crates/study_notes_core/src/catalog.rs
//!
//! The note catalog: owns the note list and the favorites set, recomputes the
//! visible notes after every change and publishes them to subscribers.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::category::Category;
use crate::domain::{DeleteRequest, FavoriteMark, Identity, NewNote, Note, NoteDraft, UploadFile};
use crate::error::{CatalogError, DraftField, ValidationError};
use crate::features::{FavoritesMode, FeatureConfig};
use crate::filter::{compute_visible, FavoriteSet};
use crate::ports::{FavoriteTable, NoteTable, ObjectStore, PortError};

//=========================================================================================
// Views and Ports
//=========================================================================================

/// One card of the note grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteCard {
    pub note: Note,
    pub is_favorite: bool,
}

/// A snapshot of everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogView {
    pub viewer: Option<Identity>,
    pub categories: Vec<Category>,
    pub category: Category,
    pub search_term: String,
    /// Set while an upload or delete is in flight.
    pub busy: bool,
    pub can_manage: bool,
    pub total_notes: usize,
    pub cards: Vec<NoteCard>,
}

/// The table and storage collaborators the catalog talks to.
#[derive(Clone)]
pub struct CatalogPorts {
    pub notes: Arc<dyn NoteTable>,
    pub favorites: Arc<dyn FavoriteTable>,
    pub store: Arc<dyn ObjectStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteToggle {
    Added,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The user declined the confirmation; nothing was touched.
    Cancelled,
}

/// A completed mutation together with the note reload that followed it.
/// A failed reload leaves the previous list in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reloaded<T> {
    pub value: T,
    pub refresh: Result<(), CatalogError>,
}

//=========================================================================================
// Upload and Delete Pipelines
//=========================================================================================

/// An upload form with every required field present.
#[derive(Debug, Clone)]
pub struct ValidDraft {
    pub title: String,
    pub subject: String,
    pub file: UploadFile,
}

/// Checks that title, subject and file are all present.
pub fn validate_draft(draft: NoteDraft) -> Result<ValidDraft, ValidationError> {
    let title = draft.title.trim().to_string();
    let subject = draft.subject.trim().to_string();
    let file = draft
        .file
        .filter(|f| !f.file_name.trim().is_empty() && !f.bytes.is_empty());

    let mut missing = Vec::new();
    if title.is_empty() {
        missing.push(DraftField::Title);
    }
    if subject.is_empty() {
        missing.push(DraftField::Subject);
    }
    match file {
        Some(file) if missing.is_empty() => Ok(ValidDraft { title, subject, file }),
        Some(_) => Err(ValidationError { missing }),
        None => {
            missing.push(DraftField::File);
            Err(ValidationError { missing })
        }
    }
}

/// Builds the storage name for an uploaded file: `<unix millis>_<original name>`,
/// with path components dropped and unsafe characters replaced.
pub fn object_name_for(file_name: &str, now: DateTime<Utc>) -> String {
    let base = file_name
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or_default()
        .trim();
    let mut cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        cleaned = "file".to_string();
    }
    format!("{}_{}", now.timestamp_millis(), cleaned)
}

/// The stored object's name: the trailing path segment of its public URL.
pub fn object_name_from_url(file_url: &str) -> Option<&str> {
    let path = file_url.split(&['?', '#'][..]).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && !name.contains(':'))
}

/// Stores the file, resolves its public address and inserts the note row.
///
/// Every step's failure ends the pipeline. A file stored before a failed insert
/// is left in place.
pub async fn publish_note(
    store: &dyn ObjectStore,
    notes: &dyn NoteTable,
    draft: NoteDraft,
) -> Result<Note, CatalogError> {
    let draft = validate_draft(draft)?;
    let object_name = object_name_for(&draft.file.file_name, Utc::now());

    store
        .store(&object_name, draft.file.bytes, draft.file.content_type.as_deref())
        .await?;
    let file_url = store.public_url(&object_name);

    let note = notes
        .insert(NewNote {
            title: draft.title,
            subject: draft.subject,
            file_url,
        })
        .await?;
    info!(note_id = %note.id, object = %object_name, "Published note");
    Ok(note)
}

/// Removes the stored file, then the note row. A failure in the second step
/// does not restore the file.
pub async fn remove_note(
    store: &dyn ObjectStore,
    notes: &dyn NoteTable,
    id: Uuid,
    file_url: &str,
) -> Result<(), CatalogError> {
    let object_name = object_name_from_url(file_url)
        .ok_or_else(|| PortError::NotFound(format!("No stored object in '{file_url}'")))?;
    store.remove(object_name).await?;
    notes.delete(id).await?;
    info!(note_id = %id, object = %object_name, "Removed note");
    Ok(())
}

//=========================================================================================
// The Catalog Engine
//=========================================================================================

pub struct CatalogEngine {
    ports: CatalogPorts,
    features: FeatureConfig,
    notes: Vec<Note>,
    favorites: FavoriteSet,
    category: Category,
    search_term: String,
    viewer: Option<Identity>,
    busy: bool,
    view_tx: watch::Sender<CatalogView>,
}

impl CatalogEngine {
    pub fn new(ports: CatalogPorts, features: FeatureConfig) -> Self {
        let (view_tx, _) = watch::channel(CatalogView::default());
        let engine = Self {
            ports,
            features,
            notes: Vec::new(),
            favorites: FavoriteSet::new(),
            category: Category::All,
            search_term: String::new(),
            viewer: None,
            busy: false,
            view_tx,
        };
        engine.publish();
        engine
    }

    /// Receives a fresh [`CatalogView`] after every change.
    pub fn subscribe(&self) -> watch::Receiver<CatalogView> {
        self.view_tx.subscribe()
    }

    pub fn features(&self) -> &FeatureConfig {
        &self.features
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn note(&self, id: Uuid) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn favorites(&self) -> &FavoriteSet {
        &self.favorites
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn visible(&self) -> Vec<&Note> {
        compute_visible(&self.notes, &self.favorites, self.category, &self.search_term)
    }

    pub fn view(&self) -> CatalogView {
        let cards = self
            .visible()
            .into_iter()
            .map(|note| NoteCard {
                is_favorite: self.favorites.contains(note.id),
                note: note.clone(),
            })
            .collect();
        CatalogView {
            viewer: self.viewer.clone(),
            categories: self.features.categories(),
            category: self.category,
            search_term: self.search_term.clone(),
            busy: self.busy,
            can_manage: self.require_admin().is_ok(),
            total_notes: self.notes.len(),
            cards,
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view());
    }

    //--- Local UI state -------------------------------------------------------------------

    pub fn select_category(&mut self, category: Category) -> Result<(), CatalogError> {
        if !self.features.offers(category) {
            return Err(CatalogError::CategoryUnavailable(category));
        }
        self.category = category;
        self.publish();
        Ok(())
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
        self.publish();
    }

    /// Records who is looking at the catalog. Called by the session gate.
    pub fn set_viewer(&mut self, viewer: Option<Identity>) {
        self.viewer = viewer;
        self.publish();
    }

    /// Forgets the favorites held in memory. Remote marks are untouched.
    pub fn clear_favorites(&mut self) {
        self.favorites.clear();
        if self.category == Category::Favorites {
            self.category = Category::All;
        }
        self.publish();
    }

    //--- Loading --------------------------------------------------------------------------

    /// Replaces the note list with the table's contents. On failure the
    /// previous list stays in place and the error is returned for display.
    pub async fn load_notes(&mut self) -> Result<(), CatalogError> {
        match self.ports.notes.list_newest_first().await {
            Ok(mut notes) => {
                notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                debug!(count = notes.len(), "Loaded notes");
                self.notes = notes;
                self.publish();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, cached = self.notes.len(), "Failed to load notes, keeping the cached list");
                Err(e.into())
            }
        }
    }

    /// Replaces the favorites set with the user's marks. Marks pointing at
    /// deleted notes are dropped.
    pub async fn load_favorites(&mut self, user_id: Uuid) -> Result<(), CatalogError> {
        if self.features.favorites != FavoritesMode::Synced {
            return Ok(());
        }
        let rows = self.ports.favorites.list_for_user(user_id).await?;
        let total = rows.len();
        let live: Vec<Note> = rows.into_iter().filter_map(|row| row.note).collect();
        if live.len() < total {
            debug!(dropped = total - live.len(), "Ignoring favorites of deleted notes");
        }
        self.favorites.replace(live);
        self.publish();
        Ok(())
    }

    //--- Mutations ------------------------------------------------------------------------

    /// Marks or unmarks a note. In synced mode the local change is applied
    /// first and reverted if the remote write fails.
    pub async fn toggle_favorite(&mut self, note_id: Uuid) -> Result<FavoriteToggle, CatalogError> {
        let user_id = match self.features.favorites {
            FavoritesMode::Disabled => return Err(CatalogError::Unauthorized("favorites are disabled")),
            FavoritesMode::Local => None,
            FavoritesMode::Synced => Some(
                self.viewer
                    .as_ref()
                    .map(|v| v.user_id)
                    .ok_or(CatalogError::Unauthorized("sign in to save favorites"))?,
            ),
        };

        if let Some(previous) = self.favorites.remove(note_id) {
            self.publish();
            if let Some(user_id) = user_id {
                let mark = FavoriteMark { user_id, note_id };
                if let Err(e) = self.ports.favorites.delete(mark).await {
                    warn!(error = %e, %note_id, "Failed to remove favorite, restoring it");
                    self.favorites.insert(previous);
                    self.publish();
                    return Err(e.into());
                }
            }
            return Ok(FavoriteToggle::Removed);
        }

        let note = self
            .note(note_id)
            .cloned()
            .ok_or(CatalogError::UnknownNote(note_id))?;
        self.favorites.insert(note);
        self.publish();
        if let Some(user_id) = user_id {
            let mark = FavoriteMark { user_id, note_id };
            if let Err(e) = self.ports.favorites.insert(mark).await {
                warn!(error = %e, %note_id, "Failed to add favorite, reverting");
                self.favorites.remove(note_id);
                self.publish();
                return Err(e.into());
            }
        }
        Ok(FavoriteToggle::Added)
    }

    /// Uploads a new note and reloads the list.
    pub async fn upload(&mut self, draft: NoteDraft) -> Result<Reloaded<Note>, CatalogError> {
        self.require_admin()?;
        self.set_busy(true);
        let result = publish_note(self.ports.store.as_ref(), self.ports.notes.as_ref(), draft).await;
        self.set_busy(false);
        let note = result?;
        let refresh = self.load_notes().await;
        Ok(Reloaded { value: note, refresh })
    }

    /// Deletes a note and its stored file, then reloads the list.
    pub async fn delete_note(&mut self, request: DeleteRequest) -> Result<Reloaded<DeleteOutcome>, CatalogError> {
        self.require_admin()?;
        if !request.confirmed {
            return Ok(Reloaded {
                value: DeleteOutcome::Cancelled,
                refresh: Ok(()),
            });
        }
        self.set_busy(true);
        let result = remove_note(
            self.ports.store.as_ref(),
            self.ports.notes.as_ref(),
            request.id,
            &request.file_url,
        )
        .await;
        self.set_busy(false);
        // Reload regardless: a half-finished delete may still have removed the row.
        let refresh = self.load_notes().await;
        result?;
        Ok(Reloaded {
            value: DeleteOutcome::Deleted,
            refresh,
        })
    }

    fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
        self.publish();
    }

    fn require_admin(&self) -> Result<&Identity, CatalogError> {
        if !self.features.admin_panel {
            return Err(CatalogError::Unauthorized("the admin panel is disabled"));
        }
        match &self.viewer {
            Some(identity) if identity.is_admin() => Ok(identity),
            Some(_) => Err(CatalogError::Unauthorized("only admins can manage notes")),
            None => Err(CatalogError::Unauthorized("sign in as an admin to manage notes")),
        }
    }
}
