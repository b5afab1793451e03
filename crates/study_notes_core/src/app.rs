//! crates/study_notes_core/src/app.rs
//!
//! The notes screen: composes the session gate and the catalog, and keeps the
//! catalog in step with identity changes.

use std::sync::Arc;
use tracing::warn;

use crate::catalog::{CatalogEngine, CatalogPorts, DeleteOutcome, FavoriteToggle, Reloaded};
use crate::category::Category;
use crate::domain::{DeleteRequest, Identity, Note, NoteDraft, SessionEvent, SignUpProfile};
use crate::error::ScreenError;
use crate::features::{FavoritesMode, FeatureConfig};
use crate::gate::{SessionGate, Transition, VerificationPending};
use crate::ports::AuthProvider;
use uuid::Uuid;

pub struct StudyApp {
    gate: SessionGate,
    catalog: CatalogEngine,
}

impl StudyApp {
    pub fn new(auth: Arc<dyn AuthProvider>, ports: CatalogPorts, features: FeatureConfig) -> Self {
        Self {
            gate: SessionGate::new(auth),
            catalog: CatalogEngine::new(ports, features),
        }
    }

    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    pub fn catalog(&self) -> &CatalogEngine {
        &self.catalog
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.gate.identity()
    }

    /// Restores any existing session and loads the notes. Failures are returned
    /// for display; the screen stays usable with whatever could be loaded.
    pub async fn start(&mut self) -> Vec<ScreenError> {
        let mut notices = Vec::new();
        match self.gate.restore().await {
            Ok(transition) => {
                if let Err(e) = self.follow(transition).await {
                    notices.push(e);
                }
            }
            Err(e) => notices.push(e.into()),
        }
        if let Err(e) = self.catalog.load_notes().await {
            notices.push(e.into());
        }
        notices
    }

    //--- Identity -------------------------------------------------------------------------

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<(), ScreenError> {
        let transition = self.gate.sign_in(email, password).await?;
        self.follow(transition).await
    }

    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
        profile: &SignUpProfile,
    ) -> Result<VerificationPending, ScreenError> {
        Ok(self.gate.sign_up(email, password, profile).await?)
    }

    pub async fn sign_out(&mut self) -> Result<(), ScreenError> {
        let transition = self.gate.sign_out().await?;
        self.follow(transition).await
    }

    /// Applies a notification from the auth collaborator's subscription.
    pub async fn handle_session_event(&mut self, event: SessionEvent) -> Result<(), ScreenError> {
        let transition = self.gate.apply(event);
        self.follow(transition).await
    }

    async fn follow(&mut self, transition: Transition) -> Result<(), ScreenError> {
        match transition {
            Transition::SignedIn(identity) => {
                let user_id = identity.user_id;
                // Local favorites belong to the visitor, not the account.
                if self.catalog.features().favorites == FavoritesMode::Synced {
                    self.catalog.clear_favorites();
                }
                self.catalog.set_viewer(Some(identity));
                if let Err(e) = self.catalog.load_favorites(user_id).await {
                    warn!(error = %e, %user_id, "Failed to load favorites");
                    return Err(e.into());
                }
            }
            Transition::SignedOut => {
                self.catalog.set_viewer(None);
                self.catalog.clear_favorites();
            }
            Transition::Unchanged => {}
        }
        Ok(())
    }

    //--- Catalog --------------------------------------------------------------------------

    pub fn select_category(&mut self, category: Category) -> Result<(), ScreenError> {
        Ok(self.catalog.select_category(category)?)
    }

    pub fn search(&mut self, term: impl Into<String>) {
        self.catalog.set_search_term(term);
    }

    pub async fn refresh(&mut self) -> Result<(), ScreenError> {
        Ok(self.catalog.load_notes().await?)
    }

    pub async fn toggle_favorite(&mut self, note_id: Uuid) -> Result<FavoriteToggle, ScreenError> {
        Ok(self.catalog.toggle_favorite(note_id).await?)
    }

    pub async fn upload(&mut self, draft: NoteDraft) -> Result<Reloaded<Note>, ScreenError> {
        Ok(self.catalog.upload(draft).await?)
    }

    pub async fn delete_note(&mut self, request: DeleteRequest) -> Result<Reloaded<DeleteOutcome>, ScreenError> {
        Ok(self.catalog.delete_note(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use crate::error::CatalogError;
    use crate::testing::MemoryBackend;
    use futures::StreamExt;

    fn app(backend: &Arc<MemoryBackend>) -> StudyApp {
        StudyApp::new(backend.clone(), backend.catalog_ports(), FeatureConfig::default())
    }

    #[tokio::test]
    async fn test_start_restores_session_and_loads_favorites() {
        let backend = MemoryBackend::new();
        let user = backend.add_account("student@test", "pw", Role::Student);
        let note = backend.seed_note("Bio Ch1", "Biology");
        backend.seed_note("Optics", "Physics");
        backend.seed_mark(user.user_id, note.id);
        backend.restore_session(user.clone());

        let mut app = app(&backend);
        assert!(app.start().await.is_empty());
        assert_eq!(app.identity(), Some(&user));
        assert_eq!(app.catalog().notes().len(), 2);
        assert!(app.catalog().favorites().contains(note.id));
    }

    #[tokio::test]
    async fn test_start_survives_note_load_failure() {
        let backend = MemoryBackend::new();
        backend.fail_note_reads(true);
        let mut app = app(&backend);

        let notices = app.start().await;
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind(), "remote");
        assert!(app.catalog().notes().is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_clears_favorites_without_remote_deletes() {
        let backend = MemoryBackend::new();
        let user = backend.add_account("student@test", "pw", Role::Student);
        let note = backend.seed_note("Bio Ch1", "Biology");
        let mut app = app(&backend);
        app.start().await;
        app.sign_in("student@test", "pw").await.unwrap();
        app.toggle_favorite(note.id).await.unwrap();

        app.sign_out().await.unwrap();
        assert!(app.identity().is_none());
        assert!(app.catalog().favorites().is_empty());
        assert_eq!(backend.marks(), vec![crate::domain::FavoriteMark { user_id: user.user_id, note_id: note.id }]);
        assert!(!backend.calls().contains(&"favorites.delete".to_string()));
    }

    #[tokio::test]
    async fn test_sign_in_resyncs_favorites() {
        let backend = MemoryBackend::new();
        let user = backend.add_account("student@test", "pw", Role::Student);
        let note = backend.seed_note("Bio Ch1", "Biology");
        backend.seed_mark(user.user_id, note.id);
        let mut app = app(&backend);
        app.start().await;
        assert!(app.catalog().favorites().is_empty());

        app.sign_in("student@test", "pw").await.unwrap();
        assert!(app.catalog().favorites().contains(note.id));
        assert!(app.catalog().view().cards[0].is_favorite);
    }

    #[tokio::test]
    async fn test_session_events_are_applied_at_any_time() {
        let backend = MemoryBackend::new();
        let user = backend.add_account("student@test", "pw", Role::Student);
        let mut app = app(&backend);
        app.start().await;
        let mut changes = app.gate().session_changes();

        backend.emit(SessionEvent::SignedIn(user.clone()));
        let event = changes.next().await.unwrap();
        app.handle_session_event(event).await.unwrap();
        assert_eq!(app.identity(), Some(&user));

        backend.emit(SessionEvent::TokenExpired);
        let event = changes.next().await.unwrap();
        app.handle_session_event(event).await.unwrap();
        assert!(app.identity().is_none());
        assert!(app.catalog().view().viewer.is_none());
    }

    #[tokio::test]
    async fn test_sign_in_keeps_local_favorites() {
        let backend = MemoryBackend::new();
        backend.add_account("student@test", "pw", Role::Student);
        let note = backend.seed_note("Bio Ch1", "Biology");
        let features = FeatureConfig {
            favorites: FavoritesMode::Local,
            ..FeatureConfig::default()
        };
        let mut app = StudyApp::new(backend.clone(), backend.catalog_ports(), features);
        app.start().await;
        app.toggle_favorite(note.id).await.unwrap();

        app.sign_in("student@test", "pw").await.unwrap();
        assert!(app.catalog().favorites().contains(note.id));
        assert!(backend.marks().is_empty());
    }

    #[tokio::test]
    async fn test_admin_can_upload_after_sign_in() {
        let backend = MemoryBackend::new();
        backend.add_account("admin@test", "pw", Role::Admin);
        let mut app = app(&backend);
        app.start().await;

        let draft = || NoteDraft {
            title: "Bio Ch1".into(),
            subject: "Biology".into(),
            file: Some(crate::domain::UploadFile {
                file_name: "bio.pdf".into(),
                content_type: None,
                bytes: bytes::Bytes::from_static(b"%PDF"),
            }),
        };
        let err = app.upload(draft()).await.unwrap_err();
        assert!(matches!(err, ScreenError::Catalog(CatalogError::Unauthorized(_))));

        app.sign_in("admin@test", "pw").await.unwrap();
        assert!(app.catalog().view().can_manage);
        app.upload(draft()).await.unwrap();
        assert_eq!(app.catalog().notes().len(), 1);
    }
}
