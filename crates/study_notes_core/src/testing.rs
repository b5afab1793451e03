//! crates/study_notes_core/src/testing.rs
//!
//! An in-memory stand-in for the persistence collaborator, used by the unit tests.
//! It records every remote call and can be told to fail specific ones.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::catalog::CatalogPorts;
use crate::domain::{
    AuthSession, FavoriteMark, FavoriteRow, Identity, NewNote, Note, Role, SessionEvent, SignUpProfile,
};
use crate::ports::{
    session_event_stream, AuthProvider, FavoriteTable, NoteTable, ObjectStore, PortError, PortResult,
    SessionEventStream,
};

struct Account {
    password: String,
    identity: Identity,
    verified: bool,
}

#[derive(Default)]
struct Inner {
    notes: Vec<Note>,
    marks: Vec<FavoriteMark>,
    objects: BTreeMap<String, Bytes>,
    accounts: BTreeMap<String, Account>,
    session: Option<AuthSession>,
    calls: Vec<String>,
    ticks: i64,
    fail_note_reads: bool,
    fail_note_inserts: bool,
    fail_favorite_writes: bool,
}

impl Inner {
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(self.ticks)
    }
}

pub(crate) struct MemoryBackend {
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionEvent>,
}

impl MemoryBackend {
    pub(crate) fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            events,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn record(&self, call: &str) -> MutexGuard<'_, Inner> {
        let mut inner = self.lock();
        inner.calls.push(call.to_string());
        inner
    }

    pub(crate) fn catalog_ports(self: &Arc<Self>) -> CatalogPorts {
        CatalogPorts {
            notes: self.clone(),
            favorites: self.clone(),
            store: self.clone(),
        }
    }

    //--- Seeding --------------------------------------------------------------------------

    pub(crate) fn seed_note(&self, title: &str, subject: &str) -> Note {
        let mut inner = self.lock();
        let id = Uuid::new_v4();
        let note = Note {
            id,
            title: title.to_string(),
            subject: subject.to_string(),
            file_url: format!("https://files.test/notes/{id}.pdf"),
            created_at: inner.next_timestamp(),
        };
        inner.notes.push(note.clone());
        note
    }

    pub(crate) fn seed_mark(&self, user_id: Uuid, note_id: Uuid) {
        self.lock().marks.push(FavoriteMark { user_id, note_id });
    }

    /// Adds an already verified account.
    pub(crate) fn add_account(&self, email: &str, password: &str, role: Role) -> Identity {
        let identity = Identity {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            role,
        };
        self.lock().accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity: identity.clone(),
                verified: true,
            },
        );
        identity
    }

    pub(crate) fn verify(&self, email: &str) {
        if let Some(account) = self.lock().accounts.get_mut(email) {
            account.verified = true;
        }
    }

    /// Establishes a session as if it had been created in an earlier visit.
    pub(crate) fn restore_session(&self, identity: Identity) {
        self.lock().session = Some(AuthSession {
            id: Uuid::new_v4().to_string(),
            identity,
            expires_at: Utc::now() + Duration::days(1),
        });
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    //--- Failure injection ----------------------------------------------------------------

    pub(crate) fn fail_note_reads(&self, fail: bool) {
        self.lock().fail_note_reads = fail;
    }

    pub(crate) fn fail_note_inserts(&self, fail: bool) {
        self.lock().fail_note_inserts = fail;
    }

    pub(crate) fn fail_favorite_writes(&self, fail: bool) {
        self.lock().fail_favorite_writes = fail;
    }

    //--- Inspection -----------------------------------------------------------------------

    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn marks(&self) -> Vec<FavoriteMark> {
        self.lock().marks.clone()
    }

    pub(crate) fn object_names(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }
}

#[async_trait]
impl NoteTable for MemoryBackend {
    async fn list_newest_first(&self) -> PortResult<Vec<Note>> {
        let inner = self.record("notes.list");
        if inner.fail_note_reads {
            return Err(PortError::Unexpected("connection reset".to_string()));
        }
        let mut notes = inner.notes.clone();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    async fn get(&self, id: Uuid) -> PortResult<Note> {
        let inner = self.record("notes.get");
        inner
            .notes
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Note {id} not found")))
    }

    async fn insert(&self, note: NewNote) -> PortResult<Note> {
        let mut inner = self.record("notes.insert");
        if inner.fail_note_inserts {
            return Err(PortError::Unexpected("insert failed".to_string()));
        }
        let note = Note {
            id: Uuid::new_v4(),
            title: note.title,
            subject: note.subject,
            file_url: note.file_url,
            created_at: inner.next_timestamp(),
        };
        inner.notes.push(note.clone());
        Ok(note)
    }

    async fn delete(&self, id: Uuid) -> PortResult<()> {
        let mut inner = self.record("notes.delete");
        inner.notes.retain(|n| n.id != id);
        Ok(())
    }
}

#[async_trait]
impl FavoriteTable for MemoryBackend {
    async fn list_for_user(&self, user_id: Uuid) -> PortResult<Vec<FavoriteRow>> {
        let inner = self.record("favorites.list");
        Ok(inner
            .marks
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|mark| FavoriteRow {
                mark: *mark,
                note: inner.notes.iter().find(|n| n.id == mark.note_id).cloned(),
            })
            .collect())
    }

    async fn insert(&self, mark: FavoriteMark) -> PortResult<()> {
        let mut inner = self.record("favorites.insert");
        if inner.fail_favorite_writes {
            return Err(PortError::Unexpected("favorites unavailable".to_string()));
        }
        if !inner.marks.contains(&mark) {
            inner.marks.push(mark);
        }
        Ok(())
    }

    async fn delete(&self, mark: FavoriteMark) -> PortResult<()> {
        let mut inner = self.record("favorites.delete");
        if inner.fail_favorite_writes {
            return Err(PortError::Unexpected("favorites unavailable".to_string()));
        }
        inner.marks.retain(|m| *m != mark);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn store(&self, object_name: &str, bytes: Bytes, _content_type: Option<&str>) -> PortResult<()> {
        self.record("storage.store").objects.insert(object_name.to_string(), bytes);
        Ok(())
    }

    fn public_url(&self, object_name: &str) -> String {
        format!("https://files.test/study-materials/{object_name}")
    }

    async fn remove(&self, object_name: &str) -> PortResult<()> {
        self.record("storage.remove").objects.remove(object_name);
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn current_session(&self) -> PortResult<Option<AuthSession>> {
        Ok(self.record("auth.current_session").session.clone())
    }

    fn session_changes(&self) -> SessionEventStream {
        session_event_stream(self.events.subscribe())
    }

    async fn sign_up(&self, email: &str, password: &str, _profile: &SignUpProfile) -> PortResult<()> {
        let mut inner = self.record("auth.sign_up");
        if inner.accounts.contains_key(email) {
            return Err(PortError::Rejected("User already registered".to_string()));
        }
        inner.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity: Identity {
                    user_id: Uuid::new_v4(),
                    email: email.to_string(),
                    role: Role::Student,
                },
                verified: false,
            },
        );
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        let session = {
            let mut inner = self.record("auth.sign_in");
            let account = inner
                .accounts
                .get(email)
                .filter(|a| a.password == password)
                .ok_or_else(|| PortError::Rejected("Invalid login credentials".to_string()))?;
            if !account.verified {
                return Err(PortError::Rejected("Email not confirmed".to_string()));
            }
            let session = AuthSession {
                id: Uuid::new_v4().to_string(),
                identity: account.identity.clone(),
                expires_at: Utc::now() + Duration::days(1),
            };
            inner.session = Some(session.clone());
            session
        };
        self.emit(SessionEvent::SignedIn(session.identity.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> PortResult<()> {
        self.record("auth.sign_out").session = None;
        self.emit(SessionEvent::SignedOut);
        Ok(())
    }
}
