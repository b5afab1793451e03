//! In-memory stand-ins for the database and bucket, shared by the unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use study_notes_core::domain::{AuthSession, FavoriteMark, FavoriteRow, Identity, NewNote, Note, Role};
use study_notes_core::ports::{FavoriteTable, NoteTable, ObjectStore, PortError, PortResult};
use uuid::Uuid;

use crate::accounts::{hash_password, AccountService, AccountSettings, AccountStore, NewAccount, UserCredentials};

pub const ADMIN_EMAIL: &str = "admin@school.edu";

pub fn account_service(store: Arc<MemoryAccounts>) -> AccountService {
    AccountService::new(
        store,
        AccountSettings {
            admin_emails: vec![ADMIN_EMAIL.to_string()],
            session_ttl: Duration::days(30),
            app_base_url: "http://localhost:3000".to_string(),
        },
    )
}

//=========================================================================================
// Accounts
//=========================================================================================

struct Account {
    credentials: UserCredentials,
    verification_token: Option<String>,
}

#[derive(Default)]
struct AccountsInner {
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, AuthSession>,
}

#[derive(Default)]
pub struct MemoryAccounts {
    inner: Mutex<AccountsInner>,
}

impl MemoryAccounts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_verified(&self, email: &str, password: &str, role: Role) -> Identity {
        let identity = Identity {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            role,
        };
        self.inner.lock().unwrap().accounts.insert(
            email.to_string(),
            Account {
                credentials: UserCredentials {
                    identity: identity.clone(),
                    hashed_password: hash_password(password).unwrap(),
                    email_verified: true,
                },
                verification_token: None,
            },
        );
        identity
    }

    pub fn verification_token(&self, email: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .get(email)
            .and_then(|a| a.verification_token.clone())
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.inner.lock().unwrap().sessions.contains_key(session_id)
    }

    /// Moves a session's expiry into the past.
    pub fn expire(&self, session_id: &str) {
        if let Some(session) = self.inner.lock().unwrap().sessions.get_mut(session_id) {
            session.expires_at = Utc::now() - Duration::seconds(1);
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccounts {
    async fn create_account(&self, account: NewAccount) -> PortResult<Identity> {
        let mut inner = self.inner.lock().unwrap();
        if inner.accounts.contains_key(&account.email) {
            return Err(PortError::Rejected("User already registered".to_string()));
        }
        let identity = Identity {
            user_id: Uuid::new_v4(),
            email: account.email.clone(),
            role: account.role,
        };
        inner.accounts.insert(
            account.email,
            Account {
                credentials: UserCredentials {
                    identity: identity.clone(),
                    hashed_password: account.hashed_password,
                    email_verified: false,
                },
                verification_token: Some(account.verification_token),
            },
        );
        Ok(identity)
    }

    async fn get_credentials(&self, email: &str) -> PortResult<UserCredentials> {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .get(email)
            .map(|a| a.credentials.clone())
            .ok_or_else(|| PortError::NotFound(format!("User {email} not found")))
    }

    async fn verify_email(&self, token: &str) -> PortResult<Identity> {
        let mut inner = self.inner.lock().unwrap();
        let account = inner
            .accounts
            .values_mut()
            .find(|a| a.verification_token.as_deref() == Some(token))
            .ok_or_else(|| PortError::NotFound("Verification link is invalid or already used".to_string()))?;
        account.verification_token = None;
        account.credentials.email_verified = true;
        Ok(account.credentials.identity.clone())
    }

    async fn create_auth_session(&self, session_id: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> PortResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let identity = inner
            .accounts
            .values()
            .map(|a| &a.credentials.identity)
            .find(|i| i.user_id == user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {user_id} not found")))?;
        inner.sessions.insert(
            session_id.to_string(),
            AuthSession {
                id: session_id.to_string(),
                identity,
                expires_at,
            },
        );
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<AuthSession> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .get(session_id)
            .filter(|s| s.expires_at > Utc::now())
            .cloned()
            .ok_or_else(|| PortError::NotFound("Session not found or expired".to_string()))
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.inner.lock().unwrap().sessions.remove(session_id);
        Ok(())
    }

    async fn delete_expired_sessions(&self) -> PortResult<Vec<String>> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let expired: Vec<String> = inner
            .sessions
            .values()
            .filter(|s| s.expires_at <= now)
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            inner.sessions.remove(id);
        }
        Ok(expired)
    }
}

//=========================================================================================
// Notes, favorites and the bucket
//=========================================================================================

#[derive(Default)]
struct CatalogInner {
    notes: Vec<Note>,
    marks: Vec<FavoriteMark>,
    objects: HashMap<String, Bytes>,
    fail_reads: bool,
}

#[derive(Default)]
pub struct MemoryCatalog {
    inner: Mutex<CatalogInner>,
}

impl MemoryCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_note(&self, title: &str, subject: &str, minutes_ago: i64) -> Note {
        let id = Uuid::new_v4();
        let note = Note {
            id,
            title: title.to_string(),
            subject: subject.to_string(),
            file_url: format!("https://files.test/study-materials/{id}.pdf"),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        };
        self.inner.lock().unwrap().notes.push(note.clone());
        note
    }

    pub fn fail_note_reads(&self, fail: bool) {
        self.inner.lock().unwrap().fail_reads = fail;
    }

    pub fn marks(&self) -> Vec<FavoriteMark> {
        self.inner.lock().unwrap().marks.clone()
    }

    pub fn object_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn note_count(&self) -> usize {
        self.inner.lock().unwrap().notes.len()
    }
}

#[async_trait]
impl NoteTable for MemoryCatalog {
    async fn list_newest_first(&self) -> PortResult<Vec<Note>> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_reads {
            return Err(PortError::Unexpected("connection reset".to_string()));
        }
        let mut notes = inner.notes.clone();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    async fn get(&self, id: Uuid) -> PortResult<Note> {
        self.inner
            .lock()
            .unwrap()
            .notes
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Note {id} not found")))
    }

    async fn insert(&self, note: NewNote) -> PortResult<Note> {
        let note = Note {
            id: Uuid::new_v4(),
            title: note.title,
            subject: note.subject,
            file_url: note.file_url,
            created_at: Utc::now(),
        };
        self.inner.lock().unwrap().notes.push(note.clone());
        Ok(note)
    }

    async fn delete(&self, id: Uuid) -> PortResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.notes.len();
        inner.notes.retain(|n| n.id != id);
        if inner.notes.len() == before {
            return Err(PortError::NotFound(format!("Note {id} not found")));
        }
        inner.marks.retain(|m| m.note_id != id);
        Ok(())
    }
}

#[async_trait]
impl FavoriteTable for MemoryCatalog {
    async fn list_for_user(&self, user_id: Uuid) -> PortResult<Vec<FavoriteRow>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .marks
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| FavoriteRow {
                mark: *m,
                note: inner.notes.iter().find(|n| n.id == m.note_id).cloned(),
            })
            .collect())
    }

    async fn insert(&self, mark: FavoriteMark) -> PortResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.marks.contains(&mark) {
            inner.marks.push(mark);
        }
        Ok(())
    }

    async fn delete(&self, mark: FavoriteMark) -> PortResult<()> {
        self.inner.lock().unwrap().marks.retain(|m| *m != mark);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryCatalog {
    async fn store(&self, object_name: &str, bytes: Bytes, _content_type: Option<&str>) -> PortResult<()> {
        self.inner
            .lock()
            .unwrap()
            .objects
            .insert(object_name.to_string(), bytes);
        Ok(())
    }

    fn public_url(&self, object_name: &str) -> String {
        format!("https://files.test/study-materials/{object_name}")
    }

    async fn remove(&self, object_name: &str) -> PortResult<()> {
        self.inner.lock().unwrap().objects.remove(object_name);
        Ok(())
    }
}
