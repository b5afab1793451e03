//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `NoteTable` and `FavoriteTable` ports from the core crate and of the service's
//! `AccountStore`. It handles all interactions with PostgreSQL using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use study_notes_core::domain::{AuthSession, FavoriteMark, FavoriteRow, Identity, NewNote, Note, Role};
use study_notes_core::ports::{FavoriteTable, NoteTable, PortError, PortResult};
use tracing::warn;
use uuid::Uuid;

use crate::accounts::{AccountStore, NewAccount, UserCredentials};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the table ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn parse_role(raw: &str) -> Role {
    raw.parse().unwrap_or_else(|e| {
        warn!("{e}, treating the account as a student");
        Role::Student
    })
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct NoteRecord {
    id: Uuid,
    title: String,
    subject: String,
    file_url: String,
    created_at: DateTime<Utc>,
}
impl NoteRecord {
    fn to_domain(self) -> Note {
        Note {
            id: self.id,
            title: self.title,
            subject: self.subject,
            file_url: self.file_url,
            created_at: self.created_at,
        }
    }
}

/// A favorites row left-joined with its note; the note columns are null when
/// the note is gone.
#[derive(FromRow)]
struct FavoriteRecord {
    user_id: Uuid,
    note_id: Uuid,
    title: Option<String>,
    subject: Option<String>,
    file_url: Option<String>,
    created_at: Option<DateTime<Utc>>,
}
impl FavoriteRecord {
    fn to_domain(self) -> FavoriteRow {
        let note = match (self.title, self.subject, self.file_url, self.created_at) {
            (Some(title), Some(subject), Some(file_url), Some(created_at)) => Some(Note {
                id: self.note_id,
                title,
                subject,
                file_url,
                created_at,
            }),
            _ => None,
        };
        FavoriteRow {
            mark: FavoriteMark {
                user_id: self.user_id,
                note_id: self.note_id,
            },
            note,
        }
    }
}

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
    role: String,
}
impl UserRecord {
    fn to_domain(self) -> Identity {
        Identity {
            user_id: self.user_id,
            email: self.email,
            role: parse_role(&self.role),
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    role: String,
    hashed_password: String,
    email_verified: bool,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            identity: Identity {
                user_id: self.user_id,
                email: self.email,
                role: parse_role(&self.role),
            },
            hashed_password: self.hashed_password,
            email_verified: self.email_verified,
        }
    }
}

#[derive(FromRow)]
struct SessionRecord {
    id: String,
    expires_at: DateTime<Utc>,
    user_id: Uuid,
    email: String,
    role: String,
}
impl SessionRecord {
    fn to_domain(self) -> AuthSession {
        AuthSession {
            id: self.id,
            identity: Identity {
                user_id: self.user_id,
                email: self.email,
                role: parse_role(&self.role),
            },
            expires_at: self.expires_at,
        }
    }
}

//=========================================================================================
// Table Port Implementations
//=========================================================================================

#[async_trait]
impl NoteTable for DbAdapter {
    async fn list_newest_first(&self) -> PortResult<Vec<Note>> {
        let records = sqlx::query_as::<_, NoteRecord>(
            "SELECT id, title, subject, file_url, created_at FROM notes ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get(&self, id: Uuid) -> PortResult<Note> {
        let record = sqlx::query_as::<_, NoteRecord>(
            "SELECT id, title, subject, file_url, created_at FROM notes WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Note {} not found", id)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn insert(&self, note: NewNote) -> PortResult<Note> {
        let record = sqlx::query_as::<_, NoteRecord>(
            "INSERT INTO notes (id, title, subject, file_url) VALUES ($1, $2, $3, $4) \
             RETURNING id, title, subject, file_url, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&note.title)
        .bind(&note.subject)
        .bind(&note.file_url)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn delete(&self, id: Uuid) -> PortResult<()> {
        // Favorites pointing at the note go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Note {} not found", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl FavoriteTable for DbAdapter {
    async fn list_for_user(&self, user_id: Uuid) -> PortResult<Vec<FavoriteRow>> {
        let records = sqlx::query_as::<_, FavoriteRecord>(
            "SELECT f.user_id, f.note_id, n.title, n.subject, n.file_url, n.created_at \
             FROM favorites f LEFT JOIN notes n ON n.id = f.note_id \
             WHERE f.user_id = $1 ORDER BY f.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn insert(&self, mark: FavoriteMark) -> PortResult<()> {
        sqlx::query("INSERT INTO favorites (user_id, note_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(mark.user_id)
            .bind(mark.note_id)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    PortError::NotFound(format!("Note {} not found", mark.note_id))
                }
                _ => unexpected(e),
            })?;
        Ok(())
    }

    async fn delete(&self, mark: FavoriteMark) -> PortResult<()> {
        sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND note_id = $2")
            .bind(mark.user_id)
            .bind(mark.note_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `AccountStore` Implementation
//=========================================================================================

#[async_trait]
impl AccountStore for DbAdapter {
    async fn create_account(&self, account: NewAccount) -> PortResult<Identity> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password, display_name, role, verification_token) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING user_id, email, role",
        )
        .bind(Uuid::new_v4())
        .bind(&account.email)
        .bind(&account.hashed_password)
        .bind(&account.display_name)
        .bind(account.role.as_str())
        .bind(&account.verification_token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortError::Rejected("User already registered".to_string())
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_credentials(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, role, hashed_password, email_verified FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn verify_email(&self, token: &str) -> PortResult<Identity> {
        let record = sqlx::query_as::<_, UserRecord>(
            "UPDATE users SET email_verified = TRUE, verification_token = NULL \
             WHERE verification_token = $1 RETURNING user_id, email, role",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound("Verification link is invalid or already used".to_string()),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(&self, session_id: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<AuthSession> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT s.id, s.expires_at, u.user_id, u.email, u.role \
             FROM auth_sessions s JOIN users u ON u.user_id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > now()",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound("Session not found or expired".to_string()),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn delete_expired_sessions(&self) -> PortResult<Vec<String>> {
        sqlx::query_scalar::<_, String>("DELETE FROM auth_sessions WHERE expires_at <= now() RETURNING id")
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)
    }
}
