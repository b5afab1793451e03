//! services/api/src/accounts.rs
//!
//! Password accounts and login sessions: the storage contract, argon2 hashing,
//! the sign-up/login/logout rules, and the hub that broadcasts session changes
//! to open screens.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::sync::{Arc, Mutex, OnceLock};
use study_notes_core::ports::{PortError, PortResult, SessionEventStream};
use study_notes_core::{AuthSession, Identity, Role, SessionEvent, SignUpProfile};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

//=========================================================================================
// Storage Contract
//=========================================================================================

/// Only used internally for login - contains sensitive data.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub identity: Identity,
    pub hashed_password: String,
    pub email_verified: bool,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub hashed_password: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub verification_token: String,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with `PortError::Rejected` if the e-mail is already registered.
    async fn create_account(&self, account: NewAccount) -> PortResult<Identity>;

    async fn get_credentials(&self, email: &str) -> PortResult<UserCredentials>;

    /// Marks the account owning `token` as verified and consumes the token.
    async fn verify_email(&self, token: &str) -> PortResult<Identity>;

    async fn create_auth_session(&self, session_id: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> PortResult<()>;

    /// Returns the session with its identity, or `NotFound` if it is unknown or expired.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<AuthSession>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    /// Deletes every expired session and returns their ids.
    async fn delete_expired_sessions(&self) -> PortResult<Vec<String>>;
}

//=========================================================================================
// Passwords and Input Rules
//=========================================================================================

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn hash_password(password: &str) -> PortResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            PortError::Unexpected("Failed to hash password".to_string())
        })
}

pub fn verify_password(password: &str, hashed: &str) -> PortResult<bool> {
    let parsed_hash = PasswordHash::new(hashed).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        PortError::Unexpected("Authentication error".to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid"))
}

/// Trims and lower-cases an e-mail address, rejecting malformed ones.
pub fn normalize_email(email: &str) -> PortResult<String> {
    let email = email.trim().to_lowercase();
    if email_pattern().is_match(&email) {
        Ok(email)
    } else {
        Err(PortError::Rejected("Unable to validate email address: invalid format".to_string()))
    }
}

//=========================================================================================
// Session Hub
//=========================================================================================

#[derive(Debug, Clone)]
struct HubEvent {
    session_id: String,
    event: SessionEvent,
}

/// Fans session changes out to every open screen. Each screen only sees the
/// events of the session it currently holds.
#[derive(Clone)]
pub struct SessionHub {
    tx: broadcast::Sender<HubEvent>,
}

impl Default for SessionHub {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }
}

impl SessionHub {
    fn publish(&self, session_id: &str, event: SessionEvent) {
        // No receivers simply means no screen is open.
        let _ = self.tx.send(HubEvent {
            session_id: session_id.to_string(),
            event,
        });
    }

    /// A stream of the events concerning whichever session `current` holds at
    /// the time each event arrives.
    pub fn subscribe(&self, current: Arc<Mutex<Option<String>>>) -> SessionEventStream {
        let rx = self.tx.subscribe();
        Box::pin(futures::stream::unfold((rx, current), |(mut rx, current)| async move {
            loop {
                match rx.recv().await {
                    Ok(hub_event) => {
                        let matches = current
                            .lock()
                            .map(|held| held.as_deref() == Some(hub_event.session_id.as_str()))
                            .unwrap_or(false);
                        if matches {
                            return Some((hub_event.event, (rx, current)));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Session hub subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }
}

//=========================================================================================
// Account Service
//=========================================================================================

#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub admin_emails: Vec<String>,
    pub session_ttl: Duration,
    pub app_base_url: String,
}

/// Sign-up, verification, login and logout on top of an [`AccountStore`].
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    hub: SessionHub,
    settings: Arc<AccountSettings>,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>, settings: AccountSettings) -> Self {
        Self {
            store,
            hub: SessionHub::default(),
            settings: Arc::new(settings),
        }
    }

    pub fn hub(&self) -> &SessionHub {
        &self.hub
    }

    pub fn session_ttl(&self) -> Duration {
        self.settings.session_ttl
    }

    fn role_for(&self, email: &str) -> Role {
        if self.settings.admin_emails.iter().any(|admin| admin == email) {
            Role::Admin
        } else {
            Role::Student
        }
    }

    /// Creates an unverified account and logs its verification link.
    pub async fn register(&self, email: &str, password: &str, profile: &SignUpProfile) -> PortResult<Identity> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(PortError::Rejected(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let verification_token = Uuid::new_v4().simple().to_string();
        let identity = self
            .store
            .create_account(NewAccount {
                role: self.role_for(&email),
                email,
                hashed_password: hash_password(password)?,
                display_name: profile
                    .display_name
                    .as_ref()
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty()),
                verification_token: verification_token.clone(),
            })
            .await?;
        info!(
            user_id = %identity.user_id,
            "Account created, verification link: {}/auth/verify/{}",
            self.settings.app_base_url.trim_end_matches('/'),
            verification_token
        );
        Ok(identity)
    }

    pub async fn verify(&self, token: &str) -> PortResult<Identity> {
        let identity = self.store.verify_email(token).await?;
        info!(user_id = %identity.user_id, "E-mail verified");
        Ok(identity)
    }

    pub async fn login(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        let invalid = || PortError::Rejected("Invalid login credentials".to_string());
        let email = normalize_email(email).map_err(|_| invalid())?;
        let credentials = match self.store.get_credentials(&email).await {
            Ok(credentials) => credentials,
            Err(PortError::NotFound(_)) => return Err(invalid()),
            Err(e) => return Err(e),
        };
        if !verify_password(password, &credentials.hashed_password)? {
            return Err(invalid());
        }
        if !credentials.email_verified {
            return Err(PortError::Rejected("Email not confirmed".to_string()));
        }

        let session = AuthSession {
            id: Uuid::new_v4().to_string(),
            identity: credentials.identity,
            expires_at: Utc::now() + self.settings.session_ttl,
        };
        self.store
            .create_auth_session(&session.id, session.identity.user_id, session.expires_at)
            .await?;
        self.hub
            .publish(&session.id, SessionEvent::SignedIn(session.identity.clone()));
        Ok(session)
    }

    pub async fn session(&self, session_id: &str) -> PortResult<AuthSession> {
        self.store.validate_auth_session(session_id).await
    }

    pub async fn logout(&self, session_id: &str) -> PortResult<()> {
        self.store.delete_auth_session(session_id).await?;
        self.hub.publish(session_id, SessionEvent::SignedOut);
        Ok(())
    }

    /// Deletes expired sessions and notifies the screens holding them.
    pub async fn expire_sessions(&self) -> PortResult<usize> {
        let expired = self.store.delete_expired_sessions().await?;
        for session_id in &expired {
            self.hub.publish(session_id, SessionEvent::TokenExpired);
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{account_service, MemoryAccounts, ADMIN_EMAIL};
    use futures::StreamExt;

    #[test]
    fn test_password_round_trip() {
        let hashed = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hashed).unwrap());
        assert!(!verify_password("hunter23", &hashed).unwrap());
    }

    #[test]
    fn test_corrupt_hash_is_an_error() {
        assert!(verify_password("x", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Student@School.EDU ").unwrap(), "student@school.edu");
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("a@b").is_err());
    }

    #[tokio::test]
    async fn test_register_requires_verification_before_login() {
        let store = MemoryAccounts::new();
        let accounts = account_service(store.clone());
        let profile = SignUpProfile::default();

        let identity = accounts.register(" Ada@School.edu ", "secret1", &profile).await.unwrap();
        assert_eq!(identity.email, "ada@school.edu");
        assert_eq!(identity.role, Role::Student);

        let err = accounts.login("ada@school.edu", "secret1").await.unwrap_err();
        assert_eq!(err, PortError::Rejected("Email not confirmed".to_string()));

        let token = store.verification_token("ada@school.edu").unwrap();
        accounts.verify(&token).await.unwrap();
        assert!(accounts.verify(&token).await.is_err());

        let session = accounts.login("ADA@school.edu", "secret1").await.unwrap();
        assert_eq!(session.identity.user_id, identity.user_id);
        assert!(store.has_session(&session.id));
    }

    #[tokio::test]
    async fn test_register_rules() {
        let accounts = account_service(MemoryAccounts::new());
        let profile = SignUpProfile::default();

        let short = accounts.register("a@school.edu", "12345", &profile).await.unwrap_err();
        assert!(matches!(short, PortError::Rejected(msg) if msg.contains("at least 6")));

        let admin = accounts.register(ADMIN_EMAIL, "secret1", &profile).await.unwrap();
        assert_eq!(admin.role, Role::Admin);

        let duplicate = accounts.register(ADMIN_EMAIL, "secret1", &profile).await.unwrap_err();
        assert_eq!(duplicate, PortError::Rejected("User already registered".to_string()));
    }

    #[tokio::test]
    async fn test_login_failures_share_one_message() {
        let store = MemoryAccounts::new();
        store.add_verified("ada@school.edu", "secret1", Role::Student);
        let accounts = account_service(store);
        let invalid = PortError::Rejected("Invalid login credentials".to_string());

        assert_eq!(accounts.login("ada@school.edu", "wrong!").await.unwrap_err(), invalid);
        assert_eq!(accounts.login("nobody@school.edu", "secret1").await.unwrap_err(), invalid);
        assert_eq!(accounts.login("not-an-email", "secret1").await.unwrap_err(), invalid);
    }

    #[tokio::test]
    async fn test_expired_sessions_notify_their_holders() {
        let store = MemoryAccounts::new();
        store.add_verified("ada@school.edu", "secret1", Role::Student);
        let accounts = account_service(store.clone());
        let session = accounts.login("ada@school.edu", "secret1").await.unwrap();

        let mut events = accounts
            .hub()
            .subscribe(Arc::new(Mutex::new(Some(session.id.clone()))));
        store.expire(&session.id);
        assert_eq!(accounts.expire_sessions().await.unwrap(), 1);
        assert_eq!(events.next().await, Some(SessionEvent::TokenExpired));
        assert!(accounts.session(&session.id).await.is_err());
    }

    #[tokio::test]
    async fn test_hub_delivers_only_the_held_session() {
        let hub = SessionHub::default();
        let current = Arc::new(Mutex::new(Some("mine".to_string())));
        let mut events = hub.subscribe(current.clone());

        hub.publish("theirs", SessionEvent::SignedOut);
        hub.publish("mine", SessionEvent::TokenExpired);
        assert_eq!(events.next().await, Some(SessionEvent::TokenExpired));

        *current.lock().unwrap() = Some("next".to_string());
        hub.publish("mine", SessionEvent::SignedOut);
        hub.publish("next", SessionEvent::SignedOut);
        assert_eq!(events.next().await, Some(SessionEvent::SignedOut));
    }
}
