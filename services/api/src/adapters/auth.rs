//! services/api/src/adapters/auth.rs
//!
//! The `AuthProvider` port for one screen connection, backed by the password
//! accounts service. Each connection holds at most one login session id.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use study_notes_core::ports::{AuthProvider, PortError, PortResult, SessionEventStream};
use study_notes_core::{AuthSession, SignUpProfile};
use tracing::warn;

use crate::accounts::AccountService;

pub struct PasswordAuth {
    accounts: AccountService,
    current: Arc<Mutex<Option<String>>>,
}

impl PasswordAuth {
    /// `session_id` is the login session the connection was opened with, if any.
    pub fn new(accounts: AccountService, session_id: Option<String>) -> Self {
        Self {
            accounts,
            current: Arc::new(Mutex::new(session_id)),
        }
    }

    /// The login session currently held by this connection.
    pub fn session_id(&self) -> Option<String> {
        self.current.lock().map(|held| held.clone()).unwrap_or(None)
    }

    fn hold(&self, session_id: Option<String>) -> Option<String> {
        match self.current.lock() {
            Ok(mut held) => std::mem::replace(&mut *held, session_id),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), session_id),
        }
    }
}

#[async_trait]
impl AuthProvider for PasswordAuth {
    async fn current_session(&self) -> PortResult<Option<AuthSession>> {
        let Some(session_id) = self.session_id() else {
            return Ok(None);
        };
        match self.accounts.session(&session_id).await {
            Ok(session) => Ok(Some(session)),
            Err(PortError::NotFound(_)) => {
                self.hold(None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn session_changes(&self) -> SessionEventStream {
        self.accounts.hub().subscribe(self.current.clone())
    }

    async fn sign_up(&self, email: &str, password: &str, profile: &SignUpProfile) -> PortResult<()> {
        self.accounts.register(email, password, profile).await.map(|_| ())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        let session = self.accounts.login(email, password).await?;
        if let Some(previous) = self.hold(Some(session.id.clone())) {
            warn!("Replacing a held login session on sign-in");
            if let Err(e) = self.accounts.logout(&previous).await {
                warn!(error = %e, "Failed to end the replaced login session");
            }
        }
        Ok(session)
    }

    async fn sign_out(&self) -> PortResult<()> {
        match self.hold(None) {
            Some(session_id) => self.accounts.logout(&session_id).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{account_service, MemoryAccounts};
    use futures::StreamExt;
    use study_notes_core::{Role, SessionEvent};

    #[tokio::test]
    async fn test_sign_in_holds_the_session() {
        let store = MemoryAccounts::new();
        store.add_verified("ada@school.edu", "secret1", Role::Student);
        let auth = PasswordAuth::new(account_service(store.clone()), None);

        assert!(auth.current_session().await.unwrap().is_none());
        let session = auth.sign_in_with_password("ada@school.edu", "secret1").await.unwrap();
        assert_eq!(auth.session_id(), Some(session.id.clone()));

        let restored = auth.current_session().await.unwrap().unwrap();
        assert_eq!(restored.identity.email, "ada@school.edu");

        auth.sign_out().await.unwrap();
        assert_eq!(auth.session_id(), None);
        assert!(!store.has_session(&session.id));
    }

    #[tokio::test]
    async fn test_unknown_cookie_session_restores_as_anonymous() {
        let store = MemoryAccounts::new();
        let auth = PasswordAuth::new(account_service(store), Some("stale".to_string()));
        assert!(auth.current_session().await.unwrap().is_none());
        assert_eq!(auth.session_id(), None);
    }

    #[tokio::test]
    async fn test_logout_elsewhere_reaches_this_connection() {
        let store = MemoryAccounts::new();
        store.add_verified("ada@school.edu", "secret1", Role::Student);
        let accounts = account_service(store);
        let session = accounts.login("ada@school.edu", "secret1").await.unwrap();

        let auth = PasswordAuth::new(accounts.clone(), Some(session.id.clone()));
        let mut events = auth.session_changes();
        accounts.logout(&session.id).await.unwrap();
        assert_eq!(events.next().await, Some(SessionEvent::SignedOut));
    }
}
