//! crates/study_notes_core/src/gate.rs
//!
//! The session gate: tracks whether the visitor is anonymous or signed in and
//! forwards sign-in, sign-up and sign-out to the auth collaborator.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{Identity, SessionEvent, SignUpProfile};
use crate::error::GateError;
use crate::ports::{AuthProvider, SessionEventStream};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdentityState {
    #[default]
    Anonymous,
    Authenticated(Identity),
}

impl IdentityState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            IdentityState::Anonymous => None,
            IdentityState::Authenticated(identity) => Some(identity),
        }
    }
}

/// What a gate operation did to the identity state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    SignedIn(Identity),
    SignedOut,
    Unchanged,
}

/// Returned by a successful sign-up. The account still has to be verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationPending {
    pub email: String,
}

pub struct SessionGate {
    auth: Arc<dyn AuthProvider>,
    state: IdentityState,
}

impl SessionGate {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            auth,
            state: IdentityState::Anonymous,
        }
    }

    pub fn state(&self) -> &IdentityState {
        &self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.state.identity()
    }

    /// Subscribes to session notifications from the auth collaborator.
    pub fn session_changes(&self) -> SessionEventStream {
        self.auth.session_changes()
    }

    /// Picks up a session established in an earlier visit, if it is still valid.
    pub async fn restore(&mut self) -> Result<Transition, GateError> {
        match self.auth.current_session().await? {
            Some(session) => Ok(self.enter(session.identity)),
            None => Ok(self.leave()),
        }
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<Transition, GateError> {
        if let IdentityState::Authenticated(current) = &self.state {
            return Err(GateError::AlreadySignedIn(current.email.clone()));
        }
        let session = self.auth.sign_in_with_password(email.trim(), password).await?;
        info!(user_id = %session.identity.user_id, "Signed in");
        Ok(self.enter(session.identity))
    }

    /// Registers an account. The visitor stays anonymous until they verify
    /// their e-mail address and sign in.
    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
        profile: &SignUpProfile,
    ) -> Result<VerificationPending, GateError> {
        let email = email.trim();
        self.auth.sign_up(email, password, profile).await?;
        info!("Sign-up accepted, waiting for e-mail verification");
        Ok(VerificationPending {
            email: email.to_string(),
        })
    }

    pub async fn sign_out(&mut self) -> Result<Transition, GateError> {
        if let Err(e) = self.auth.sign_out().await {
            // The local session ends either way.
            warn!(error = %e, "Auth collaborator failed to end the session");
        }
        Ok(self.leave())
    }

    /// Applies a notification received from the auth collaborator.
    pub fn apply(&mut self, event: SessionEvent) -> Transition {
        match event {
            SessionEvent::SignedIn(identity) => self.enter(identity),
            SessionEvent::SignedOut | SessionEvent::TokenExpired => self.leave(),
        }
    }

    fn enter(&mut self, identity: Identity) -> Transition {
        if self.state.identity() == Some(&identity) {
            return Transition::Unchanged;
        }
        self.state = IdentityState::Authenticated(identity.clone());
        Transition::SignedIn(identity)
    }

    fn leave(&mut self) -> Transition {
        match std::mem::take(&mut self.state) {
            IdentityState::Anonymous => Transition::Unchanged,
            IdentityState::Authenticated(_) => Transition::SignedOut,
        }
    }
}
