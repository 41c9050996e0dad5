//! In-memory auth provider for tests/dev.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use shopsync_core::UserId;

use crate::provider::{AuthError, AuthProvider};
use crate::session::{AuthEvent, Credentials, Identity, Session};

#[derive(Debug, Clone)]
struct Account {
    user_id: UserId,
    password: String,
}

/// Auth provider backed by a fixed account table.
///
/// Not a security boundary; passwords are compared in plain text.
#[derive(Debug)]
pub struct InMemoryAuthProvider {
    accounts: Mutex<HashMap<String, Account>>,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl InMemoryAuthProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            events,
        }
    }

    /// Register an account that can sign in.
    pub async fn register(&self, email: impl Into<String>, password: impl Into<String>, user_id: UserId) {
        self.accounts.lock().await.insert(
            email.into(),
            Account {
                user_id,
                password: password.into(),
            },
        );
    }

    /// Rotate the access token of the current session.
    pub async fn refresh_token(&self) -> Result<Session, AuthError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(AuthError::NoSession)?;
        session.access_token = Uuid::now_v7();
        session.issued_at = Utc::now();
        let _ = self
            .events
            .send(AuthEvent::TokenRefreshed(session.identity.clone()));
        Ok(session.clone())
    }
}

impl Default for InMemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuthProvider {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let account = {
            let accounts = self.accounts.lock().await;
            accounts
                .get(&credentials.email)
                .filter(|a| a.password == credentials.password)
                .cloned()
                .ok_or(AuthError::InvalidCredentials)?
        };

        let session = Session {
            identity: Identity {
                user_id: account.user_id,
                email: credentials.email.clone(),
            },
            access_token: Uuid::now_v7(),
            issued_at: Utc::now(),
        };

        *self.session.lock().await = Some(session.clone());
        let _ = self.events.send(AuthEvent::SignedIn(session.identity.clone()));
        tracing::debug!(user = %session.identity.user_id, "signed in");

        Ok(session)
    }

    async fn sign_out(&self) {
        let previous = self.session.lock().await.take();
        if previous.is_some() {
            let _ = self.events.send(AuthEvent::SignedOut);
        }
    }

    async fn current_user(&self) -> Option<Identity> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.identity.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
