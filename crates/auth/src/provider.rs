//! Authentication collaborator contract.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::session::{AuthEvent, Credentials, Identity, Session};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("role '{0}' is not allowed to use the dashboards")]
    InvalidRole(String),

    #[error("no role recorded for user {0}")]
    MissingRole(String),

    #[error("no active session")]
    NoSession,

    #[error("auth provider unreachable: {0}")]
    Unavailable(String),
}

/// Hosted authentication provider.
///
/// Implementations own the session; callers observe changes through
/// [`AuthProvider::subscribe`].
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError>;

    async fn sign_out(&self);

    async fn current_user(&self) -> Option<Identity>;

    /// Subscribe to sign-in, sign-out and token-refresh notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

#[async_trait]
impl<P> AuthProvider for Arc<P>
where
    P: AuthProvider + ?Sized,
{
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        (**self).sign_in(credentials).await
    }

    async fn sign_out(&self) {
        (**self).sign_out().await
    }

    async fn current_user(&self) -> Option<Identity> {
        (**self).current_user().await
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        (**self).subscribe()
    }
}
