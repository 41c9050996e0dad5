//! Session gate: sign-in with dashboard role check, and the cached user.

use std::sync::Arc;

use serde_json::{Value as JsonValue, json};
use tokio::sync::broadcast;

use shopsync_auth::{AuthError, AuthEvent, AuthProvider, AuthorizedUser, Credentials, Role};
use shopsync_core::UserId;
use shopsync_infra::{Collection, RemoteStore};

use crate::cache::{CacheKey, LocalCache};
use crate::error::EngineError;

/// Admits only users whose `users.role` is `admin` or `employee`.
pub struct SessionGate {
    auth: Arc<dyn AuthProvider>,
    remote: Arc<dyn RemoteStore>,
    cache: LocalCache,
}

impl SessionGate {
    pub fn new(auth: Arc<dyn AuthProvider>, remote: Arc<dyn RemoteStore>, cache: LocalCache) -> Self {
        Self {
            auth,
            remote,
            cache,
        }
    }

    /// Sign in and verify the role. Any failure after the provider accepted
    /// the credentials ends the session again.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<AuthorizedUser, EngineError> {
        let session = self.auth.sign_in(credentials).await?;

        let role = match self.lookup_role(&session.identity.user_id).await {
            Ok(role) => role,
            Err(err) => {
                tracing::warn!(user = %session.identity.user_id, error = %err, "sign-in refused; signing out");
                self.auth.sign_out().await;
                return Err(err.into());
            }
        };

        let user = AuthorizedUser {
            identity: session.identity,
            role,
        };
        if let Err(err) = self.cache.save_value(CacheKey::CurrentUser, &user).await {
            tracing::error!("failed to cache current user: {err:?}");
        }

        tracing::info!(user = %user.identity.user_id, role = %user.role, "signed in");
        Ok(user)
    }

    /// The last signed-in user, for mounting without a network round trip.
    ///
    /// A cached user is ignored when the provider holds a live session for
    /// someone else.
    pub async fn restore(&self) -> Result<Option<AuthorizedUser>, EngineError> {
        let cached: Option<AuthorizedUser> = self.cache.load_value(CacheKey::CurrentUser).await?;

        match (cached, self.auth.current_user().await) {
            (Some(user), Some(live)) if live.user_id != user.identity.user_id => {
                tracing::debug!(cached = %user.identity.user_id, live = %live.user_id, "cached user belongs to another session");
                Ok(None)
            }
            (cached, _) => Ok(cached),
        }
    }

    pub async fn sign_out(&self) {
        self.auth.sign_out().await;
        if let Err(err) = self.cache.remove(CacheKey::CurrentUser).await {
            tracing::error!("failed to clear cached user: {err:?}");
        }
        tracing::info!("signed out");
    }

    /// Sign-in, sign-out and token-refresh notifications from the provider.
    pub fn events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth.subscribe()
    }

    async fn lookup_role(&self, user_id: &UserId) -> Result<Role, AuthError> {
        let rows = self
            .remote
            .select_where(Collection::Users, "id", &json!(user_id.as_str()))
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        rows.first()
            .and_then(|row| row.get("role"))
            .and_then(JsonValue::as_str)
            .ok_or_else(|| AuthError::MissingRole(user_id.to_string()))?
            .parse()
    }
}
