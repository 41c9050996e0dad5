//! Engine-level error type.

use thiserror::Error;

use shopsync_auth::AuthError;
use shopsync_core::DomainError;
use shopsync_infra::RemoteError;

use crate::cache::CacheError;
use crate::connectivity::OfflineError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected before any state changed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Offline(#[from] OfflineError),
}

impl EngineError {
    /// Message shown to the user in the dashboard's error slot.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Domain(err) => err.to_string(),
            EngineError::Remote(err) if err.is_network() => {
                "network unavailable, changes were saved locally".to_string()
            }
            EngineError::Remote(err) => format!("the server refused the change: {err}"),
            EngineError::Cache(err) => format!("local storage failed: {err}"),
            EngineError::Auth(err) => err.to_string(),
            EngineError::Offline(err) => err.to_string(),
        }
    }
}
