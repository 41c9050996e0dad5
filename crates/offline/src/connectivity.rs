//! Connectivity monitor.
//!
//! The environment pushes online/offline notifications in; everything else
//! reads the current state or waits for transitions through a watch channel.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

pub use crate::types::ConnectivityState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OfflineError {
    #[error("client is offline; operation requires network connection")]
    Offline,
}

/// Shared connectivity flag.
///
/// Cheap to clone; clones observe and drive the same state.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<ConnectivityState>>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    pub fn is_offline(&self) -> bool {
        !self.is_online()
    }

    /// Mark the client as online.
    pub fn set_online(&self) -> bool {
        self.report(ConnectivityState::Online)
    }

    /// Mark the client as offline.
    pub fn set_offline(&self) -> bool {
        self.report(ConnectivityState::Offline)
    }

    /// Record a notification from the environment.
    ///
    /// Returns `true` when the state actually changed; repeated notifications
    /// of the same state do not wake subscribers.
    pub fn report(&self, state: ConnectivityState) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            tracing::info!(?state, "connectivity changed");
        }
        changed
    }

    /// Receiver woken on every transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }

    /// Ensure the client is online; return error if offline.
    pub fn require_online(&self) -> Result<(), OfflineError> {
        if self.is_offline() {
            Err(OfflineError::Offline)
        } else {
            Ok(())
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}
