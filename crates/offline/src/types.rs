//! Shared types exposed to dashboard layers.
//!
//! Everything here is plain data (serde-friendly); no handles to storage or
//! the network.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shopsync_auth::{AuthorizedUser, Role};
use shopsync_core::UserId;
use shopsync_infra::Collection;

/// Connectivity state of the client, as reported by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// The environment reports a network connection.
    Online,
    /// The environment reports no network connection.
    Offline,
}

impl ConnectivityState {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityState::Online)
    }
}

/// Sync engine lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum EngineState {
    Loading,
    Synced,
    /// Mutations were queued because the client is offline.
    OfflineQueued,
    /// The pending queue is being replayed.
    Syncing,
    /// A remote call failed while online; carries the user-facing message.
    Error(String),
}

/// Which dashboard the engine serves; decides what gets fetched and what may be mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "user_id", rename_all = "lowercase")]
pub enum DashboardScope {
    Admin(UserId),
    Employee(UserId),
}

impl DashboardScope {
    /// The user recorded as `employee_id` on sales and transactions.
    pub fn actor(&self) -> &UserId {
        match self {
            DashboardScope::Admin(id) | DashboardScope::Employee(id) => id,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, DashboardScope::Admin(_))
    }

    /// Collections this dashboard loads and keeps in sync.
    pub fn collections(&self) -> &'static [Collection] {
        match self {
            DashboardScope::Admin(_) => &[
                Collection::Products,
                Collection::Categories,
                Collection::Sales,
                Collection::MobileMoneyBalances,
                Collection::MobileMoneyTransactions,
            ],
            DashboardScope::Employee(_) => &[
                Collection::Products,
                Collection::Sales,
                Collection::MobileMoneyBalances,
                Collection::MobileMoneyTransactions,
            ],
        }
    }

    /// Employees only see their own sales and transactions.
    pub fn owner_filter(&self, collection: Collection) -> Option<&UserId> {
        match (self, collection) {
            (
                DashboardScope::Employee(id),
                Collection::Sales | Collection::MobileMoneyTransactions,
            ) => Some(id),
            _ => None,
        }
    }
}

impl From<&AuthorizedUser> for DashboardScope {
    fn from(user: &AuthorizedUser) -> Self {
        let id = user.identity.user_id.clone();
        match user.role {
            Role::Admin => DashboardScope::Admin(id),
            Role::Employee => DashboardScope::Employee(id),
        }
    }
}

/// How a submitted command ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Applied remotely and reconciled.
    Applied,
    /// Applied locally and queued for replay. `error` is set when a remote call
    /// was attempted and failed; it is `None` when the client was offline.
    Queued { action_id: Uuid, error: Option<String> },
}

/// A queued action that failed during a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAction {
    pub id: Uuid,
    pub action: String,
    pub attempts: u32,
    pub error: String,
}

/// Outcome of one replay of the pending queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Applied and removed from the queue, in replay order.
    pub applied: Vec<Uuid>,
    /// Failed and kept in the queue for the next replay.
    pub retained: Vec<FailedAction>,
    /// Failed for the last allowed time and removed from the queue.
    pub dropped: Vec<FailedAction>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.retained.is_empty() && self.dropped.is_empty()
    }
}

/// Notifications emitted by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// In-memory state and the local cache changed ahead of any remote call.
    OptimisticApplied { action: &'static str },
    /// The remote store accepted the mutation.
    RemoteApplied { action: &'static str },
    /// The mutation went to the pending queue.
    Queued { action_id: Uuid, action: &'static str },
    /// Collections were overwritten from the remote store.
    Reconciled {
        collections: Vec<Collection>,
        at: DateTime<Utc>,
    },
    ReplayFinished(ReplayReport),
    /// A user-visible error message.
    Error(String),
}
