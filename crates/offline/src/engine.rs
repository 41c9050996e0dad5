//! Sync engine: optimistic mutations, queue replay and reconciliation.
//!
//! Every submitted command goes through the same pipeline:
//! validate, apply to in-memory state and the local cache, then either send
//! it to the remote store (online) or queue it (offline). A successful remote
//! write is followed by a refetch of the collections it touched, which
//! overwrites whatever the optimistic step produced.
//!
//! All engine operations serialize on one async mutex, so in-memory state is
//! never mutated by two operations at once.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::{Mutex, broadcast, watch};

use shopsync_core::{BalanceSnapshot, DomainError, Operator};
use shopsync_infra::{Collection, RemoteError, RemoteStore};

use crate::cache::{CacheKey, LocalCache};
use crate::collections::Collections;
use crate::command::Command;
use crate::connectivity::ConnectivityMonitor;
use crate::error::EngineError;
use crate::queue::{PendingQueue, QueuedAction};
use crate::types::{DashboardScope, EngineState, ReplayReport, SubmitOutcome, SyncEvent};

const EVENT_CAPACITY: usize = 64;

struct Inner {
    collections: Collections,
    queue: PendingQueue,
}

pub struct SyncEngine {
    remote: Arc<dyn RemoteStore>,
    cache: LocalCache,
    connectivity: ConnectivityMonitor,
    scope: DashboardScope,
    max_replay_attempts: u32,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<EngineState>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        cache: LocalCache,
        connectivity: ConnectivityMonitor,
        scope: DashboardScope,
        max_replay_attempts: u32,
    ) -> Self {
        let (state_tx, _) = watch::channel(EngineState::Loading);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            remote,
            cache,
            connectivity,
            scope,
            max_replay_attempts: max_replay_attempts.max(1),
            inner: Mutex::new(Inner {
                collections: Collections::default(),
                queue: PendingQueue::new(),
            }),
            state_tx,
            events,
        }
    }

    pub fn scope(&self) -> &DashboardScope {
        &self.scope
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn state(&self) -> EngineState {
        self.state_tx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Copy of the current in-memory collections.
    pub async fn snapshot(&self) -> Collections {
        self.inner.lock().await.collections.clone()
    }

    pub async fn pending(&self) -> Vec<QueuedAction> {
        self.inner.lock().await.queue.entries().to_vec()
    }

    /// Mount: restore cached state and the pending queue, then catch up with
    /// the remote store when online.
    pub async fn load(&self) -> Result<(), EngineError> {
        self.set_state(EngineState::Loading);

        let queued = {
            let mut inner = self.inner.lock().await;
            for collection in self.scope.collections() {
                self.restore_cached(&mut inner.collections, *collection).await;
            }
            inner.queue = match PendingQueue::load(&self.cache).await {
                Ok(queue) => queue,
                Err(err) => {
                    tracing::warn!(error = %err, "unreadable pending queue; starting empty");
                    PendingQueue::new()
                }
            };
            inner.queue.len()
        };

        tracing::info!(scope = ?self.scope, queued, online = self.connectivity.is_online(), "dashboard mounted from cache");

        if self.connectivity.is_offline() {
            self.set_state(if queued == 0 {
                EngineState::Synced
            } else {
                EngineState::OfflineQueued
            });
            return Ok(());
        }

        if queued > 0 {
            self.replay_pending().await.map(|_| ())
        } else {
            self.refresh().await
        }
    }

    /// Submit a command through the optimistic pipeline.
    ///
    /// Validation and authorization failures return `Err` with state untouched.
    /// Remote failures do not: the optimistic state stands, the action is
    /// queued and the outcome carries the error message.
    pub async fn submit(&self, command: Command) -> Result<SubmitOutcome, EngineError> {
        if let Err(err) = command.authorize(&self.scope) {
            tracing::warn!(command = command.name(), actor = %self.scope.actor(), "command refused for scope");
            return Err(err.into());
        }

        let mut inner = self.inner.lock().await;
        let action = inner
            .collections
            .apply(command, self.scope.actor(), Utc::now())?;

        for collection in action.affected() {
            self.persist(&inner.collections, *collection).await;
        }
        self.emit(SyncEvent::OptimisticApplied {
            action: action.name(),
        });

        if self.connectivity.is_offline() {
            let name = action.name();
            let entry = inner.queue.enqueue(action, &self.cache).await;
            tracing::info!(action = name, action_id = %entry.id, queued = inner.queue.len(), "offline; action queued");
            self.set_state(EngineState::OfflineQueued);
            self.emit(SyncEvent::Queued {
                action_id: entry.id,
                action: name,
            });
            return Ok(SubmitOutcome::Queued {
                action_id: entry.id,
                error: None,
            });
        }

        match action.apply(self.remote.as_ref(), 0).await {
            Ok(()) => {
                tracing::debug!(action = action.name(), "applied remotely");
                self.emit(SyncEvent::RemoteApplied {
                    action: action.name(),
                });

                match self.reconcile(&mut inner, action.affected()).await {
                    Ok(()) => self.set_state(EngineState::Synced),
                    Err(err) => self.fail(&EngineError::Remote(err)),
                }
                Ok(SubmitOutcome::Applied)
            }
            Err(failure) => {
                let message = EngineError::Remote(failure.error.clone()).user_message();
                let name = action.name();
                tracing::warn!(
                    action = name,
                    error = %failure.error,
                    completed_steps = failure.completed_steps,
                    "remote write failed; action queued"
                );

                let entry = inner
                    .queue
                    .enqueue_partial(action, failure.completed_steps, &self.cache)
                    .await;
                self.emit(SyncEvent::Queued {
                    action_id: entry.id,
                    action: name,
                });
                self.set_state(EngineState::Error(message.clone()));
                self.emit(SyncEvent::Error(message.clone()));

                Ok(SubmitOutcome::Queued {
                    action_id: entry.id,
                    error: Some(message),
                })
            }
        }
    }

    /// Overwrite every collection of the dashboard with remote state.
    pub async fn refresh(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        match self.reconcile(&mut inner, self.scope.collections()).await {
            Ok(()) => {
                self.set_state(EngineState::Synced);
                Ok(())
            }
            Err(err) => {
                let err = EngineError::Remote(err);
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Replay the pending queue in order, then refetch everything.
    pub async fn replay_pending(&self) -> Result<ReplayReport, EngineError> {
        self.connectivity.require_online()?;

        let mut inner = self.inner.lock().await;
        if inner.queue.is_empty() {
            return Ok(ReplayReport::default());
        }

        self.set_state(EngineState::Syncing);
        tracing::info!(queued = inner.queue.len(), "replaying pending actions");

        let remote = Arc::clone(&self.remote);
        let report = inner
            .queue
            .drain_in_order(&self.cache, self.max_replay_attempts, |entry| {
                let remote = Arc::clone(&remote);
                async move { entry.action.apply(remote.as_ref(), entry.completed_steps).await }
            })
            .await;

        tracing::info!(
            applied = report.applied.len(),
            retained = report.retained.len(),
            dropped = report.dropped.len(),
            "replay finished"
        );
        self.emit(SyncEvent::ReplayFinished(report.clone()));

        if let Err(err) = self.reconcile(&mut inner, self.scope.collections()).await {
            let err = EngineError::Remote(err);
            self.fail(&err);
            return Err(err);
        }

        if inner.queue.is_empty() {
            self.set_state(EngineState::Synced);
        } else {
            self.fail_with(format!(
                "{} pending action(s) could not be synced yet",
                inner.queue.len()
            ));
        }
        Ok(report)
    }

    /// Connectivity came back: replay if anything is queued, otherwise refresh.
    pub async fn on_reconnect(&self) -> Result<(), EngineError> {
        let queued = self.inner.lock().await.queue.len();
        if queued > 0 {
            self.replay_pending().await.map(|_| ())
        } else {
            self.refresh().await
        }
    }

    /// Create a zero balance for every operator that has none (admin only).
    pub async fn seed_default_balances(&self) -> Result<(), EngineError> {
        if !self.scope.is_admin() {
            return Err(DomainError::Unauthorized.into());
        }
        self.connectivity.require_online()?;

        let mut inner = self.inner.lock().await;
        let rows = Operator::ALL
            .iter()
            .filter(|op| !inner.collections.balances.iter().any(|b| b.operator == **op))
            .map(|op| {
                serde_json::to_value(BalanceSnapshot {
                    operator: *op,
                    deposit_balance: 0,
                    withdrawal_balance: 0,
                })
                .map_err(|e| RemoteError::Malformed(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            return Ok(());
        }

        tracing::info!(count = rows.len(), "seeding default balances");
        self.remote
            .upsert(Collection::MobileMoneyBalances, rows, "operator")
            .await?;
        self.reconcile(&mut inner, &[Collection::MobileMoneyBalances])
            .await?;
        Ok(())
    }

    /// Fetch `collections`, then overwrite in-memory state and the cache.
    ///
    /// All fetches complete before anything is overwritten, so a failure part
    /// way leaves the previous state intact.
    async fn reconcile(&self, inner: &mut Inner, collections: &[Collection]) -> Result<(), RemoteError> {
        let wanted: Vec<Collection> = collections
            .iter()
            .copied()
            .filter(|c| self.scope.collections().contains(c))
            .collect();

        let mut fetched = Vec::with_capacity(wanted.len());
        for collection in &wanted {
            let rows = match self.scope.owner_filter(*collection) {
                Some(owner) => {
                    self.remote
                        .select_where(*collection, "employee_id", &json!(owner.as_str()))
                        .await?
                }
                None => self.remote.select_all(*collection).await?,
            };
            fetched.push((*collection, rows));
        }

        let mut next = inner.collections.clone();
        for (collection, rows) in fetched {
            next.overwrite(collection, rows)?;
        }
        inner.collections = next;

        for collection in &wanted {
            self.persist(&inner.collections, *collection).await;
        }

        tracing::debug!(collections = ?wanted, "reconciled with remote store");
        self.emit(SyncEvent::Reconciled {
            collections: wanted,
            at: Utc::now(),
        });
        Ok(())
    }

    async fn restore_cached(&self, collections: &mut Collections, collection: Collection) {
        let Some(key) = CacheKey::for_collection(collection) else {
            return;
        };
        match collection {
            Collection::Products => collections.products = self.cached(key).await,
            Collection::Categories => collections.categories = self.cached(key).await,
            Collection::Sales => collections.sales = self.cached(key).await,
            Collection::MobileMoneyBalances => collections.balances = self.cached(key).await,
            Collection::MobileMoneyTransactions => collections.transactions = self.cached(key).await,
            Collection::Users => {}
        }
    }

    async fn cached<T: DeserializeOwned>(&self, key: CacheKey) -> Vec<T> {
        match self.cache.load(key).await {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(%key, error = %err, "unreadable cache entry; starting empty");
                Vec::new()
            }
        }
    }

    async fn persist(&self, collections: &Collections, collection: Collection) {
        let Some(key) = CacheKey::for_collection(collection) else {
            return;
        };
        let result = match collection {
            Collection::Products => self.cache.save(key, &collections.products).await,
            Collection::Categories => self.cache.save(key, &collections.categories).await,
            Collection::Sales => self.cache.save(key, &collections.sales).await,
            Collection::MobileMoneyBalances => self.cache.save(key, &collections.balances).await,
            Collection::MobileMoneyTransactions => {
                self.cache.save(key, &collections.transactions).await
            }
            Collection::Users => Ok(()),
        };

        if let Err(err) = result {
            tracing::error!("failed to cache {collection}: {err:?}");
        }
    }

    fn fail(&self, err: &EngineError) {
        tracing::error!(error = %err, "sync engine error");
        self.fail_with(err.user_message());
    }

    fn fail_with(&self, message: String) {
        self.set_state(EngineState::Error(message.clone()));
        self.emit(SyncEvent::Error(message));
    }

    fn set_state(&self, state: EngineState) {
        let previous = self.state_tx.send_replace(state.clone());
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "engine state changed");
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl core::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("scope", &self.scope)
            .field("state", &self.state())
            .field("connectivity", &self.connectivity.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopsync_core::{RecordId, TransactionDraft, TransactionKind, UserId};
    use shopsync_infra::InMemoryRemoteStore;

    use crate::types::ConnectivityState;

    async fn engine(scope: DashboardScope, online: bool) -> (Arc<InMemoryRemoteStore>, SyncEngine) {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let cache = LocalCache::in_memory().await.unwrap();
        let state = if online {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        };
        let engine = SyncEngine::new(
            remote.clone(),
            cache,
            ConnectivityMonitor::new(state),
            scope,
            3,
        );
        (remote, engine)
    }

    fn admin() -> DashboardScope {
        DashboardScope::Admin(UserId::new("a-1"))
    }

    fn deposit(amount: i64) -> Command {
        Command::RecordTransaction(TransactionDraft {
            kind: TransactionKind::Deposit,
            operator: Operator::Mtn,
            phone_number: "97000000".to_string(),
            amount,
        })
    }

    #[tokio::test]
    async fn load_offline_with_empty_cache_is_synced() {
        let (_remote, engine) = engine(admin(), false).await;
        engine.load().await.unwrap();
        assert_eq!(engine.state(), EngineState::Synced);
        assert_eq!(engine.snapshot().await, Collections::default());
    }

    #[tokio::test]
    async fn offline_submit_queues_without_remote_calls() {
        let (remote, engine) = engine(admin(), false).await;
        engine.load().await.unwrap();

        let outcome = engine.submit(deposit(500)).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Queued { error: None, .. }));
        assert_eq!(engine.state(), EngineState::OfflineQueued);
        assert_eq!(engine.pending().await.len(), 1);
        assert_eq!(engine.snapshot().await.balances[0].deposit_balance, 500);
        assert!(remote.journal().is_empty());
    }

    #[tokio::test]
    async fn overflowing_deposit_is_refused_and_nothing_is_queued() {
        let (_remote, engine) = engine(admin(), false).await;
        engine.load().await.unwrap();
        engine.submit(deposit(i64::MAX)).await.unwrap();
        let before = engine.snapshot().await;

        let err = engine.submit(deposit(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::Validation(_))));
        assert_eq!(engine.snapshot().await, before);
        assert_eq!(engine.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn remote_failure_keeps_optimistic_state_and_queues() {
        let (remote, engine) = engine(admin(), true).await;
        engine.load().await.unwrap();
        remote.reject_writes(Collection::MobileMoneyTransactions, true);

        let outcome = engine.submit(deposit(200)).await.unwrap();
        match outcome {
            SubmitOutcome::Queued { error: Some(_), .. } => {}
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(matches!(engine.state(), EngineState::Error(_)));
        assert_eq!(engine.snapshot().await.transactions.len(), 1);
        assert_eq!(engine.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn employees_cannot_seed_or_edit_catalog() {
        let (_remote, engine) = engine(DashboardScope::Employee(UserId::new("e-1")), true).await;
        engine.load().await.unwrap();

        assert!(matches!(
            engine.seed_default_balances().await,
            Err(EngineError::Domain(DomainError::Unauthorized))
        ));
        assert!(matches!(
            engine.submit(Command::DeleteProduct(RecordId::new("p-1"))).await,
            Err(EngineError::Domain(DomainError::Unauthorized))
        ));
    }

    #[tokio::test]
    async fn seeding_creates_one_balance_per_operator_once() {
        let (remote, engine) = engine(admin(), true).await;
        engine.load().await.unwrap();

        engine.seed_default_balances().await.unwrap();
        engine.seed_default_balances().await.unwrap();

        assert_eq!(remote.rows(Collection::MobileMoneyBalances).len(), 3);
        assert_eq!(engine.snapshot().await.balances.len(), 3);
    }

    #[tokio::test]
    async fn replay_requires_connectivity() {
        let (_remote, engine) = engine(admin(), false).await;
        assert!(matches!(
            engine.replay_pending().await,
            Err(EngineError::Offline(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_store_on_mount_is_an_error() {
        let (remote, engine) = engine(admin(), true).await;
        remote.set_reachable(false);

        let mut events = engine.subscribe();
        assert!(engine.load().await.is_err());
        assert!(matches!(engine.state(), EngineState::Error(_)));
        assert!(matches!(events.recv().await.unwrap(), SyncEvent::Error(_)));
    }
}
