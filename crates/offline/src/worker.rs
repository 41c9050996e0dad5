//! Background worker that replays the pending queue on reconnect.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::connectivity::ConnectivityMonitor;
use crate::engine::SyncEngine;

/// Watches the connectivity monitor and hands every offline -> online
/// transition to the engine. No polling: it only wakes on notifications.
pub struct ReconnectWorker {
    engine: Arc<SyncEngine>,
    connectivity: ConnectivityMonitor,
    shutdown: Arc<Notify>,
}

/// Handle to a running worker.
#[derive(Debug)]
pub struct ReconnectHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl ReconnectHandle {
    /// Request graceful shutdown and wait for the task to finish.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.join.await {
            tracing::warn!("reconnect worker ended abnormally: {err}");
        }
    }
}

impl ReconnectWorker {
    pub fn new(engine: Arc<SyncEngine>, connectivity: ConnectivityMonitor) -> Self {
        Self {
            engine,
            connectivity,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn start(self) -> ReconnectHandle {
        let shutdown = self.shutdown.clone();
        let engine = self.engine;
        let mut rx = self.connectivity.subscribe();
        let mut was_online = rx.borrow_and_update().is_online();

        let join = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                tracing::info!("reconnect worker started");

                loop {
                    tokio::select! {
                        _ = shutdown.notified() => {
                            tracing::info!("reconnect worker received shutdown signal");
                            break;
                        }
                        changed = rx.changed() => {
                            if changed.is_err() {
                                tracing::debug!("connectivity monitor dropped");
                                break;
                            }

                            let online = rx.borrow_and_update().is_online();
                            if online && !was_online {
                                tracing::info!("back online; syncing");
                                if let Err(err) = engine.on_reconnect().await {
                                    tracing::warn!(error = %err, "sync after reconnect failed");
                                }
                            }
                            was_online = online;
                        }
                    }
                }

                tracing::info!("reconnect worker stopped");
            }
        });

        ReconnectHandle { shutdown, join }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use shopsync_core::{Operator, TransactionDraft, TransactionKind, UserId};
    use shopsync_infra::{Collection, InMemoryRemoteStore};

    use crate::cache::LocalCache;
    use crate::command::Command;
    use crate::types::{ConnectivityState, DashboardScope, EngineState};

    #[tokio::test]
    async fn reconnect_drains_queue() {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let connectivity = ConnectivityMonitor::new(ConnectivityState::Offline);
        let engine = Arc::new(SyncEngine::new(
            remote.clone(),
            LocalCache::in_memory().await.unwrap(),
            connectivity.clone(),
            DashboardScope::Admin(UserId::new("a-1")),
            5,
        ));
        engine.load().await.unwrap();
        engine
            .submit(Command::RecordTransaction(TransactionDraft {
                kind: TransactionKind::Deposit,
                operator: Operator::Moov,
                phone_number: "95000000".to_string(),
                amount: 250,
            }))
            .await
            .unwrap();

        let handle = ReconnectWorker::new(engine.clone(), connectivity.clone()).start();
        let mut states = engine.watch_state();
        connectivity.set_online();

        tokio::time::timeout(Duration::from_secs(5), async {
            while *states.borrow_and_update() != EngineState::Synced {
                states.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        assert!(engine.pending().await.is_empty());
        assert_eq!(remote.rows(Collection::MobileMoneyBalances)[0]["deposit_balance"], 250);
        handle.stop().await;
    }

    #[tokio::test]
    async fn stop_ends_the_task() {
        let engine = Arc::new(SyncEngine::new(
            Arc::new(InMemoryRemoteStore::new()),
            LocalCache::in_memory().await.unwrap(),
            ConnectivityMonitor::default(),
            DashboardScope::Employee(UserId::new("e-1")),
            5,
        ));
        let connectivity = engine.connectivity().clone();
        let handle = ReconnectWorker::new(engine, connectivity).start();

        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .unwrap();
    }
}
