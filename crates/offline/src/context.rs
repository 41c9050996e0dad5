//! Application context: everything the dashboards share, built once at startup.

use std::sync::Arc;

use anyhow::Context as _;

use shopsync_auth::{AuthProvider, AuthorizedUser};
use shopsync_infra::RemoteStore;

use crate::cache::LocalCache;
use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::engine::SyncEngine;
use crate::error::EngineError;
use crate::session::SessionGate;
use crate::types::DashboardScope;
use crate::worker::{ReconnectHandle, ReconnectWorker};

/// Process-wide state shared by dashboard layers.
#[derive(Clone)]
pub struct AppContext {
    pub config: SyncConfig,
    pub cache: LocalCache,
    pub connectivity: ConnectivityMonitor,
    pub remote: Arc<dyn RemoteStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub sessions: Arc<SessionGate>,
}

/// A mounted dashboard: its engine plus the worker replaying on reconnect.
pub struct Dashboard {
    pub engine: Arc<SyncEngine>,
    worker: ReconnectHandle,
}

impl AppContext {
    pub async fn build(
        config: SyncConfig,
        remote: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> anyhow::Result<Self> {
        let cache = LocalCache::open(&config.cache)
            .await
            .context("failed to open local cache")?;

        let connectivity = ConnectivityMonitor::new(if config.start_online {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        });

        let sessions = Arc::new(SessionGate::new(auth.clone(), remote.clone(), cache.clone()));

        tracing::info!(cache = ?config.cache, start_online = config.start_online, "context ready");

        Ok(Self {
            config,
            cache,
            connectivity,
            remote,
            auth,
            sessions,
        })
    }

    /// Build and load the engine for `user`, and start its reconnect worker.
    pub async fn mount_dashboard(&self, user: &AuthorizedUser) -> Result<Dashboard, EngineError> {
        let engine = Arc::new(SyncEngine::new(
            self.remote.clone(),
            self.cache.clone(),
            self.connectivity.clone(),
            DashboardScope::from(user),
            self.config.max_replay_attempts,
        ));

        let worker = ReconnectWorker::new(engine.clone(), self.connectivity.clone()).start();

        if let Err(err) = engine.load().await {
            // Cached state is in place; the worker retries on the next reconnect.
            tracing::warn!(error = %err, "dashboard mounted without remote state");
        }

        Ok(Dashboard { engine, worker })
    }

    /// Stop the dashboard and sign out.
    pub async fn shutdown(&self, dashboard: Dashboard) {
        dashboard.unmount().await;
        self.sessions.sign_out().await;
    }
}

impl Dashboard {
    pub async fn unmount(self) {
        self.worker.stop().await;
        tracing::info!(scope = ?self.engine.scope(), "dashboard unmounted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shopsync_auth::{Credentials, InMemoryAuthProvider};
    use shopsync_core::UserId;
    use shopsync_infra::{Collection, InMemoryRemoteStore};

    use crate::types::EngineState;

    #[tokio::test]
    async fn sign_in_then_mount_and_shutdown() {
        let remote = Arc::new(InMemoryRemoteStore::new());
        remote
            .upsert(Collection::Users, vec![json!({ "id": "u-1", "role": "admin" })], "id")
            .await
            .unwrap();
        let auth = Arc::new(InMemoryAuthProvider::new());
        auth.register("ada@shop.bj", "pw", UserId::new("u-1")).await;

        let ctx = AppContext::build(SyncConfig::in_memory(), remote, auth.clone())
            .await
            .unwrap();
        let user = ctx
            .sessions
            .sign_in(&Credentials::new("ada@shop.bj", "pw"))
            .await
            .unwrap();

        let dashboard = ctx.mount_dashboard(&user).await.unwrap();
        assert!(dashboard.engine.scope().is_admin());
        assert_eq!(dashboard.engine.state(), EngineState::Synced);

        ctx.shutdown(dashboard).await;
        assert!(auth.current_user().await.is_none());
    }
}
