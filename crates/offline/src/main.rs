//! Demo: an employee records a deposit while offline and it syncs on reconnect.
//!
//! Runs against the in-memory store and auth provider. Set
//! `SHOPSYNC_CACHE_PATH` to keep the cache on disk between runs.

use std::sync::Arc;

use anyhow::Context;
use serde_json::json;

use shopsync_auth::{Credentials, InMemoryAuthProvider};
use shopsync_core::{Operator, TransactionDraft, TransactionKind, UserId};
use shopsync_infra::{Collection, InMemoryRemoteStore, RemoteStore};
use shopsync_offline::{AppContext, Command, SubmitOutcome, SyncConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shopsync_observability::init();

    let config = SyncConfig::from_env().context("invalid configuration")?;

    let remote = Arc::new(InMemoryRemoteStore::new());
    remote
        .upsert(
            Collection::Users,
            vec![json!({ "id": "u-employee", "role": "employee" })],
            "id",
        )
        .await
        .context("failed to seed users")?;
    remote
        .upsert(
            Collection::MobileMoneyBalances,
            vec![json!({ "operator": "MTN", "deposit_balance": 1000, "withdrawal_balance": 0 })],
            "operator",
        )
        .await
        .context("failed to seed balances")?;

    let auth = Arc::new(InMemoryAuthProvider::new());
    auth.register("caisse@shop.bj", "demo", UserId::new("u-employee"))
        .await;

    let ctx = AppContext::build(config, remote.clone(), auth).await?;
    let user = ctx
        .sessions
        .sign_in(&Credentials::new("caisse@shop.bj", "demo"))
        .await?;
    let dashboard = ctx.mount_dashboard(&user).await?;

    ctx.connectivity.set_offline();
    remote.set_reachable(false);

    let outcome = dashboard
        .engine
        .submit(Command::RecordTransaction(TransactionDraft {
            kind: TransactionKind::Deposit,
            operator: Operator::Mtn,
            phone_number: "97000000".to_string(),
            amount: 500,
        }))
        .await?;
    if let SubmitOutcome::Queued { action_id, .. } = outcome {
        tracing::info!(%action_id, "deposit queued while offline");
    }

    remote.set_reachable(true);
    ctx.connectivity.set_online();
    dashboard.engine.on_reconnect().await?;

    let balances = dashboard.engine.snapshot().await.balances;
    for balance in &balances {
        tracing::info!(
            operator = %balance.operator,
            deposit = balance.deposit_balance,
            withdrawal = balance.withdrawal_balance,
            "balance after sync"
        );
    }
    tracing::info!(state = ?dashboard.engine.state(), pending = dashboard.engine.pending().await.len(), "done");

    ctx.shutdown(dashboard).await;
    Ok(())
}
