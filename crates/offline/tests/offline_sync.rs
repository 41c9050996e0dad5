use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{Value as JsonValue, json};

use shopsync_core::{
    CategoryDraft, DomainError, MobileMoneyBalance, Operator, Product, ProductDraft, RecordId,
    Sale, SaleDraft, TransactionDraft, TransactionKind, UserId,
};
use shopsync_infra::{Collection, InMemoryRemoteStore, MutationKind, RemoteStore};
use shopsync_offline::{
    ActionStatus, CacheKey, Command, ConnectivityMonitor, ConnectivityState, DashboardScope,
    EngineError, EngineState, LocalCache, SubmitOutcome, SyncEngine, SyncEvent,
};

struct Harness {
    remote: Arc<InMemoryRemoteStore>,
    cache: LocalCache,
    connectivity: ConnectivityMonitor,
    engine: SyncEngine,
}

async fn seeded_remote() -> Arc<InMemoryRemoteStore> {
    let remote = Arc::new(InMemoryRemoteStore::new());
    remote
        .upsert(
            Collection::Categories,
            vec![json!({ "id": "c-1", "name": "Boissons" })],
            "id",
        )
        .await
        .unwrap();
    remote
        .upsert(
            Collection::Products,
            vec![json!({
                "id": "p-1",
                "name": "Soda",
                "price": 500,
                "stock": 10,
                "category_id": "c-1",
            })],
            "id",
        )
        .await
        .unwrap();
    remote
        .upsert(
            Collection::MobileMoneyBalances,
            vec![json!({ "operator": "MTN", "deposit_balance": 1000, "withdrawal_balance": 0 })],
            "operator",
        )
        .await
        .unwrap();
    remote
}

async fn harness_with(
    remote: Arc<InMemoryRemoteStore>,
    cache: LocalCache,
    scope: DashboardScope,
    online: bool,
    max_attempts: u32,
) -> Harness {
    let connectivity = ConnectivityMonitor::new(if online {
        ConnectivityState::Online
    } else {
        ConnectivityState::Offline
    });
    let engine = SyncEngine::new(
        remote.clone(),
        cache.clone(),
        connectivity.clone(),
        scope,
        max_attempts,
    );
    engine.load().await.unwrap();
    Harness {
        remote,
        cache,
        connectivity,
        engine,
    }
}

/// Admin dashboard mounted online over the seeded store, then switched to `online`.
async fn harness(online: bool) -> Harness {
    let h = harness_with(
        seeded_remote().await,
        LocalCache::in_memory().await.unwrap(),
        admin(),
        true,
        5,
    )
    .await;
    if !online {
        h.connectivity.set_offline();
    }
    h
}

fn admin() -> DashboardScope {
    DashboardScope::Admin(UserId::new("u-admin"))
}

fn transaction(kind: TransactionKind, operator: Operator, amount: i64) -> Command {
    Command::RecordTransaction(TransactionDraft {
        kind,
        operator,
        phone_number: "97000000".to_string(),
        amount,
    })
}

fn sale(quantity: i64) -> Command {
    Command::RecordSale(SaleDraft {
        product_id: RecordId::new("p-1"),
        quantity,
        sold_amount: None,
    })
}

fn remote_records<T: serde::de::DeserializeOwned>(remote: &InMemoryRemoteStore, c: Collection) -> Vec<T> {
    remote
        .rows(c)
        .into_iter()
        .map(|row| serde_json::from_value(row).unwrap())
        .collect()
}

fn remote_balance(remote: &InMemoryRemoteStore, operator: Operator) -> Vec<MobileMoneyBalance> {
    remote_records::<MobileMoneyBalance>(remote, Collection::MobileMoneyBalances)
        .into_iter()
        .filter(|b| b.operator == operator)
        .collect()
}

async fn reconnect(h: &Harness) {
    h.connectivity.set_online();
    h.engine.on_reconnect().await.unwrap();
}

#[tokio::test]
async fn online_mutation_matches_remote_state_after_refetch() {
    let h = harness(true).await;

    let outcome = h.engine.submit(sale(3)).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Applied);
    assert_eq!(h.engine.state(), EngineState::Synced);

    let snapshot = h.engine.snapshot().await;
    assert_eq!(snapshot.products, remote_records::<Product>(&h.remote, Collection::Products));
    assert_eq!(snapshot.sales, remote_records::<Sale>(&h.remote, Collection::Sales));
    assert_eq!(snapshot.products[0].stock, 7);
    assert_eq!(snapshot.sales[0].total_amount, 1500);
    assert!(!snapshot.sales[0].id.is_local());
}

#[tokio::test]
async fn refresh_twice_yields_identical_state() {
    let h = harness(true).await;
    h.engine.submit(transaction(TransactionKind::Deposit, Operator::Moov, 40)).await.unwrap();

    h.engine.refresh().await.unwrap();
    let first = h.engine.snapshot().await;
    h.engine.refresh().await.unwrap();
    let second = h.engine.snapshot().await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn offline_deposit_lands_on_reconnect() {
    let h = harness(false).await;

    let outcome = h
        .engine
        .submit(transaction(TransactionKind::Deposit, Operator::Mtn, 500))
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Queued { error: None, .. }));
    assert_eq!(h.engine.state(), EngineState::OfflineQueued);
    assert_eq!(remote_balance(&h.remote, Operator::Mtn)[0].deposit_balance, 1000);

    reconnect(&h).await;

    assert_eq!(remote_balance(&h.remote, Operator::Mtn)[0].deposit_balance, 1500);
    assert_eq!(h.engine.snapshot().await.balances[0].deposit_balance, 1500);
    assert!(h.engine.pending().await.is_empty());
    assert_eq!(h.engine.state(), EngineState::Synced);

    let online = harness(true).await;
    online
        .engine
        .submit(transaction(TransactionKind::Deposit, Operator::Mtn, 500))
        .await
        .unwrap();
    assert_eq!(
        remote_balance(&online.remote, Operator::Mtn)[0].deposit_balance,
        remote_balance(&h.remote, Operator::Mtn)[0].deposit_balance,
    );
}

#[tokio::test]
async fn oversold_sale_is_rejected_before_anything_changes() {
    for online in [true, false] {
        let h = harness(online).await;
        let before = h.engine.snapshot().await;
        let journal_len = h.remote.journal().len();

        let err = h.engine.submit(sale(11)).await.unwrap_err();

        assert!(matches!(err, EngineError::Domain(DomainError::Validation(_))));
        assert_eq!(h.engine.snapshot().await, before);
        assert!(h.engine.pending().await.is_empty());
        assert_eq!(h.remote.journal().len(), journal_len);
    }
}

#[tokio::test]
async fn balances_stay_unique_per_operator() {
    let h = harness(true).await;
    h.engine.submit(transaction(TransactionKind::Deposit, Operator::Mtn, 10)).await.unwrap();
    h.engine.submit(transaction(TransactionKind::Withdrawal, Operator::Mtn, 5)).await.unwrap();

    let mtn = remote_balance(&h.remote, Operator::Mtn);
    assert_eq!(mtn.len(), 1);
    assert_eq!((mtn[0].deposit_balance, mtn[0].withdrawal_balance), (1010, 5));

    h.connectivity.set_offline();
    h.engine.submit(transaction(TransactionKind::Deposit, Operator::Celtis, 70)).await.unwrap();
    h.engine.submit(transaction(TransactionKind::Deposit, Operator::Celtis, 30)).await.unwrap();
    assert_eq!(
        h.engine
            .snapshot()
            .await
            .balances
            .iter()
            .filter(|b| b.operator == Operator::Celtis)
            .count(),
        1
    );

    reconnect(&h).await;

    let celtis = remote_balance(&h.remote, Operator::Celtis);
    assert_eq!(celtis.len(), 1);
    assert_eq!(celtis[0].deposit_balance, 100);
    assert_eq!(h.engine.snapshot().await.balances.len(), 2);
}

#[tokio::test]
async fn failed_middle_action_is_retained_while_neighbours_apply() {
    let h = harness(false).await;
    h.engine.submit(transaction(TransactionKind::Deposit, Operator::Mtn, 100)).await.unwrap();
    h.engine
        .submit(Command::AddCategory(CategoryDraft {
            name: "Snacks".to_string(),
            description: None,
        }))
        .await
        .unwrap();
    h.engine.submit(transaction(TransactionKind::Deposit, Operator::Mtn, 200)).await.unwrap();
    assert_eq!(h.engine.pending().await.len(), 3);

    h.remote.reject_writes(Collection::Categories, true);
    h.connectivity.set_online();
    let report = h.engine.replay_pending().await.unwrap();

    assert_eq!(report.applied.len(), 2);
    assert_eq!(report.retained.len(), 1);
    assert_eq!(report.retained[0].action, "add-category");
    assert!(report.dropped.is_empty());
    assert_eq!(remote_balance(&h.remote, Operator::Mtn)[0].deposit_balance, 1300);

    let pending = h.engine.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1);
    assert_eq!(pending[0].status(), ActionStatus::Failed);
    assert!(matches!(h.engine.state(), EngineState::Error(_)));

    h.remote.reject_writes(Collection::Categories, false);
    let report = h.engine.replay_pending().await.unwrap();
    assert!(report.is_clean());
    assert!(h.engine.pending().await.is_empty());
    assert_eq!(h.engine.state(), EngineState::Synced);
    assert_eq!(h.engine.snapshot().await.categories.len(), 2);
}

#[tokio::test]
async fn persistently_rejected_action_is_dropped_and_reported() {
    let h = harness_with(
        seeded_remote().await,
        LocalCache::in_memory().await.unwrap(),
        admin(),
        false,
        2,
    )
    .await;
    h.engine
        .submit(Command::AddProduct(ProductDraft {
            name: "Chips".to_string(),
            price: 300,
            stock: 4,
            description: None,
            category_id: Some(RecordId::new("c-1")),
            operator: None,
        }))
        .await
        .unwrap();
    let local_id = h
        .engine
        .snapshot()
        .await
        .products
        .iter()
        .find(|p| p.id.is_local())
        .map(|p| p.id.clone())
        .unwrap();
    h.engine.submit(Command::DeleteProduct(local_id)).await.unwrap();

    h.connectivity.set_online();
    let first = h.engine.replay_pending().await.unwrap();
    assert_eq!(first.applied.len(), 1);
    assert_eq!(first.retained.len(), 1);
    assert!(first.retained[0].error.contains("no row in products"));

    let second = h.engine.replay_pending().await.unwrap();
    assert_eq!(second.dropped.len(), 1);
    assert_eq!(second.dropped[0].action, "delete-product");
    assert!(h.engine.pending().await.is_empty());
    assert_eq!(h.engine.state(), EngineState::Synced);
}

#[tokio::test]
async fn queue_and_state_survive_a_remount() {
    let remote = seeded_remote().await;
    let cache = LocalCache::in_memory().await.unwrap();

    let first = harness_with(remote.clone(), cache.clone(), admin(), true, 5).await;
    first.connectivity.set_offline();
    first
        .engine
        .submit(transaction(TransactionKind::Withdrawal, Operator::Mtn, 250))
        .await
        .unwrap();

    let second = harness_with(remote.clone(), cache.clone(), admin(), false, 5).await;
    assert_eq!(second.engine.state(), EngineState::OfflineQueued);
    assert_eq!(second.engine.pending().await.len(), 1);
    assert_eq!(second.engine.snapshot().await.balances[0].withdrawal_balance, 250);

    let third = harness_with(remote.clone(), cache, admin(), true, 5).await;
    assert!(third.engine.pending().await.is_empty());
    assert_eq!(remote_balance(&remote, Operator::Mtn)[0].withdrawal_balance, 250);
}

#[tokio::test]
async fn corrupt_cache_entry_falls_back_to_empty() {
    let cache = LocalCache::in_memory().await.unwrap();
    cache
        .save_value(CacheKey::Products, &json!("not a list"))
        .await
        .unwrap();

    let h = harness_with(
        seeded_remote().await,
        cache,
        admin(),
        false,
        5,
    )
    .await;

    assert_eq!(h.engine.state(), EngineState::Synced);
    assert!(h.engine.snapshot().await.products.is_empty());
    assert!(h.cache.load::<Product>(CacheKey::Products).await.is_err());
}

#[tokio::test]
async fn employee_sees_only_own_sales_and_transactions() {
    let remote = seeded_remote().await;
    remote
        .insert(
            Collection::MobileMoneyTransactions,
            vec![
                json!({ "type": "deposit", "operator": "MTN", "phone_number": "1", "amount": 5, "employee_id": "u-eve" }),
                json!({ "type": "deposit", "operator": "MTN", "phone_number": "2", "amount": 9, "employee_id": "u-bob" }),
            ],
        )
        .await
        .unwrap();

    let h = harness_with(
        remote,
        LocalCache::in_memory().await.unwrap(),
        DashboardScope::Employee(UserId::new("u-eve")),
        true,
        5,
    )
    .await;
    h.engine.submit(sale(1)).await.unwrap();

    let snapshot = h.engine.snapshot().await;
    assert_eq!(snapshot.transactions.len(), 1);
    assert_eq!(snapshot.transactions[0].employee_id, UserId::new("u-eve"));
    assert_eq!(snapshot.sales.len(), 1);
    assert!(snapshot.categories.is_empty());
    assert_eq!(snapshot.products.len(), 1);
}

#[tokio::test]
async fn pipeline_emits_events_in_order() {
    let h = harness(true).await;
    let mut events = h.engine.subscribe();

    h.engine.submit(sale(1)).await.unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        SyncEvent::OptimisticApplied { action: "add-sale" }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        SyncEvent::RemoteApplied { action: "add-sale" }
    );
    match events.recv().await.unwrap() {
        SyncEvent::Reconciled { collections, .. } => {
            assert_eq!(collections, vec![Collection::Sales, Collection::Products]);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn remote_rejection_while_online_is_queued_with_message() {
    let h = harness(true).await;
    h.remote.reject_writes(Collection::Sales, true);

    let outcome = h.engine.submit(sale(2)).await.unwrap();

    match outcome {
        SubmitOutcome::Queued { error: Some(message), .. } => {
            assert!(message.contains("refused"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(h.engine.snapshot().await.products[0].stock, 8);
    assert_eq!(h.engine.pending().await.len(), 1);
}

fn increment_deltas(remote: &InMemoryRemoteStore, field: &str) -> Vec<i64> {
    remote
        .journal()
        .into_iter()
        .filter(|m| m.kind == MutationKind::Increment && m.detail["field"] == JsonValue::from(field))
        .filter_map(|m| m.detail["delta"].as_i64())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24,
        ..ProptestConfig::default()
    })]

    /// Offline mutations on one balance field replay in the exact order they were made.
    #[test]
    fn replay_preserves_enqueue_order(amounts in prop::collection::vec(1i64..10_000, 1..8)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (deltas, balance) = rt.block_on(async {
            let h = harness(false).await;
            for amount in &amounts {
                h.engine
                    .submit(transaction(TransactionKind::Withdrawal, Operator::Moov, *amount))
                    .await
                    .unwrap();
            }
            reconnect(&h).await;

            let balance = remote_balance(&h.remote, Operator::Moov)[0].withdrawal_balance;
            (increment_deltas(&h.remote, "withdrawal_balance"), balance)
        });

        prop_assert_eq!(deltas, amounts.clone());
        prop_assert_eq!(balance, amounts.iter().sum::<i64>());
    }
}
