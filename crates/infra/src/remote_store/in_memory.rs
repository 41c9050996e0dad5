use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use shopsync_core::RecordId;

use super::r#trait::{Collection, RemoteError, RemoteStore};

/// Kind of write recorded in the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
    Upsert,
    Increment,
}

/// One applied write, in application order.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub collection: Collection,
    pub kind: MutationKind,
    pub detail: JsonValue,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<Collection, Vec<Map<String, JsonValue>>>,
    journal: Vec<Mutation>,
    reachable: bool,
    rejected: HashSet<Collection>,
}

/// In-memory hosted store.
///
/// Intended for tests/dev. Rows keep insertion order, `increment` is atomic,
/// and reachability / per-collection rejection can be toggled to simulate
/// outages.
#[derive(Debug)]
pub struct InMemoryRemoteStore {
    state: RwLock<State>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                reachable: true,
                ..State::default()
            }),
        }
    }

    /// Simulate losing (or regaining) the network path to the store.
    pub fn set_reachable(&self, reachable: bool) {
        if let Ok(mut state) = self.state.write() {
            state.reachable = reachable;
        }
        tracing::debug!(reachable, "remote store reachability changed");
    }

    /// Make every write to `collection` fail with `Rejected`.
    pub fn reject_writes(&self, collection: Collection, reject: bool) {
        if let Ok(mut state) = self.state.write() {
            if reject {
                state.rejected.insert(collection);
            } else {
                state.rejected.remove(&collection);
            }
        }
    }

    /// Writes applied so far, oldest first.
    pub fn journal(&self) -> Vec<Mutation> {
        self.state
            .read()
            .map(|s| s.journal.clone())
            .unwrap_or_default()
    }

    /// Rows of a collection, bypassing reachability (test inspection).
    pub fn rows(&self, collection: Collection) -> Vec<JsonValue> {
        self.state
            .read()
            .map(|s| {
                s.tables
                    .get(&collection)
                    .map(|rows| rows.iter().cloned().map(JsonValue::Object).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, RemoteError> {
        let state = self.state.read().map_err(|_| RemoteError::Poisoned)?;
        if !state.reachable {
            return Err(RemoteError::Network("store unreachable".to_string()));
        }
        Ok(state)
    }

    fn write(
        &self,
        collection: Collection,
    ) -> Result<std::sync::RwLockWriteGuard<'_, State>, RemoteError> {
        let state = self.state.write().map_err(|_| RemoteError::Poisoned)?;
        if !state.reachable {
            return Err(RemoteError::Network("store unreachable".to_string()));
        }
        if state.rejected.contains(&collection) {
            return Err(RemoteError::Rejected {
                collection,
                reason: "writes disabled".to_string(),
            });
        }
        Ok(state)
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

fn as_object(collection: Collection, row: JsonValue) -> Result<Map<String, JsonValue>, RemoteError> {
    match row {
        JsonValue::Object(map) => Ok(map),
        other => Err(RemoteError::Malformed(format!(
            "{collection} expects objects, got {other}"
        ))),
    }
}

/// Fill server-assigned columns and schema defaults. Caller-supplied ids are kept.
fn materialize(collection: Collection, mut row: Map<String, JsonValue>) -> Map<String, JsonValue> {
    if let JsonValue::Object(defaults) = collection.column_defaults() {
        for (k, v) in defaults {
            row.entry(k).or_insert(v);
        }
    }
    row.entry("id")
        .or_insert_with(|| JsonValue::String(Uuid::now_v7().to_string()));
    row.entry("created_at")
        .or_insert_with(|| JsonValue::String(Utc::now().to_rfc3339()));
    row
}

fn merge(target: &mut Map<String, JsonValue>, patch: Map<String, JsonValue>) {
    for (k, v) in patch {
        if k != "id" {
            target.insert(k, v);
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn select_all(&self, collection: Collection) -> Result<Vec<JsonValue>, RemoteError> {
        let state = self.read()?;
        Ok(state
            .tables
            .get(&collection)
            .map(|rows| rows.iter().cloned().map(JsonValue::Object).collect())
            .unwrap_or_default())
    }

    async fn select_where(
        &self,
        collection: Collection,
        field: &str,
        value: &JsonValue,
    ) -> Result<Vec<JsonValue>, RemoteError> {
        let state = self.read()?;
        Ok(state
            .tables
            .get(&collection)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.get(field) == Some(value))
                    .cloned()
                    .map(JsonValue::Object)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(
        &self,
        collection: Collection,
        rows: Vec<JsonValue>,
    ) -> Result<Vec<JsonValue>, RemoteError> {
        let prepared = rows
            .into_iter()
            .map(|r| as_object(collection, r).map(|m| materialize(collection, m)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.write(collection)?;
        let table = state.tables.entry(collection).or_default();
        table.extend(prepared.iter().cloned());

        let stored: Vec<JsonValue> = prepared.into_iter().map(JsonValue::Object).collect();
        state.journal.push(Mutation {
            collection,
            kind: MutationKind::Insert,
            detail: JsonValue::Array(stored.clone()),
        });
        Ok(stored)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        patch: JsonValue,
    ) -> Result<(), RemoteError> {
        let patch = as_object(collection, patch)?;
        let mut state = self.write(collection)?;

        let row = state
            .tables
            .get_mut(&collection)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|r| r.get("id").and_then(JsonValue::as_str) == Some(id.as_str()))
            })
            .ok_or_else(|| RemoteError::NotFound {
                collection,
                key: format!("id={id}"),
            })?;
        merge(row, patch.clone());

        state.journal.push(Mutation {
            collection,
            kind: MutationKind::Update,
            detail: JsonValue::Object(patch),
        });
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), RemoteError> {
        let mut state = self.write(collection)?;
        let rows = state.tables.entry(collection).or_default();
        let before = rows.len();
        rows.retain(|r| r.get("id").and_then(JsonValue::as_str) != Some(id.as_str()));
        if rows.len() == before {
            return Err(RemoteError::NotFound {
                collection,
                key: format!("id={id}"),
            });
        }

        state.journal.push(Mutation {
            collection,
            kind: MutationKind::Delete,
            detail: JsonValue::String(id.to_string()),
        });
        Ok(())
    }

    async fn upsert(
        &self,
        collection: Collection,
        rows: Vec<JsonValue>,
        conflict_key: &str,
    ) -> Result<(), RemoteError> {
        let rows = rows
            .into_iter()
            .map(|r| -> Result<_, RemoteError> {
                let row = as_object(collection, r)?;
                let key = row.get(conflict_key).cloned().ok_or_else(|| {
                    RemoteError::Malformed(format!("upsert row without conflict key '{conflict_key}'"))
                })?;
                Ok((key, row))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.write(collection)?;
        let table = state.tables.entry(collection).or_default();
        for (key, row) in &rows {
            match table.iter_mut().find(|r| r.get(conflict_key) == Some(key)) {
                Some(existing) => merge(existing, row.clone()),
                None => table.push(materialize(collection, row.clone())),
            }
        }

        state.journal.push(Mutation {
            collection,
            kind: MutationKind::Upsert,
            detail: JsonValue::Array(rows.into_iter().map(|(_, row)| JsonValue::Object(row)).collect()),
        });
        Ok(())
    }

    /// Atomic: the read and the write happen under one lock.
    async fn increment(
        &self,
        collection: Collection,
        key_field: &str,
        key_value: &JsonValue,
        field: &str,
        delta: i64,
    ) -> Result<(), RemoteError> {
        let mut state = self.write(collection)?;
        let table = state.tables.entry(collection).or_default();

        match table.iter_mut().find(|r| r.get(key_field) == Some(key_value)) {
            Some(row) => {
                let current = row.get(field).and_then(JsonValue::as_i64).unwrap_or(0);
                let next = current.checked_add(delta).ok_or_else(|| RemoteError::Rejected {
                    collection,
                    reason: format!("{field} out of range"),
                })?;
                row.insert(field.to_string(), JsonValue::from(next));
            }
            None if key_field == "id" => {
                return Err(RemoteError::NotFound {
                    collection,
                    key: format!("id={key_value}"),
                });
            }
            None => {
                let mut row = Map::new();
                row.insert(key_field.to_string(), key_value.clone());
                row.insert(field.to_string(), JsonValue::from(delta));
                table.push(materialize(collection, row));
            }
        }

        state.journal.push(Mutation {
            collection,
            kind: MutationKind::Increment,
            detail: serde_json::json!({
                "key": key_value,
                "field": field,
                "delta": delta,
            }),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_id_defaults_and_created_at() {
        let store = InMemoryRemoteStore::new();
        let stored = store
            .insert(Collection::Sales, vec![json!({ "product_id": "p-1", "quantity": 2 })])
            .await
            .unwrap();

        let row = &stored[0];
        assert!(row["id"].is_string());
        assert!(row["created_at"].is_string());
        assert!(row["sold_amount"].is_null());
        assert_eq!(store.select_all(Collection::Sales).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_conflict_column() {
        let store = InMemoryRemoteStore::new();
        store
            .upsert(
                Collection::MobileMoneyBalances,
                vec![json!({ "operator": "MTN", "deposit_balance": 1000 })],
                "operator",
            )
            .await
            .unwrap();
        store
            .upsert(
                Collection::MobileMoneyBalances,
                vec![json!({ "operator": "MTN", "withdrawal_balance": 50 })],
                "operator",
            )
            .await
            .unwrap();

        let rows = store.select_all(Collection::MobileMoneyBalances).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["deposit_balance"], 1000);
        assert_eq!(rows[0]["withdrawal_balance"], 50);
    }

    #[tokio::test]
    async fn upsert_batch_missing_conflict_key_writes_nothing() {
        let store = InMemoryRemoteStore::new();
        let err = store
            .upsert(
                Collection::MobileMoneyBalances,
                vec![
                    json!({ "operator": "MTN", "deposit_balance": 1000 }),
                    json!({ "deposit_balance": 5 }),
                ],
                "operator",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteError::Malformed(_)));
        assert!(store.rows(Collection::MobileMoneyBalances).is_empty());
        assert!(store.journal().is_empty());
    }

    #[tokio::test]
    async fn increment_past_range_is_rejected_and_store_stays_usable() {
        let store = InMemoryRemoteStore::new();
        store
            .increment(Collection::MobileMoneyBalances, "operator", &json!("MTN"), "deposit_balance", i64::MAX)
            .await
            .unwrap();

        let err = store
            .increment(Collection::MobileMoneyBalances, "operator", &json!("MTN"), "deposit_balance", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { .. }));

        let rows = store.select_all(Collection::MobileMoneyBalances).await.unwrap();
        assert_eq!(rows[0]["deposit_balance"], i64::MAX);
        assert_eq!(store.journal().len(), 1);
    }

    #[tokio::test]
    async fn increment_by_id_requires_existing_row() {
        let store = InMemoryRemoteStore::new();
        let err = store
            .increment(Collection::Products, "id", &json!("missing"), "stock", -1)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound { .. }));

        store
            .increment(Collection::MobileMoneyBalances, "operator", &json!("Moov"), "deposit_balance", 300)
            .await
            .unwrap();
        let rows = store.select_all(Collection::MobileMoneyBalances).await.unwrap();
        assert_eq!(rows[0]["deposit_balance"], 300);
        assert_eq!(rows[0]["withdrawal_balance"], 0);
    }

    #[tokio::test]
    async fn unreachable_store_fails_with_network_error() {
        let store = InMemoryRemoteStore::new();
        store.set_reachable(false);
        let err = store.select_all(Collection::Products).await.unwrap_err();
        assert!(err.is_network());

        store.set_reachable(true);
        store.reject_writes(Collection::Categories, true);
        let err = store
            .insert(Collection::Categories, vec![json!({ "name": "Boissons" })])
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { .. }));
        assert!(store.journal().is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_unknown_ids_are_not_found() {
        let store = InMemoryRemoteStore::new();
        let id = RecordId::new("local-abc");
        assert!(matches!(
            store.update(Collection::Products, &id, json!({ "price": 1 })).await,
            Err(RemoteError::NotFound { .. })
        ));
        assert!(matches!(
            store.delete(Collection::Products, &id).await,
            Err(RemoteError::NotFound { .. })
        ));
    }
}
