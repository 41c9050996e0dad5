use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use thiserror::Error;

use shopsync_core::RecordId;

/// Named collections (tables) of the hosted database.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Products,
    Categories,
    Sales,
    MobileMoneyBalances,
    MobileMoneyTransactions,
    Users,
}

impl Collection {
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Categories => "categories",
            Collection::Sales => "sales",
            Collection::MobileMoneyBalances => "mobile_money_balances",
            Collection::MobileMoneyTransactions => "mobile_money_transactions",
            Collection::Users => "users",
        }
    }

    /// Column defaults the hosted schema applies to rows written without them.
    pub fn column_defaults(&self) -> JsonValue {
        match self {
            Collection::Products => json!({
                "description": null,
                "category_id": null,
                "operator": null,
            }),
            Collection::Sales => json!({ "sold_amount": null }),
            Collection::MobileMoneyBalances => json!({
                "deposit_balance": 0,
                "withdrawal_balance": 0,
            }),
            Collection::Categories => json!({ "description": null }),
            Collection::MobileMoneyTransactions | Collection::Users => json!({}),
        }
    }
}

impl core::fmt::Display for Collection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Remote store operation error.
///
/// `Network` means the request never got an answer; `Rejected` and `NotFound`
/// are answers from the store. Callers treat all of them as "not applied".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rejected by {collection}: {reason}")]
    Rejected {
        collection: Collection,
        reason: String,
    },

    #[error("no row in {collection} matching {key}")]
    NotFound { collection: Collection, key: String },

    #[error("malformed row: {0}")]
    Malformed(String),

    #[error("lock poisoned")]
    Poisoned,
}

impl RemoteError {
    pub fn is_network(&self) -> bool {
        matches!(self, RemoteError::Network(_))
    }
}

/// Hosted database client, one call per round trip.
///
/// Rows are JSON objects. Every method is a suspension point; none are
/// cancellable and no timeout is applied.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select_all(&self, collection: Collection) -> Result<Vec<JsonValue>, RemoteError>;

    async fn select_where(
        &self,
        collection: Collection,
        field: &str,
        value: &JsonValue,
    ) -> Result<Vec<JsonValue>, RemoteError>;

    /// Insert rows; the store assigns `id` and `created_at`. Returns the stored rows.
    async fn insert(
        &self,
        collection: Collection,
        rows: Vec<JsonValue>,
    ) -> Result<Vec<JsonValue>, RemoteError>;

    /// Merge `patch` into the row with the given id.
    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        patch: JsonValue,
    ) -> Result<(), RemoteError>;

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), RemoteError>;

    /// Insert-or-merge keyed by `conflict_key` instead of `id`.
    async fn upsert(
        &self,
        collection: Collection,
        rows: Vec<JsonValue>,
        conflict_key: &str,
    ) -> Result<(), RemoteError>;

    /// Add `delta` to the integer `field` of the row whose `key_field` equals `key_value`.
    ///
    /// When no row matches, a row `{key_field: key_value, field: delta}` is
    /// upserted, unless `key_field` is `id`, in which case the call fails with
    /// `NotFound`.
    ///
    /// The default is a read-modify-write over `select_where` + `update`/`upsert`
    /// and is NOT atomic: two clients incrementing concurrently can lose one
    /// update. Stores with server-side increments should override it.
    async fn increment(
        &self,
        collection: Collection,
        key_field: &str,
        key_value: &JsonValue,
        field: &str,
        delta: i64,
    ) -> Result<(), RemoteError> {
        let rows = self.select_where(collection, key_field, key_value).await?;

        match rows.first() {
            Some(row) => {
                let current = row.get(field).and_then(JsonValue::as_i64).unwrap_or(0);
                let id = row
                    .get("id")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| RemoteError::Malformed(format!("{collection} row without id")))?;
                let next = current.checked_add(delta).ok_or_else(|| RemoteError::Rejected {
                    collection,
                    reason: format!("{field} out of range"),
                })?;
                self.update(collection, &RecordId::new(id), json!({ field: next }))
                    .await
            }
            None if key_field == "id" => Err(RemoteError::NotFound {
                collection,
                key: key_value.to_string(),
            }),
            None => {
                self.upsert(
                    collection,
                    vec![json!({ key_field: key_value, field: delta })],
                    key_field,
                )
                .await
            }
        }
    }
}

#[async_trait]
impl<S> RemoteStore for Arc<S>
where
    S: RemoteStore + ?Sized,
{
    async fn select_all(&self, collection: Collection) -> Result<Vec<JsonValue>, RemoteError> {
        (**self).select_all(collection).await
    }

    async fn select_where(
        &self,
        collection: Collection,
        field: &str,
        value: &JsonValue,
    ) -> Result<Vec<JsonValue>, RemoteError> {
        (**self).select_where(collection, field, value).await
    }

    async fn insert(
        &self,
        collection: Collection,
        rows: Vec<JsonValue>,
    ) -> Result<Vec<JsonValue>, RemoteError> {
        (**self).insert(collection, rows).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        patch: JsonValue,
    ) -> Result<(), RemoteError> {
        (**self).update(collection, id, patch).await
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), RemoteError> {
        (**self).delete(collection, id).await
    }

    async fn upsert(
        &self,
        collection: Collection,
        rows: Vec<JsonValue>,
        conflict_key: &str,
    ) -> Result<(), RemoteError> {
        (**self).upsert(collection, rows, conflict_key).await
    }

    async fn increment(
        &self,
        collection: Collection,
        key_field: &str,
        key_value: &JsonValue,
        field: &str,
        delta: i64,
    ) -> Result<(), RemoteError> {
        (**self)
            .increment(collection, key_field, key_value, field, delta)
            .await
    }
}
