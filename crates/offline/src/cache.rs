//! Local cache of whole-collection JSON blobs (offline support).
//!
//! Every key holds one serialized collection and is overwritten entirely on
//! save; there is no merging and no schema version tag.

use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;

use shopsync_infra::Collection;

use crate::config::CacheLocation;

/// Keys stored in the cache.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Products,
    Categories,
    Sales,
    MobileMoneyBalances,
    MobileMoneyTransactions,
    PendingActions,
    CurrentUser,
}

impl CacheKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::Products => "products",
            CacheKey::Categories => "categories",
            CacheKey::Sales => "sales",
            CacheKey::MobileMoneyBalances => "mobile_money_balances",
            CacheKey::MobileMoneyTransactions => "mobile_money_transactions",
            CacheKey::PendingActions => "pending_actions",
            CacheKey::CurrentUser => "current_user",
        }
    }

    /// Cache key holding a remote collection, if that collection is cached.
    pub fn for_collection(collection: Collection) -> Option<CacheKey> {
        match collection {
            Collection::Products => Some(CacheKey::Products),
            Collection::Categories => Some(CacheKey::Categories),
            Collection::Sales => Some(CacheKey::Sales),
            Collection::MobileMoneyBalances => Some(CacheKey::MobileMoneyBalances),
            Collection::MobileMoneyTransactions => Some(CacheKey::MobileMoneyTransactions),
            Collection::Users => None,
        }
    }
}

impl core::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("cache entry '{key}' is corrupt: {reason}")]
    Corrupt { key: CacheKey, reason: String },

    #[error("failed to serialize '{key}': {reason}")]
    Serialize { key: CacheKey, reason: String },
}

/// SQLite-backed local cache.
///
/// Cheap to clone; clones share the same pool.
#[derive(Debug, Clone)]
pub struct LocalCache {
    pool: SqlitePool,
}

impl LocalCache {
    /// Open the cache at the configured location, creating it if needed.
    pub async fn open(location: &CacheLocation) -> anyhow::Result<Self> {
        match location {
            CacheLocation::File(path) => Self::open_file(path).await,
            CacheLocation::InMemory => Self::in_memory().await,
        }
    }

    pub async fn open_file(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create cache directory at {:?}", parent))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("failed to create SQLite pool for LocalCache at {:?}", path))?;

        Self::with_pool(pool).await
    }

    /// A private in-memory database; contents vanish with the last clone.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("invalid in-memory SQLite URL")?;

        // Each connection to :memory: is its own database, so pin exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("failed to create in-memory SQLite pool for LocalCache")?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key       TEXT PRIMARY KEY,
                data      TEXT NOT NULL,
                saved_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create cache_entries table")?;

        Ok(Self { pool })
    }

    /// Load a collection. A missing key yields an empty collection.
    pub async fn load<T>(&self, key: CacheKey) -> Result<Vec<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        Ok(self.load_value(key).await?.unwrap_or_default())
    }

    /// Overwrite a collection.
    pub async fn save<T>(&self, key: CacheKey, records: &[T]) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        self.save_value(key, &records).await
    }

    /// Load a single value (e.g. the cached user).
    pub async fn load_value<T>(&self, key: CacheKey) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        let raw = match self.load_raw(key).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CacheError::Corrupt {
                key,
                reason: e.to_string(),
            })
    }

    pub async fn save_value<T>(&self, key: CacheKey, value: &T) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_string(value).map_err(|e| CacheError::Serialize {
            key,
            reason: e.to_string(),
        })?;
        self.save_raw(key, &payload).await
    }

    pub async fn remove(&self, key: CacheKey) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Clear every cached entry.
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_raw(&self, key: CacheKey) -> Result<Option<String>, CacheError> {
        let row = sqlx::query(
            r#"
            SELECT data
            FROM cache_entries
            WHERE key = ?1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("data")?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn save_raw(&self, key: CacheKey, payload: &str) -> Result<(), CacheError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, data, saved_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key)
            DO UPDATE SET
                data = excluded.data,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(key.as_str())
        .bind(payload)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: String,
        stock: i64,
    }

    fn rows(n: i64) -> Vec<Record> {
        (0..n)
            .map(|i| Record {
                id: format!("r-{i}"),
                stock: i,
            })
            .collect()
    }

    #[test]
    fn remote_collections_map_to_their_keys() {
        assert_eq!(CacheKey::for_collection(Collection::Products), Some(CacheKey::Products));
        assert_eq!(
            CacheKey::for_collection(Collection::MobileMoneyBalances).map(|k| k.as_str()),
            Some("mobile_money_balances")
        );
        assert_eq!(CacheKey::for_collection(Collection::Users), None);
    }

    #[tokio::test]
    async fn missing_key_loads_empty() {
        let cache = LocalCache::in_memory().await.unwrap();
        let loaded: Vec<Record> = cache.load(CacheKey::Products).await.unwrap();
        assert!(loaded.is_empty());
        let user: Option<Record> = cache.load_value(CacheKey::CurrentUser).await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn save_overwrites_whole_collection() {
        let cache = LocalCache::in_memory().await.unwrap();
        cache.save(CacheKey::Products, &rows(3)).await.unwrap();
        cache.save(CacheKey::Products, &rows(1)).await.unwrap();

        let loaded: Vec<Record> = cache.load(CacheKey::Products).await.unwrap();
        assert_eq!(loaded, rows(1));
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let cache = LocalCache::in_memory().await.unwrap();
        cache.save(CacheKey::Products, &rows(2)).await.unwrap();
        cache.save(CacheKey::Sales, &rows(5)).await.unwrap();
        cache.remove(CacheKey::Sales).await.unwrap();

        let products: Vec<Record> = cache.load(CacheKey::Products).await.unwrap();
        let sales: Vec<Record> = cache.load(CacheKey::Sales).await.unwrap();
        assert_eq!(products.len(), 2);
        assert!(sales.is_empty());

        cache.clear_all().await.unwrap();
        let products: Vec<Record> = cache.load(CacheKey::Products).await.unwrap();
        assert!(products.is_empty());
    }

    #[tokio::test]
    async fn corrupt_entry_is_surfaced() {
        let cache = LocalCache::in_memory().await.unwrap();
        cache.save_raw(CacheKey::Sales, "{not json").await.unwrap();

        let err = cache.load::<Record>(CacheKey::Sales).await.unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { key: CacheKey::Sales, .. }));
    }

    #[tokio::test]
    async fn file_cache_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("shopsync-cache-{}", uuid::Uuid::now_v7()));
        let path = dir.join("cache.db");

        {
            let cache = LocalCache::open_file(&path).await.unwrap();
            cache.save(CacheKey::Products, &rows(4)).await.unwrap();
        }

        let reopened = LocalCache::open_file(&path).await.unwrap();
        let loaded: Vec<Record> = reopened.load(CacheKey::Products).await.unwrap();
        assert_eq!(loaded, rows(4));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
