/// Replicated store boundary backing the cache
///
/// The cache never talks to a storage engine directly; it goes through the
/// `CacheStore` trait, which is the same surface a replicated peer store
/// exposes: get/put/del plus the append-only authorization grants used when
/// peers connect on the replication swarm.
use crate::error::{ResolverError, ResolverResult};
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::sync::Mutex;

/// One cache store: the local database or a replicated peer handle
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Raw entry bytes for a key, if present
    async fn get(&self, key: &str) -> ResolverResult<Option<Vec<u8>>>;

    /// Write raw entry bytes for a key, overwriting any previous value
    async fn put(&self, key: &str, entry: &[u8]) -> ResolverResult<()>;

    /// Remove a key
    async fn del(&self, key: &str) -> ResolverResult<()>;

    /// Whether a peer has been granted write access
    async fn authorized(&self, peer_id: &str) -> ResolverResult<bool>;

    /// Grant write access to a peer. One-way: grants are never revoked here.
    async fn authorize(&self, peer_id: &str) -> ResolverResult<()>;

    /// Tear down the store. Must run after its discovery channel is left.
    async fn close(&self) -> ResolverResult<()>;
}

/// SQLite-backed store, one database file per store under the cache root
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a store at `path`.
    ///
    /// Open failures here are fatal to node startup.
    pub async fn open(path: &Path) -> ResolverResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePool::connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await
        .map_err(|e| {
            ResolverError::StorageUnavailable(format!("failed to open store {:?}: {}", path, e))
        })?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> ResolverResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entry (
                key TEXT PRIMARY KEY,
                entry BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS store_acl (
                peer TEXT PRIMARY KEY
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, key: &str) -> ResolverResult<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT entry FROM cache_entry WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("entry")?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, entry: &[u8]) -> ResolverResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_entry (key, entry)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET entry = excluded.entry
            "#,
        )
        .bind(key)
        .bind(entry)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn del(&self, key: &str) -> ResolverResult<()> {
        sqlx::query("DELETE FROM cache_entry WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn authorized(&self, peer_id: &str) -> ResolverResult<bool> {
        let row = sqlx::query("SELECT peer FROM store_acl WHERE peer = ?1")
            .bind(peer_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn authorize(&self, peer_id: &str) -> ResolverResult<()> {
        sqlx::query("INSERT OR IGNORE INTO store_acl (peer) VALUES (?1)")
            .bind(peer_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn close(&self) -> ResolverResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// In-memory store used by tests and in-process peer handles
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    acl: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> ResolverResult<Option<Vec<u8>>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: &[u8]) -> ResolverResult<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), entry.to_vec());
        Ok(())
    }

    async fn del(&self, key: &str) -> ResolverResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn authorized(&self, peer_id: &str) -> ResolverResult<bool> {
        Ok(self.acl.lock().await.contains(peer_id))
    }

    async fn authorize(&self, peer_id: &str) -> ResolverResult<()> {
        self.acl.lock().await.insert(peer_id.to_string());
        Ok(())
    }

    async fn close(&self) -> ResolverResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("cache.sqlite"))
            .await
            .unwrap();

        assert_eq!(store.get("k").await.unwrap(), None);
        store.put("k", b"hello").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"hello".to_vec()));

        store.put("k", b"world").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"world".to_vec()));

        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_store_acl_is_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("cache.sqlite"))
            .await
            .unwrap();

        assert!(!store.authorized("peer-a").await.unwrap());
        store.authorize("peer-a").await.unwrap();
        assert!(store.authorized("peer-a").await.unwrap());

        // re-granting is a no-op
        store.authorize("peer-a").await.unwrap();
        assert!(store.authorized("peer-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        store.put("k", b"v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
