//! Redis-backed token store

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Serialize, de::DeserializeOwned};

use super::{CacheError, TokenStore};

/// Token store over a shared Redis connection manager
///
/// `ConnectionManager` is cheap to clone and reconnects on its own; each
/// command runs on a clone.
#[derive(Clone)]
pub struct RedisTokenStore {
    conn: ConnectionManager,
}

impl RedisTokenStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Open a client for `url` and wrap it in a connection manager
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

impl TokenStore for RedisTokenStore {
    async fn put<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value)?;
        // SET EX rejects 0
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, payload, seconds).await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<T, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        let raw = raw.ok_or(CacheError::NotFound)?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn take<T: DeserializeOwned + Send>(&self, key: &str) -> Result<T, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get_del(key).await?;
        let raw = raw.ok_or(CacheError::NotFound)?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }
}
