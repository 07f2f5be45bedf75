//! In-process token store
//!
//! Used by tests and by single-node deployments without Redis. Entries
//! carry a deadline on the tokio clock, so tests drive expiry with
//! `tokio::time::pause`/`advance`. Expired entries are dropped when they are
//! touched and swept on every write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{CacheError, TokenStore};

#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, deadline)| *deadline > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Live keys starting with `prefix`
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .iter()
            .filter(|(k, (_, deadline))| k.starts_with(prefix) && *deadline > now)
            .map(|(k, _)| k.clone())
            .collect()
    }
}

impl TokenStore for MemoryTokenStore {
    async fn put<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value)?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, deadline)| *deadline > now);
        entries.insert(key.to_string(), (payload, now + ttl));
        Ok(())
    }

    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<T, CacheError> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some((payload, deadline)) if *deadline > Instant::now() => {
                Ok(serde_json::from_str(payload)?)
            }
            Some(_) => {
                entries.remove(key);
                Err(CacheError::NotFound)
            }
            None => Err(CacheError::NotFound),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn take<T: DeserializeOwned + Send>(&self, key: &str) -> Result<T, CacheError> {
        match self.entries.write().await.remove(key) {
            Some((payload, deadline)) if deadline > Instant::now() => {
                Ok(serde_json::from_str(&payload)?)
            }
            _ => Err(CacheError::NotFound),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some((_, deadline)) if *deadline > Instant::now() => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}
