//! Ephemeral Token Store
//!
//! Key/value storage with a per-entry TTL. Backs the asynchronous email
//! flows (verify / reset capabilities), the consumer idempotency markers and
//! the media-upload session.
//!
//! Every operation is scoped to a single key and atomic for that key, so
//! concurrent redemptions of the same token observe a consistent value.

mod memory;
mod redis_store;

pub use memory::MemoryTokenStore;
pub use redis_store::RedisTokenStore;

use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

// ============================================================================
// Key namespaces
// ============================================================================

/// `worker:email:verify:<token>` -> email
pub const EMAIL_VERIFY_PREFIX: &str = "worker:email:verify:";

/// `worker:email:reset:<token>` -> email
pub const EMAIL_RESET_PREFIX: &str = "worker:email:reset:";

/// `worker:email:processed:<event_id>` -> marker
pub const EMAIL_PROCESSED_PREFIX: &str = "worker:email:processed:";

/// `upload:verify:<object_key>` -> user id (owned by the media service)
pub const UPLOAD_VERIFY_PREFIX: &str = "upload:verify:";

/// Build a namespaced key
pub fn key(prefix: &str, id: &str) -> String {
    format!("{prefix}{id}")
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum CacheError {
    /// No live entry for the key
    #[error("Cache key not found")]
    NotFound,

    #[error("Cache value encoding failed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Cache backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

impl CacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound)
    }
}

// ============================================================================
// Store trait
// ============================================================================

/// Ephemeral key/value store
///
/// Values are JSON encoded. `put` overwrites, `delete` is idempotent.
#[trait_variant::make(TokenStore: Send)]
pub trait LocalTokenStore {
    async fn put<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Decode the live entry for `key`, or `CacheError::NotFound`
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<T, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Read and delete in one step; of two concurrent takes of the same key
    /// at most one sees the value
    async fn take<T: DeserializeOwned + Send>(&self, key: &str) -> Result<T, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
}
