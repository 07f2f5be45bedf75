//! Session Service
//!
//! Mints, rotates and revokes refresh/access pairs.
//!
//! ## Invariants
//! - At most one active refresh row per (user, device) once `create_session`
//!   returns; a concurrent insert that trips the partial unique index is
//!   retried after revoking again
//! - A refresh token is single-use. Presenting a rotated (revoked) token is
//!   treated as theft and revokes every session of the user
//! - Raw refresh tokens are neither logged nor stored; only their SHA-256

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use kernel::error::kind::ErrorKind;
use platform::crypto::{opaque_token, sha256_hex};
use serde::Serialize;

use crate::application::token_codec::{AccessClaims, TokenCodec};
use crate::domain::entity::refresh_token::NewRefreshToken;
use crate::domain::repository::RefreshTokenRepository;
use crate::domain::value_object::{device_id::DeviceId, user_id::UserId};
use crate::error::{AuthError, AuthResult};

/// Insert attempts before a create-session race is reported
const MAX_CREATE_ATTEMPTS: u32 = 3;

/// Token pair returned to the client
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    pub token_type: &'static str,
}

pub struct SessionService<R>
where
    R: RefreshTokenRepository + Send + Sync + 'static,
{
    repo: Arc<R>,
    codec: Arc<TokenCodec>,
    refresh_ttl: Duration,
    retention: Duration,
}

fn offset(now: DateTime<Utc>, by: Duration, forward: bool) -> AuthResult<DateTime<Utc>> {
    let delta = TimeDelta::from_std(by)
        .map_err(|_| AuthError::Internal("duration out of range".to_string()))?;
    let shifted = if forward {
        now.checked_add_signed(delta)
    } else {
        now.checked_sub_signed(delta)
    };
    shifted.ok_or_else(|| AuthError::Internal("timestamp out of range".to_string()))
}

impl<R> SessionService<R>
where
    R: RefreshTokenRepository + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>, codec: Arc<TokenCodec>, refresh_ttl: Duration, retention: Duration) -> Self {
        Self {
            repo,
            codec,
            refresh_ttl,
            retention,
        }
    }

    /// Issue a fresh pair for (user, device), revoking the previous one
    pub async fn create_session(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
    ) -> AuthResult<TokenInfo> {
        let access_token = self.codec.sign(user_id, device_id)?;

        let mut attempt = 1;
        loop {
            let now = Utc::now();

            // best-effort; the unique index still guards the insert
            if let Err(e) = self.repo.revoke_device(user_id, device_id, now).await {
                tracing::warn!(
                    user_id = %user_id,
                    device_id = %device_id,
                    error = %e,
                    "Revoking previous device session failed"
                );
            }

            let raw = opaque_token();
            let row = NewRefreshToken {
                user_id,
                device_id: device_id.clone(),
                token_hash: sha256_hex(raw.as_bytes()),
                expires_at: offset(now, self.refresh_ttl, true)?,
                created_at: now,
            };

            match self.repo.insert(&row).await {
                Ok(_) => {
                    tracing::info!(user_id = %user_id, device_id = %device_id, "Session created");
                    return Ok(TokenInfo {
                        access_token,
                        refresh_token: raw,
                        expires_in: self.codec.access_ttl().as_secs(),
                        token_type: "Bearer",
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_CREATE_ATTEMPTS => {
                    tracing::debug!(
                        user_id = %user_id,
                        device_id = %device_id,
                        attempt,
                        "Concurrent session creation, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Rotate a refresh token
    pub async fn refresh(&self, raw_refresh: &str) -> AuthResult<TokenInfo> {
        let now = Utc::now();
        let token = self
            .repo
            .find_by_hash(&sha256_hex(raw_refresh.as_bytes()))
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if token.is_revoked() {
            tracing::warn!(
                user_id = %token.user_id,
                device_id = %token.device_id,
                "Rotated refresh token replayed, revoking all sessions"
            );
            self.revoke_all_user_sessions(token.user_id).await?;
            return Err(AuthError::InvalidRefreshToken);
        }

        if token.is_expired(now) {
            return Err(AuthError::InvalidRefreshToken);
        }

        // conditional revoke: exactly one concurrent caller wins
        if !self.repo.revoke(token.id, now).await? {
            tracing::warn!(
                user_id = %token.user_id,
                device_id = %token.device_id,
                "Concurrent refresh token reuse, revoking all sessions"
            );
            self.revoke_all_user_sessions(token.user_id).await?;
            return Err(AuthError::InvalidRefreshToken);
        }

        self.create_session(token.user_id, &token.device_id).await
    }

    /// Revoke the session a raw refresh token belongs to
    pub async fn revoke_single(&self, raw_refresh: &str) -> AuthResult<()> {
        let token = self
            .repo
            .find_by_hash(&sha256_hex(raw_refresh.as_bytes()))
            .await?
            .ok_or(AuthError::SessionNotFound)?;
        self.repo.revoke(token.id, Utc::now()).await?;
        Ok(())
    }

    pub async fn revoke_device_session(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
    ) -> AuthResult<u64> {
        let revoked = self.repo.revoke_device(user_id, device_id, Utc::now()).await?;
        tracing::info!(user_id = %user_id, device_id = %device_id, revoked, "Device session revoked");
        Ok(revoked)
    }

    pub async fn revoke_all_user_sessions(&self, user_id: UserId) -> AuthResult<u64> {
        let revoked = self.repo.revoke_all(user_id, Utc::now()).await?;
        tracing::info!(user_id = %user_id, revoked, "All user sessions revoked");
        Ok(revoked)
    }

    /// Delete rows revoked or expired longer than the retention period ago
    pub async fn cleanup(&self) -> AuthResult<u64> {
        let cutoff = offset(Utc::now(), self.retention, false)?;
        self.repo.purge(cutoff).await
    }

    pub fn validate(&self, access_token: &str) -> AuthResult<AccessClaims> {
        Ok(self.codec.parse(access_token)?)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use secrecy::SecretString;

    use crate::application::config::AuthConfig;
    use crate::infra::MemoryAuthRepository;

    fn service(repo: Arc<MemoryAuthRepository>) -> SessionService<MemoryAuthRepository> {
        let config = AuthConfig::new(SecretString::new("k".repeat(32)));
        SessionService::new(
            repo,
            Arc::new(TokenCodec::new(&config)),
            config.refresh_token_ttl,
            config.retention,
        )
    }

    fn device(name: &str) -> DeviceId {
        DeviceId::from_db(name)
    }

    #[tokio::test]
    async fn test_create_session_replaces_previous() {
        let repo = Arc::new(MemoryAuthRepository::new());
        let sessions = service(repo.clone());
        let user = UserId::new(7);

        let first = sessions.create_session(user, &device("phone")).await.unwrap();
        let second = sessions.create_session(user, &device("phone")).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
        assert_eq!(second.token_type, "Bearer");
        assert_eq!(second.expires_in, 15 * 60);

        let active = repo.count_active(user, &device("phone"), Utc::now()).await;
        assert_eq!(active, 1);

        // the replaced token is now a rotated one
        assert!(matches!(
            sessions.refresh(&first.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_raw_token_is_not_stored() {
        let repo = Arc::new(MemoryAuthRepository::new());
        let sessions = service(repo.clone());
        let user = UserId::new(1);

        let info = sessions.create_session(user, &device("d")).await.unwrap();
        let rows = repo.tokens_of(user).await;
        assert_eq!(rows.len(), 1);
        assert_ne!(rows[0].token_hash, info.refresh_token);
        assert_eq!(rows[0].token_hash, sha256_hex(info.refresh_token.as_bytes()));
    }

    #[tokio::test]
    async fn test_refresh_rotates_once() {
        let repo = Arc::new(MemoryAuthRepository::new());
        let sessions = service(repo.clone());
        let user = UserId::new(3);

        let issued = sessions.create_session(user, &device("laptop")).await.unwrap();
        let rotated = sessions.refresh(&issued.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, issued.refresh_token);

        let claims = sessions.validate(&rotated.access_token).unwrap();
        assert_eq!(claims.user_id().unwrap(), user);
        assert_eq!(claims.device_id(), device("laptop"));

        // replay of the rotated token kills every session, including the new one
        assert!(matches!(
            sessions.refresh(&issued.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
        assert!(matches!(
            sessions.refresh(&rotated.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
        assert!(repo.tokens_of(user).await.iter().all(|t| t.is_revoked()));
    }

    #[tokio::test]
    async fn test_refresh_unknown_and_expired() {
        let repo = Arc::new(MemoryAuthRepository::new());
        let sessions = service(repo.clone());

        assert!(matches!(
            sessions.refresh("never-issued").await,
            Err(AuthError::InvalidRefreshToken)
        ));

        let now = Utc::now();
        repo.insert(&NewRefreshToken {
            user_id: UserId::new(9),
            device_id: device("old"),
            token_hash: sha256_hex(b"stale"),
            expires_at: now - TimeDelta::seconds(1),
            created_at: now - TimeDelta::days(30),
        })
        .await
        .unwrap();

        assert!(matches!(
            sessions.refresh("stale").await,
            Err(AuthError::InvalidRefreshToken)
        ));
        // expiry alone has no side effects
        assert!(!repo.tokens_of(UserId::new(9)).await[0].is_revoked());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_has_one_winner() {
        let repo = Arc::new(MemoryAuthRepository::new());
        let sessions = Arc::new(service(repo.clone()));
        let user = UserId::new(11);
        let issued = sessions.create_session(user, &device("tab")).await.unwrap();

        let a = {
            let sessions = sessions.clone();
            let raw = issued.refresh_token.clone();
            tokio::spawn(async move { sessions.refresh(&raw).await })
        };
        let b = {
            let sessions = sessions.clone();
            let raw = issued.refresh_token.clone();
            tokio::spawn(async move { sessions.refresh(&raw).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(AuthError::InvalidRefreshToken)))
        );
        // the first row was rotated exactly once
        let original = repo
            .find_by_hash(&sha256_hex(issued.refresh_token.as_bytes()))
            .await
            .unwrap()
            .unwrap();
        assert!(original.is_revoked());
    }

    #[tokio::test]
    async fn test_revoke_single_and_device() {
        let repo = Arc::new(MemoryAuthRepository::new());
        let sessions = service(repo.clone());
        let user = UserId::new(5);

        let a = sessions.create_session(user, &device("a")).await.unwrap();
        sessions.create_session(user, &device("b")).await.unwrap();

        sessions.revoke_single(&a.refresh_token).await.unwrap();
        assert!(matches!(
            sessions.revoke_single("unknown").await,
            Err(AuthError::SessionNotFound)
        ));

        assert_eq!(sessions.revoke_device_session(user, &device("b")).await.unwrap(), 1);
        assert_eq!(sessions.revoke_all_user_sessions(user).await.unwrap(), 0);
    }

    #[quickcheck]
    fn prop_at_most_one_active_session(ops: Vec<(u8, u8)>) -> bool {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let repo = Arc::new(MemoryAuthRepository::new());
            let sessions = service(repo.clone());

            for (user, dev) in &ops {
                let user = UserId::new(i64::from(user % 3));
                let dev = device(&format!("d{}", dev % 3));
                sessions.create_session(user, &dev).await.unwrap();
            }

            let now = Utc::now();
            for user in 0..3 {
                for dev in 0..3 {
                    let active = repo
                        .count_active(UserId::new(user), &device(&format!("d{dev}")), now)
                        .await;
                    if active > 1 {
                        return false;
                    }
                }
            }
            true
        })
    }
}
