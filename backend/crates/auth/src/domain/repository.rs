//! Repository Traits
//!
//! Interfaces for data persistence. Implementations live in the
//! infrastructure layer (PostgreSQL, in-memory).

use chrono::{DateTime, Utc};

use crate::domain::entity::{
    refresh_token::{NewRefreshToken, RefreshToken},
    user::{NewUser, User},
};
use crate::domain::value_object::{device_id::DeviceId, email::Email, user_id::UserId};
use crate::error::AuthResult;

/// User store
#[trait_variant::make(UserRepository: Send)]
pub trait LocalUserRepository {
    /// Insert a user; duplicate email or username is `AlreadyExists`
    async fn create(&self, user: &NewUser) -> AuthResult<User>;

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>>;

    /// Replace the password hash; unknown email is `UserNotFound`
    async fn update_password(&self, email: &Email, password_hash: &str) -> AuthResult<User>;

    /// Set `verified` and `verified_at`; unknown email is `UserNotFound`
    async fn mark_verified(&self, email: &Email, at: DateTime<Utc>) -> AuthResult<User>;
}

/// Refresh token store
#[trait_variant::make(RefreshTokenRepository: Send)]
pub trait LocalRefreshTokenRepository {
    /// Insert a row; a second active row for the same (user, device) or a
    /// duplicate hash is `AlreadyExists`
    async fn insert(&self, token: &NewRefreshToken) -> AuthResult<RefreshToken>;

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>>;

    /// Revoke one row if it is not revoked yet
    ///
    /// Returns `false` when another caller revoked it first.
    async fn revoke(&self, id: i64, at: DateTime<Utc>) -> AuthResult<bool>;

    /// Revoke every unrevoked row of (user, device); returns rows affected
    async fn revoke_device(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
        at: DateTime<Utc>,
    ) -> AuthResult<u64>;

    /// Revoke every unrevoked row of the user; returns rows affected
    async fn revoke_all(&self, user_id: UserId, at: DateTime<Utc>) -> AuthResult<u64>;

    /// Delete rows revoked or expired before `cutoff`; returns rows deleted
    async fn purge(&self, cutoff: DateTime<Utc>) -> AuthResult<u64>;
}
