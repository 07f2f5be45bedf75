//! In-memory repository
//!
//! Same contract as `PgAuthRepository`, including the unique constraints
//! (email, username, token hash, one unrevoked row per user and device), so
//! the services can be exercised without a database.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::entity::{
    refresh_token::{NewRefreshToken, RefreshToken},
    user::{NewUser, User},
};
use crate::domain::repository::{RefreshTokenRepository, UserRepository};
use crate::domain::value_object::{device_id::DeviceId, email::Email, user_id::UserId};
use crate::error::{AuthError, AuthResult};

#[derive(Default)]
struct State {
    users: Vec<User>,
    tokens: Vec<RefreshToken>,
    next_user_id: i64,
    next_token_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryAuthRepository {
    state: Arc<RwLock<State>>,
}

impl MemoryAuthRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.state.read().await.users.len()
    }

    /// Every refresh row of the user, newest last
    pub async fn tokens_of(&self, user_id: UserId) -> Vec<RefreshToken> {
        self.state
            .read()
            .await
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Active rows for (user, device) at `now`
    #[cfg(test)]
    pub async fn count_active(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
        now: DateTime<Utc>,
    ) -> u64 {
        self.state
            .read()
            .await
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && &t.device_id == device_id && t.is_active(now))
            .count() as u64
    }
}

impl UserRepository for MemoryAuthRepository {
    async fn create(&self, user: &NewUser) -> AuthResult<User> {
        let mut state = self.state.write().await;
        if state.users.iter().any(|u| u.email == user.email) {
            return Err(AuthError::Duplicate("email"));
        }
        if state.users.iter().any(|u| u.username == user.username) {
            return Err(AuthError::Duplicate("username"));
        }

        state.next_user_id += 1;
        let now = Utc::now();
        let created = User {
            id: UserId::new(state.next_user_id),
            email: user.email.clone(),
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            verified: false,
            verified_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        state.users.push(created.clone());
        Ok(created)
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| &u.email == email).cloned())
    }

    async fn update_password(&self, email: &Email, password_hash: &str) -> AuthResult<User> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| &u.email == email)
            .ok_or(AuthError::UserNotFound)?;
        user.password_hash = password_hash.to_string();
        user.version += 1;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn mark_verified(&self, email: &Email, at: DateTime<Utc>) -> AuthResult<User> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| &u.email == email)
            .ok_or(AuthError::UserNotFound)?;
        user.verified = true;
        user.verified_at.get_or_insert(at);
        user.version += 1;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

impl RefreshTokenRepository for MemoryAuthRepository {
    async fn insert(&self, token: &NewRefreshToken) -> AuthResult<RefreshToken> {
        let mut state = self.state.write().await;
        if state.tokens.iter().any(|t| t.token_hash == token.token_hash) {
            return Err(AuthError::Duplicate("refresh token"));
        }
        if state.tokens.iter().any(|t| {
            t.user_id == token.user_id && t.device_id == token.device_id && t.revoked_at.is_none()
        }) {
            return Err(AuthError::Duplicate("active device session"));
        }

        state.next_token_id += 1;
        let row = RefreshToken {
            id: state.next_token_id,
            user_id: token.user_id,
            device_id: token.device_id.clone(),
            token_hash: token.token_hash.clone(),
            expires_at: token.expires_at,
            revoked_at: None,
            created_at: token.created_at,
        };
        state.tokens.push(row.clone());
        Ok(row)
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        let state = self.state.read().await;
        Ok(state
            .tokens
            .iter()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn revoke(&self, id: i64, at: DateTime<Utc>) -> AuthResult<bool> {
        let mut state = self.state.write().await;
        match state
            .tokens
            .iter_mut()
            .find(|t| t.id == id && t.revoked_at.is_none())
        {
            Some(token) => {
                token.revoked_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_device(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
        at: DateTime<Utc>,
    ) -> AuthResult<u64> {
        let mut state = self.state.write().await;
        let mut affected = 0;
        for token in state.tokens.iter_mut().filter(|t| {
            t.user_id == user_id && &t.device_id == device_id && t.revoked_at.is_none()
        }) {
            token.revoked_at = Some(at);
            affected += 1;
        }
        Ok(affected)
    }

    async fn revoke_all(&self, user_id: UserId, at: DateTime<Utc>) -> AuthResult<u64> {
        let mut state = self.state.write().await;
        let mut affected = 0;
        for token in state
            .tokens
            .iter_mut()
            .filter(|t| t.user_id == user_id && t.revoked_at.is_none())
        {
            token.revoked_at = Some(at);
            affected += 1;
        }
        Ok(affected)
    }

    async fn purge(&self, cutoff: DateTime<Utc>) -> AuthResult<u64> {
        let mut state = self.state.write().await;
        let before = state.tokens.len();
        state
            .tokens
            .retain(|t| !(t.revoked_at.is_some_and(|r| r < cutoff) || t.expires_at < cutoff));
        Ok((before - state.tokens.len()) as u64)
    }
}
