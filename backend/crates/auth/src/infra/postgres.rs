//! PostgreSQL Repository Implementations

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::entity::{
    refresh_token::{NewRefreshToken, RefreshToken},
    user::{NewUser, User},
};
use crate::domain::repository::{RefreshTokenRepository, UserRepository};
use crate::domain::value_object::{
    device_id::DeviceId, email::Email, user_id::UserId, user_name::Username,
};
use crate::error::{AuthError, AuthResult};

const USER_COLUMNS: &str = r#"
    id,
    email,
    username,
    password_hash,
    verified,
    verified_at,
    version,
    created_at,
    updated_at
"#;

const REFRESH_TOKEN_COLUMNS: &str = r#"
    id,
    user_id,
    device_id,
    token_hash,
    expires_at,
    revoked_at,
    created_at
"#;

/// PostgreSQL-backed auth repository
#[derive(Clone)]
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// User Repository Implementation
// ============================================================================

impl UserRepository for PgAuthRepository {
    async fn create(&self, user: &NewUser) -> AuthResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (email, username, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.email.as_str())
        .bind(user.username.as_str())
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(duplicate)?;

        Ok(row.into_user())
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRow::into_user))
    }

    async fn update_password(&self, email: &Email, password_hash: &str) -> AuthResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET password_hash = $2,
                version = version + 1,
                updated_at = NOW()
            WHERE email = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email.as_str())
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user).ok_or(AuthError::UserNotFound)
    }

    async fn mark_verified(&self, email: &Email, at: DateTime<Utc>) -> AuthResult<User> {
        // keep the first verification time on repeated calls
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET verified = TRUE,
                verified_at = COALESCE(verified_at, $2),
                version = version + 1,
                updated_at = NOW()
            WHERE email = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user).ok_or(AuthError::UserNotFound)
    }
}

// ============================================================================
// Refresh Token Repository Implementation
// ============================================================================

impl RefreshTokenRepository for PgAuthRepository {
    async fn insert(&self, token: &NewRefreshToken) -> AuthResult<RefreshToken> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            r#"
            INSERT INTO refresh_tokens (user_id, device_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {REFRESH_TOKEN_COLUMNS}
            "#
        ))
        .bind(token.user_id.value())
        .bind(token.device_id.as_str())
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(token.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(duplicate)?;

        Ok(row.into_token())
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            "SELECT {REFRESH_TOKEN_COLUMNS} FROM refresh_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RefreshTokenRow::into_token))
    }

    async fn revoke(&self, id: i64, at: DateTime<Utc>) -> AuthResult<bool> {
        let affected = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected == 1)
    }

    async fn revoke_device(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
        at: DateTime<Utc>,
    ) -> AuthResult<u64> {
        let affected = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $3
            WHERE user_id = $1 AND device_id = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(user_id.value())
        .bind(device_id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected)
    }

    async fn revoke_all(&self, user_id: UserId, at: DateTime<Utc>) -> AuthResult<u64> {
        let affected = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id.value())
        .bind(at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected)
    }

    async fn purge(&self, cutoff: DateTime<Utc>) -> AuthResult<u64> {
        let deleted = sqlx::query(
            "DELETE FROM refresh_tokens WHERE revoked_at < $1 OR expires_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted)
    }
}

/// Unique violations name the field they hit; everything else stays a
/// database error
fn duplicate(err: sqlx::Error) -> AuthError {
    let field = match err
        .as_database_error()
        .filter(|db| db.is_unique_violation())
        .and_then(|db| db.constraint())
    {
        Some("users_email_key") => Some("email"),
        Some("users_username_key") => Some("username"),
        Some("refresh_tokens_token_hash_key") => Some("refresh token"),
        Some("refresh_tokens_active_device_idx") => Some("active device session"),
        _ => None,
    };

    match field {
        Some(field) => AuthError::Duplicate(field),
        None => AuthError::Database(err),
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    username: String,
    password_hash: String,
    verified: bool,
    verified_at: Option<DateTime<Utc>>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> User {
        User {
            id: UserId::new(self.id),
            email: Email::from_db(self.email),
            username: Username::from_db(self.username),
            password_hash: self.password_hash,
            verified: self.verified,
            verified_at: self.verified_at,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: i64,
    user_id: i64,
    device_id: String,
    token_hash: String,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl RefreshTokenRow {
    fn into_token(self) -> RefreshToken {
        RefreshToken {
            id: self.id,
            user_id: UserId::new(self.user_id),
            device_id: DeviceId::from_db(self.device_id),
            token_hash: self.token_hash,
            expires_at: self.expires_at,
            revoked_at: self.revoked_at,
            created_at: self.created_at,
        }
    }
}
