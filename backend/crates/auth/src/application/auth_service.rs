//! Auth Service
//!
//! Account lifecycle on top of the session service and the email flow:
//! register, login, logout, refresh, email verification and password reset.

use std::sync::Arc;

use chrono::Utc;
use platform::broker::EventPublisher;
use platform::cache::TokenStore;
use platform::password::{ClearTextPassword, CredentialHasher};

use crate::application::email_flow::{EmailFlow, EmailPurpose};
use crate::application::session::{SessionService, TokenInfo};
use crate::domain::entity::user::{NewUser, User};
use crate::domain::repository::{RefreshTokenRepository, UserRepository};
use crate::domain::value_object::{
    device_id::DeviceId, email::Email, user_id::UserId, user_name::Username,
};
use crate::error::{AuthError, AuthResult};

/// Register input
pub struct RegisterInput {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Login input
pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub device_id: String,
}

pub struct AuthService<R, K, P>
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    repo: Arc<R>,
    sessions: Arc<SessionService<R>>,
    email: EmailFlow<K, P>,
    hasher: CredentialHasher,
}

impl<R, K, P> AuthService<R, K, P>
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    pub fn new(
        repo: Arc<R>,
        sessions: Arc<SessionService<R>>,
        email: EmailFlow<K, P>,
        hasher: CredentialHasher,
    ) -> Self {
        Self {
            repo,
            sessions,
            email,
            hasher,
        }
    }

    // ========================================================================
    // Account
    // ========================================================================

    /// Create an unverified account and send the verification mail
    ///
    /// A failing mail step is logged; the account is created regardless.
    pub async fn register(&self, input: RegisterInput) -> AuthResult<User> {
        let email = Email::new(&input.email)?;
        let username = Username::new(&input.username)?;
        let password = ClearTextPassword::new(input.password)?;

        if self.repo.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.hash(password).await?;
        let user = match self
            .repo
            .create(&NewUser {
                email,
                username,
                password_hash,
            })
            .await
        {
            Ok(user) => user,
            // lost a race against a concurrent register
            Err(AuthError::Duplicate("email")) => return Err(AuthError::EmailTaken),
            Err(e) => return Err(e),
        };

        tracing::info!(user_id = %user.id, "User registered");

        if let Err(e) = self.email.start(EmailPurpose::Verify, &user).await {
            tracing::warn!(user_id = %user.id, error = %e, "Verification email not queued");
        }

        Ok(user)
    }

    /// Check credentials and open a session on `device_id`
    ///
    /// Unknown email, malformed input and a wrong password are all
    /// `InvalidCredentials`.
    pub async fn login(&self, input: LoginInput) -> AuthResult<(User, TokenInfo)> {
        let device_id = DeviceId::new(input.device_id)?;
        let email = Email::new(&input.email).map_err(|_| AuthError::InvalidCredentials)?;
        let password =
            ClearTextPassword::new(input.password).map_err(|_| AuthError::InvalidCredentials)?;

        let user = self
            .repo
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.verify(password, user.password_hash.clone()).await? {
            tracing::debug!(user_id = %user.id, "Password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.sessions.create_session(user.id, &device_id).await?;
        tracing::info!(user_id = %user.id, device_id = %device_id, "User logged in");
        Ok((user, token))
    }

    /// Revoke the session on one device, or every session of the user
    pub async fn logout(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
        all_devices: bool,
    ) -> AuthResult<u64> {
        if all_devices {
            self.sessions.revoke_all_user_sessions(user_id).await
        } else {
            self.sessions.revoke_device_session(user_id, device_id).await
        }
    }

    pub async fn refresh(&self, raw_refresh: &str) -> AuthResult<TokenInfo> {
        self.sessions.refresh(raw_refresh).await
    }

    // ========================================================================
    // Email verification
    // ========================================================================

    pub async fn verify_email(&self, token: &str) -> AuthResult<User> {
        let email = self.email.redeem(EmailPurpose::Verify, token).await?;
        let user = self.repo.mark_verified(&email, Utc::now()).await?;

        tracing::info!(user_id = %user.id, "Email verified");
        Ok(user)
    }

    /// Send a fresh verification mail to an existing, unverified account
    pub async fn resend_verification(&self, email: &str) -> AuthResult<()> {
        let email = Email::new(email)?;
        let user = self
            .repo
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if user.is_verified() {
            return Err(AuthError::Validation("Email already verified".to_string()));
        }

        self.email.start(EmailPurpose::Verify, &user).await
    }

    // ========================================================================
    // Password reset
    // ========================================================================

    /// Unknown email is `UserNotFound`
    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        let email = Email::new(email)?;
        let user = self
            .repo
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.email.start(EmailPurpose::ResetPassword, &user).await
    }

    /// Set a new password and sign the user out everywhere
    ///
    /// A password rejected by the policy leaves the token usable.
    pub async fn reset_password(&self, token: &str, new_password: String) -> AuthResult<()> {
        let password = ClearTextPassword::new(new_password)?;
        let email = self.email.redeem(EmailPurpose::ResetPassword, token).await?;

        let password_hash = self.hash(password).await?;
        let user = self.repo.update_password(&email, &password_hash).await?;
        self.sessions.revoke_all_user_sessions(user.id).await?;

        tracing::info!(user_id = %user.id, "Password reset");
        Ok(())
    }

    pub async fn is_reset_password_token_valid(&self, token: &str) -> AuthResult<bool> {
        self.email.exists(EmailPurpose::ResetPassword, token).await
    }

    // ========================================================================
    // Hashing
    // ========================================================================

    // bcrypt is CPU bound; keep it off the async workers

    async fn hash(&self, password: ClearTextPassword) -> AuthResult<String> {
        let hasher = self.hasher;
        let hashed = tokio::task::spawn_blocking(move || hasher.hash(password.as_str()))
            .await
            .map_err(|e| AuthError::Internal(format!("hashing task failed: {e}")))??;
        Ok(hashed)
    }

    async fn verify(&self, password: ClearTextPassword, stored: String) -> AuthResult<bool> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.verify(password.as_str(), &stored))
            .await
            .map_err(|e| AuthError::Internal(format!("verify task failed: {e}")))
    }
}
