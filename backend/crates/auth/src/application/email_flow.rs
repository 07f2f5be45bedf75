//! Email Flow
//!
//! Verify-email and reset-password capabilities: a random token is stored in
//! the ephemeral store (token -> email) and announced on the event bus; the
//! mailer turns the event into a mail. Redemption takes the entry out of
//! the store in one step, so a token is applied at most once.

use std::sync::Arc;
use std::time::Duration;

use kernel::event::{EMAIL_RESET_PASSWORD, EMAIL_VERIFY, EmailEventData, EventEnvelope};
use platform::broker::EventPublisher;
use platform::cache::{self, CacheError, EMAIL_RESET_PREFIX, EMAIL_VERIFY_PREFIX, TokenStore};
use platform::crypto::opaque_token;
use tokio_util::sync::CancellationToken;

use crate::application::config::{AuthConfig, humanize};
use crate::domain::entity::user::User;
use crate::domain::value_object::email::Email;
use crate::error::{AuthError, AuthResult};

/// Which capability a token grants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailPurpose {
    Verify,
    ResetPassword,
}

impl EmailPurpose {
    fn prefix(self) -> &'static str {
        match self {
            EmailPurpose::Verify => EMAIL_VERIFY_PREFIX,
            EmailPurpose::ResetPassword => EMAIL_RESET_PREFIX,
        }
    }

    fn event_type(self) -> &'static str {
        match self {
            EmailPurpose::Verify => EMAIL_VERIFY,
            EmailPurpose::ResetPassword => EMAIL_RESET_PASSWORD,
        }
    }

    fn missing(self) -> AuthError {
        match self {
            EmailPurpose::Verify => AuthError::InvalidVerificationToken,
            EmailPurpose::ResetPassword => AuthError::ResetTokenNotFound,
        }
    }
}

pub struct EmailFlow<K, P>
where
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    tokens: Arc<K>,
    publisher: Arc<P>,
    config: Arc<AuthConfig>,
    shutdown: CancellationToken,
}

impl<K, P> EmailFlow<K, P>
where
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    /// `shutdown` is the process token; publishes in flight are cancelled
    /// with it
    pub fn new(
        tokens: Arc<K>,
        publisher: Arc<P>,
        config: Arc<AuthConfig>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            tokens,
            publisher,
            config,
            shutdown,
        }
    }

    /// Mint a capability for `user`, store it and publish the mail event
    pub async fn start(&self, purpose: EmailPurpose, user: &User) -> AuthResult<()> {
        let token = opaque_token();
        let ttl = self.ttl(purpose);
        self.tokens
            .put(
                &cache::key(purpose.prefix(), &token),
                &user.email.as_str(),
                ttl,
            )
            .await?;

        let link = match purpose {
            EmailPurpose::Verify => self.config.verify_link(&token),
            EmailPurpose::ResetPassword => self.config.reset_link(&token),
        };
        let envelope = EventEnvelope::new(
            purpose.event_type(),
            EmailEventData {
                email: user.email.to_string(),
                name: user.username.as_str().to_string(),
                link,
                expiry: humanize(ttl),
            },
        );

        self.publish(purpose.event_type(), &envelope).await?;

        tracing::info!(
            user_id = %user.id,
            event_id = %envelope.event_id,
            event_type = purpose.event_type(),
            "Email event published"
        );
        Ok(())
    }

    /// Take the email a token was issued for, deleting the token
    ///
    /// Unknown, expired or already redeemed tokens map to the purpose's
    /// error.
    pub async fn redeem(&self, purpose: EmailPurpose, token: &str) -> AuthResult<Email> {
        let stored: String = match self.tokens.take(&cache::key(purpose.prefix(), token)).await {
            Ok(email) => email,
            Err(CacheError::NotFound) => return Err(purpose.missing()),
            Err(e) => return Err(e.into()),
        };
        Email::new(&stored)
            .map_err(|e| AuthError::Internal(format!("stored email is invalid: {e}")))
    }

    pub async fn exists(&self, purpose: EmailPurpose, token: &str) -> AuthResult<bool> {
        Ok(self
            .tokens
            .exists(&cache::key(purpose.prefix(), token))
            .await?)
    }

    fn ttl(&self, purpose: EmailPurpose) -> Duration {
        match purpose {
            EmailPurpose::Verify => self.config.verify_token_ttl,
            EmailPurpose::ResetPassword => self.config.reset_token_ttl,
        }
    }

    /// Publish with an upper bound; the timer cancels the publish token so
    /// the bus can give its channel back
    async fn publish(
        &self,
        routing_key: &str,
        envelope: &EventEnvelope<EmailEventData>,
    ) -> AuthResult<()> {
        let cancel = self.shutdown.child_token();
        let timer = {
            let cancel = cancel.clone();
            let timeout = self.config.publish_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                cancel.cancel();
            })
        };

        let result = self.publisher.publish(&cancel, routing_key, envelope).await;
        timer.abort();
        Ok(result?)
    }
}
