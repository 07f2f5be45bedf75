//! Mailer Error Types

use platform::broker::BrokerError;
use platform::cache::CacheError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailerError {
    /// SMTP transport-level failure (connection, authentication, rejection)
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// Sender or recipient address could not be parsed
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled
    #[error("Email build error: {0}")]
    Build(String),

    #[error("Template render error: {0}")]
    Render(#[from] askama::Error),

    /// Body is not a valid envelope
    #[error("Malformed event: {0}")]
    Decode(#[from] serde_json::Error),

    /// Envelope routed to the wrong dispatcher
    #[error("Unexpected event type '{0}'")]
    UnexpectedEvent(String),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}
