//! Broker errors

use thiserror::Error;

/// Transport-level failures
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker connection unavailable")]
    Unavailable,

    #[error("Broker channel closed")]
    ChannelClosed,

    #[error("Broker topology error: {0}")]
    Topology(String),
}

/// Failures of `EventPublisher::publish`
#[derive(Debug, Error)]
pub enum PublishError {
    /// Cancelled before a confirm arrived (or before a channel was acquired)
    #[error("Publish cancelled")]
    Cancelled,

    /// Broker negatively acknowledged the message
    #[error("Publish rejected by broker")]
    PublishRejected,

    /// Mandatory message could not be routed to any queue
    #[error("No route for message (reply {reply_code}: {reply_text})")]
    NoRoute { reply_code: u16, reply_text: String },

    #[error("Publish channel closed before confirm")]
    ChannelClosed,

    /// Producer was closed
    #[error("Event bus closed")]
    Closed,

    #[error("Event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Broker(BrokerError),
}

impl From<BrokerError> for PublishError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::ChannelClosed => PublishError::ChannelClosed,
            other => PublishError::Broker(other),
        }
    }
}
