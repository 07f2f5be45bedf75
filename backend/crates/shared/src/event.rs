//! Bus Events
//!
//! The envelope every message on the event bus is wrapped in, and the
//! payload contract shared by the auth producer and the mailer consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Routing key / event type for email verification mails
pub const EMAIL_VERIFY: &str = "email.verify";

/// Routing key / event type for password reset mails
pub const EMAIL_RESET_PASSWORD: &str = "email.reset.password";

/// Envelope published on the bus
///
/// `event_id` is the idempotency key consumers deduplicate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: T,
}

impl<T> EventEnvelope<T> {
    /// Wrap `data` with a fresh event id and the current UTC time
    pub fn new(event_type: impl Into<String>, data: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Payload of `email.verify` and `email.reset.password` events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailEventData {
    pub email: String,
    pub name: String,
    pub link: String,
    /// Human readable validity window, e.g. "30 minutes"
    pub expiry: String,
}
