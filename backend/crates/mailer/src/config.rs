//! Mailer Configuration
//!
//! Built by the binary and injected; nothing here reads the environment.

use std::time::Duration;

use kernel::event::{EMAIL_RESET_PASSWORD, EMAIL_VERIFY};
use platform::broker::{ExchangeSpec, QueueTopology};
use secrecy::SecretString;

use crate::dispatcher::EmailKind;

/// Default SMTP port (STARTTLS)
pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// RFC 5322 "From" mailbox, e.g. `Social <noreply@social.example.com>`
    pub from: String,
    pub user: Option<String>,
    pub password: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Topic exchange the auth service publishes to
    pub exchange: String,
    /// Exchange receiving exhausted messages; `None` drops them instead
    pub dead_letter_exchange: Option<String>,
    pub dead_letter_routing_key: Option<String>,
    /// Requeues before a failing message is dead-lettered
    pub max_retry: i64,
    /// Lifetime of the processed-event marker; must outlast redeliveries
    pub processed_ttl: Duration,
    pub verify_queue: String,
    pub reset_queue: String,
    /// Queue collecting everything routed to the dead-letter exchange
    pub dead_letter_queue: String,
    /// `None` logs mails instead of sending them
    pub smtp: Option<SmtpConfig>,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            exchange: "social.events".to_string(),
            dead_letter_exchange: Some("social.events.dlx".to_string()),
            dead_letter_routing_key: Some("email.dead".to_string()),
            max_retry: 3,
            processed_ttl: Duration::from_secs(7 * 24 * 3600),
            verify_queue: "mailer.email.verify".to_string(),
            reset_queue: "mailer.email.reset".to_string(),
            dead_letter_queue: "mailer.email.dead".to_string(),
            smtp: None,
        }
    }
}

impl MailerConfig {
    /// Queue, binding and dead-letter settings for one email kind
    pub fn topology(&self, kind: EmailKind) -> QueueTopology {
        let (queue, pattern) = match kind {
            EmailKind::Verify => (&self.verify_queue, EMAIL_VERIFY),
            EmailKind::ResetPassword => (&self.reset_queue, EMAIL_RESET_PASSWORD),
        };
        QueueTopology {
            exchange: ExchangeSpec::durable_topic(self.exchange.clone()),
            queue: queue.clone(),
            routing_pattern: pattern.to_string(),
            dead_letter_exchange: self.dead_letter_exchange.clone(),
            dead_letter_routing_key: self.dead_letter_routing_key.clone(),
            prefetch: 1,
        }
    }

    /// Dead-letter exchange with one catch-all queue; `None` without a DLX
    pub fn dead_letter_topology(&self) -> Option<QueueTopology> {
        let exchange = self.dead_letter_exchange.as_ref()?;
        Some(QueueTopology {
            exchange: ExchangeSpec::durable_topic(exchange.clone()),
            queue: self.dead_letter_queue.clone(),
            routing_pattern: "#".to_string(),
            dead_letter_exchange: None,
            dead_letter_routing_key: None,
            prefetch: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_per_kind() {
        let config = MailerConfig::default();

        let verify = config.topology(EmailKind::Verify);
        assert_eq!(verify.queue, "mailer.email.verify");
        assert_eq!(verify.routing_pattern, "email.verify");
        assert_eq!(verify.prefetch, 1);
        assert!(verify.exchange.durable);

        let reset = config.topology(EmailKind::ResetPassword);
        assert_eq!(reset.routing_pattern, "email.reset.password");
        assert_eq!(reset.dead_letter_exchange.as_deref(), Some("social.events.dlx"));
    }

    #[test]
    fn test_dead_letter_topology() {
        let mut config = MailerConfig::default();
        let dlq = config.dead_letter_topology().unwrap();
        assert_eq!(dlq.exchange.name, "social.events.dlx");
        assert_eq!(dlq.routing_pattern, "#");

        config.dead_letter_exchange = None;
        assert!(config.dead_letter_topology().is_none());
    }
}
