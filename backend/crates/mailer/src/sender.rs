//! Email Senders
//!
//! [`SmtpSender`] wraps the lettre async SMTP transport (STARTTLS relay,
//! optional credentials, multipart plain + HTML). [`LogSender`] only logs
//! and is used when SMTP is not configured.

use lettre::message::{Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;

use crate::config::SmtpConfig;
use crate::error::MailerError;

/// A rendered mail ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[trait_variant::make(EmailSender: Send)]
pub trait LocalEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailerError>;
}

// ============================================================================
// SMTP
// ============================================================================

pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpSender {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailerError> {
        let from = config.from.parse::<Mailbox>()?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port);
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            builder = builder.credentials(Credentials::new(
                user.clone(),
                password.expose_secret().clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

impl EmailSender for SmtpSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailerError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(message.to.parse::<Mailbox>()?)
            .subject(message.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html.clone()),
                    ),
            )
            .map_err(|e| MailerError::Build(e.to_string()))?;

        self.transport.send(email).await?;
        Ok(())
    }
}

// ============================================================================
// Log only
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct LogSender;

impl EmailSender for LogSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailerError> {
        // the body carries a live capability link; keep it out of the logs
        tracing::info!(subject = %message.subject, "SMTP not configured, email not sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_sender_rejects_bad_from() {
        let config = SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            from: "not a mailbox".to_string(),
            user: None,
            password: None,
        };
        assert!(matches!(SmtpSender::new(&config), Err(MailerError::Address(_))));
    }

    #[tokio::test]
    async fn test_log_sender_accepts_everything() {
        let message = EmailMessage {
            to: "a@x.io".to_string(),
            subject: "s".to_string(),
            text: "t".to_string(),
            html: "h".to_string(),
        };
        assert!(EmailSender::send(&LogSender, &message).await.is_ok());
    }
}
