//! Mailer
//!
//! Consumes `email.*` events from the bus and sends the corresponding mail
//! exactly once per event id:
//! - `dispatcher` - queue consumer with idempotency gate and retry policy
//! - `template` - askama bodies for each event type
//! - `sender` - SMTP (lettre) and log-only senders

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod sender;
pub mod template;


pub use config::{MailerConfig, SmtpConfig};
pub use dispatcher::{Disposition, EmailDispatcher, EmailKind};
pub use error::MailerError;
pub use sender::{EmailMessage, EmailSender, LogSender, SmtpSender};
