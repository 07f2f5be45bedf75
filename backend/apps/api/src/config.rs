//! Process Configuration
//!
//! Read once at startup from the environment (after `.env` is loaded) and
//! split into the typed configs the library crates take.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use auth::AuthConfig;
use auth::application::config::MIN_JWT_SECRET_LEN;
use mailer::{MailerConfig, SmtpConfig};
use platform::broker::EventBusConfig;
use secrecy::{ExposeSecret, SecretString};

const DAY: u64 = 24 * 3600;

/// Transport behind the event bus
///
/// Only the in-process broker exists today. It loses unconsumed events on
/// restart and does not reach other processes, so it is for development and
/// single-instance deployments only. `EVENT_BUS_BACKEND=memory` must be set
/// to opt into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventBusBackend {
    Memory,
}

impl FromStr for EventBusBackend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            other => bail!("unsupported event bus backend '{other}', expected 'memory'"),
        }
    }
}

#[derive(Debug)]
pub struct AppConfig {
    pub database_url: SecretString,
    pub database_max_connections: u32,
    pub redis_url: SecretString,
    pub bind_addr: SocketAddr,
    pub frontend_origins: Vec<String>,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    pub auth: AuthConfig,
    pub event_bus: EventBusBackend,
    pub bus: EventBusConfig,
    pub mailer: MailerConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes");
        }

        let mut auth = AuthConfig::new(SecretString::new(jwt_secret));
        if let Some(audience) = optional("JWT_AUDIENCE") {
            auth.jwt_audience = audience;
        }
        if let Some(issuer) = optional("JWT_ISSUER") {
            auth.jwt_issuer = issuer;
        }
        auth.access_token_ttl = Duration::from_secs(parsed("ACCESS_TOKEN_TTL_SECS", 15 * 60)?);
        auth.refresh_token_ttl = Duration::from_secs(parsed("REFRESH_TOKEN_TTL_SECS", 30 * DAY)?);
        auth.retention = days("AUDIT_RETENTION_DAYS", parsed("AUDIT_RETENTION_DAYS", 30)?)?;
        if let Some(url) = optional("PUBLIC_BASE_URL") {
            auth.public_base_url = url;
        }
        if let Some(version) = optional("API_VERSION") {
            auth.api_version = version;
        }

        let event_bus = required("EVENT_BUS_BACKEND")?.parse()?;
        let bus = EventBusConfig {
            exchange: optional("BROKER_EXCHANGE").unwrap_or_else(|| "social.events".to_string()),
            pool_size: parsed("BROKER_CHANNEL_POOL_SIZE", 4)?,
        };

        let smtp = match optional("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parsed("SMTP_PORT", mailer::config::DEFAULT_SMTP_PORT)?,
                from: optional("SMTP_FROM")
                    .unwrap_or_else(|| "Social <noreply@localhost>".to_string()),
                user: optional("SMTP_USER"),
                password: optional("SMTP_PASSWORD").map(SecretString::new),
            }),
            None => None,
        };
        let mailer = MailerConfig {
            exchange: bus.exchange.clone(),
            max_retry: parsed("EMAIL_MAX_RETRY", 3)?,
            smtp,
            ..MailerConfig::default()
        };

        Ok(Self {
            database_url: SecretString::new(required("DATABASE_URL")?),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 5)?,
            redis_url: SecretString::new(required("REDIS_URL")?),
            bind_addr: parsed("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            frontend_origins: optional("FRONTEND_ORIGINS")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            request_timeout: Duration::from_secs(parsed("REQUEST_TIMEOUT_SECS", 30)?),
            shutdown_grace: Duration::from_secs(parsed("SHUTDOWN_GRACE_SECS", 10)?),
            auth,
            event_bus,
            bus,
            mailer,
        })
    }

    pub fn database_url(&self) -> &str {
        self.database_url.expose_secret()
    }

    pub fn redis_url(&self) -> &str {
        self.redis_url.expose_secret()
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn required(name: &str) -> anyhow::Result<String> {
    optional(name).with_context(|| format!("{name} must be set in environment"))
}

fn parsed<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn days(name: &str, count: u64) -> anyhow::Result<Duration> {
    count
        .checked_mul(DAY)
        .map(Duration::from_secs)
        .with_context(|| format!("{name} is too large: {count} days"))
}
