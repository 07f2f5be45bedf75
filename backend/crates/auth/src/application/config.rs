//! Application Configuration
//!
//! Configuration for the Auth application layer. Built by the binary from
//! the environment and injected; nothing in this crate reads env vars.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

/// Minimum HS256 secret length in bytes
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 signing secret
    pub jwt_secret: SecretString,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    /// Access token lifetime (15 minutes)
    pub access_token_ttl: Duration,
    /// Refresh token lifetime (30 days)
    pub refresh_token_ttl: Duration,
    /// How long revoked or expired refresh rows are kept (30 days)
    pub retention: Duration,
    /// Sweep interval of the retention worker (1 hour)
    pub cleanup_interval: Duration,
    /// Verify-email capability lifetime (30 minutes)
    pub verify_token_ttl: Duration,
    /// Reset-password capability lifetime (15 minutes)
    pub reset_token_ttl: Duration,
    /// Upper bound for one event publish (pool wait + confirm)
    pub publish_timeout: Duration,
    /// Base of the links sent by mail, e.g. `https://social.example.com`
    pub public_base_url: String,
    pub api_version: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_audience", &self.jwt_audience)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("retention", &self.retention)
            .field("public_base_url", &self.public_base_url)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl AuthConfig {
    /// Config with the default lifetimes
    pub fn new(jwt_secret: SecretString) -> Self {
        Self {
            jwt_secret,
            jwt_audience: "social-app".to_string(),
            jwt_issuer: "social-auth".to_string(),
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(30 * 24 * 3600),
            retention: Duration::from_secs(30 * 24 * 3600),
            cleanup_interval: Duration::from_secs(3600),
            verify_token_ttl: Duration::from_secs(30 * 60),
            reset_token_ttl: Duration::from_secs(15 * 60),
            publish_timeout: Duration::from_secs(5),
            public_base_url: "http://localhost:8080".to_string(),
            api_version: "v1".to_string(),
        }
    }

    pub fn secret_bytes(&self) -> &[u8] {
        self.jwt_secret.expose_secret().as_bytes()
    }

    /// `/api/{version}`
    pub fn api_prefix(&self) -> String {
        format!("/api/{}", self.api_version)
    }

    pub fn verify_link(&self, token: &str) -> String {
        self.link("verify-email", token)
    }

    pub fn reset_link(&self, token: &str) -> String {
        self.link("reset-password", token)
    }

    fn link(&self, route: &str, token: &str) -> String {
        format!(
            "{}{}/auth/{}?token={}",
            self.public_base_url.trim_end_matches('/'),
            self.api_prefix(),
            route,
            token
        )
    }
}

/// Human readable lifetime for mail bodies: "30 minutes", "1 hour"
pub fn humanize(ttl: Duration) -> String {
    let secs = ttl.as_secs();
    let (value, unit) = if secs >= 3600 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if value == 1 {
        format!("1 {unit}")
    } else {
        format!("{value} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        let mut config = AuthConfig::new(SecretString::new("x".repeat(32)));
        config.public_base_url = "https://social.example.com/".to_string();
        config
    }

    #[test]
    fn test_links() {
        let config = config();
        assert_eq!(
            config.verify_link("t"),
            "https://social.example.com/api/v1/auth/verify-email?token=t"
        );
        assert_eq!(
            config.reset_link("t"),
            "https://social.example.com/api/v1/auth/reset-password?token=t"
        );
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(Duration::from_secs(30 * 60)), "30 minutes");
        assert_eq!(humanize(Duration::from_secs(15 * 60)), "15 minutes");
        assert_eq!(humanize(Duration::from_secs(3600)), "1 hour");
        assert_eq!(humanize(Duration::from_secs(90)), "90 seconds");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = AuthConfig::new(SecretString::new("super-secret-value-0123456789abcdef".into()));
        assert!(!format!("{:?}", config).contains("super-secret"));
    }
}
