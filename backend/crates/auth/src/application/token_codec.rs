//! Access Token Codec
//!
//! Mints and validates HS256 access tokens. Stateless: nothing is stored.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::config::AuthConfig;
use crate::domain::value_object::{device_id::DeviceId, user_id::UserId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Malformed access token")]
    Malformed,
    #[error("Invalid access token signature")]
    SignatureInvalid,
    #[error("Access token expired")]
    Expired,
    #[error("Access token audience mismatch")]
    AudienceMismatch,
    #[error("Access token issuer mismatch")]
    IssuerMismatch,
    #[error("Access token signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                TokenError::SignatureInvalid
            }
            ErrorKind::InvalidAudience => TokenError::AudienceMismatch,
            ErrorKind::InvalidIssuer => TokenError::IssuerMismatch,
            // also not-yet-valid (nbf) and missing claims
            _ => TokenError::Malformed,
        }
    }
}

/// Access token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id as a decimal string
    pub sub: String,
    /// Device id the session was created for
    pub dev: String,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn user_id(&self) -> Result<UserId, TokenError> {
        self.sub.parse().map_err(|_| TokenError::Malformed)
    }

    pub fn device_id(&self) -> DeviceId {
        DeviceId::from_db(self.dev.clone())
    }
}

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    audience: String,
    issuer: String,
    access_ttl: Duration,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_audience(&[config.jwt_audience.as_str()]);
        validation.set_issuer(&[config.jwt_issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "aud", "iss", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(config.secret_bytes()),
            decoding: DecodingKey::from_secret(config.secret_bytes()),
            validation,
            audience: config.jwt_audience.clone(),
            issuer: config.jwt_issuer.clone(),
            access_ttl: config.access_token_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn sign(&self, user_id: UserId, device_id: &DeviceId) -> Result<String, TokenError> {
        self.sign_at(user_id, device_id, Utc::now())
    }

    /// Sign with an explicit clock; identical inputs give identical tokens
    pub fn sign_at(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let iat = now.timestamp();
        let ttl = i64::try_from(self.access_ttl.as_secs())
            .map_err(|_| TokenError::Signing("access ttl out of range".to_string()))?;
        let claims = AccessClaims {
            sub: user_id.to_string(),
            dev: device_id.as_str().to_string(),
            aud: self.audience.clone(),
            iss: self.issuer.clone(),
            iat,
            nbf: iat,
            exp: iat.saturating_add(ttl),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn parse(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let data = decode::<AccessClaims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }
}
