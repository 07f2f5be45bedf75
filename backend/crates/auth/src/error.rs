//! Auth Error Types
//!
//! Auth-specific error variants that integrate with the unified
//! `kernel::error::AppError` system. Collaborator failures are folded into
//! the semantic `ErrorKind` here; handlers never look at driver codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use platform::broker::PublishError;
use platform::cache::CacheError;
use platform::password::{PasswordHashError, PasswordPolicyError};
use thiserror::Error;

use crate::application::token_codec::TokenError;
use crate::domain::value_object::{email::EmailError, user_name::UsernameError};

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Register with an email that already has an account
    #[error("Email already registered")]
    EmailTaken,

    /// Unique constraint hit on insert; names the field
    #[error("{0} already exists")]
    Duplicate(&'static str),

    #[error("User not found")]
    UserNotFound,

    /// Unknown email or wrong password; never says which
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing or malformed bearer header
    #[error("Missing or invalid authorization header")]
    MissingBearer,

    /// Refresh token unknown, expired, or already rotated
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Session not found")]
    SessionNotFound,

    #[error(transparent)]
    Token(#[from] TokenError),

    /// Verify-email token unknown or already redeemed
    #[error("Invalid or expired verification token")]
    InvalidVerificationToken,

    /// Reset-password token unknown or already redeemed
    #[error("Invalid or expired reset token")]
    ResetTokenNotFound,

    #[error("{0}")]
    Validation(String),

    #[error("Password validation failed: {0}")]
    PasswordPolicy(#[from] PasswordPolicyError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Event publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Password hashing failed: {0}")]
    Hashing(#[from] PasswordHashError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::EmailTaken | AuthError::Duplicate(_) => ErrorKind::AlreadyExists,
            AuthError::UserNotFound
            | AuthError::SessionNotFound
            | AuthError::ResetTokenNotFound => ErrorKind::NotFound,
            AuthError::InvalidCredentials => ErrorKind::InvalidCredentials,
            AuthError::MissingBearer | AuthError::InvalidRefreshToken => ErrorKind::Unauthorized,
            AuthError::Token(TokenError::Expired) => ErrorKind::TokenExpired,
            AuthError::Token(TokenError::Signing(_)) => ErrorKind::Internal,
            AuthError::Token(_) => ErrorKind::Unauthorized,
            AuthError::InvalidVerificationToken
            | AuthError::Validation(_)
            | AuthError::PasswordPolicy(_) => ErrorKind::BadRequest,
            AuthError::Database(e) => kernel::error::conversions::classify_sqlx(e),
            AuthError::Cache(CacheError::NotFound) => ErrorKind::NotFound,
            AuthError::Cache(_)
            | AuthError::Publish(_)
            | AuthError::Hashing(_)
            | AuthError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Convert to AppError
    ///
    /// Server-side failures get a generic message so driver details stay
    /// in the logs.
    pub fn to_app_error(&self) -> AppError {
        let kind = self.kind();
        if kind.is_server_error() {
            return AppError::new(kind, "Internal server error");
        }

        let err = AppError::new(kind, self.to_string());
        match self {
            AuthError::Token(TokenError::Expired) => err.with_action("Refresh the access token"),
            AuthError::InvalidRefreshToken => err.with_action("Sign in again"),
            AuthError::InvalidVerificationToken => {
                err.with_action("Request a new verification email")
            }
            AuthError::ResetTokenNotFound => err.with_action("Request a new password reset email"),
            _ => err,
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth database error");
            }
            AuthError::Cache(e) => {
                tracing::error!(error = %e, "Auth cache error");
            }
            AuthError::Publish(e) => {
                tracing::error!(error = %e, "Auth event publish error");
            }
            AuthError::Hashing(e) => {
                tracing::error!(error = %e, "Password hashing error");
            }
            AuthError::Internal(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::InvalidCredentials => {
                tracing::warn!("Invalid login attempt");
            }
            AuthError::InvalidRefreshToken => {
                tracing::warn!("Rejected refresh token");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        match err.kind() {
            ErrorKind::BadRequest | ErrorKind::InvalidData => {
                AuthError::Validation(err.message().to_string())
            }
            _ => AuthError::Internal(err.to_string()),
        }
    }
}

impl From<EmailError> for AuthError {
    fn from(err: EmailError) -> Self {
        AuthError::Validation(err.to_string())
    }
}

impl From<UsernameError> for AuthError {
    fn from(err: UsernameError) -> Self {
        AuthError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(AuthError::EmailTaken.kind(), ErrorKind::AlreadyExists);
        assert_eq!(
            AuthError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidRefreshToken.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidVerificationToken.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::ResetTokenNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AuthError::Token(TokenError::Expired).kind(),
            ErrorKind::TokenExpired
        );
        assert_eq!(
            AuthError::Publish(PublishError::Cancelled).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AuthError::Database(sqlx::Error::RowNotFound).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AuthError::Internal("connection refused at 10.0.0.3".to_string());
        assert_eq!(err.to_app_error().message(), "Internal server error");

        let err = AuthError::Validation("Invalid email format".to_string());
        assert_eq!(err.to_app_error().message(), "Invalid email format");
    }

    #[test]
    fn test_actions_point_to_recovery() {
        assert_eq!(
            AuthError::InvalidRefreshToken.to_app_error().action(),
            Some("Sign in again")
        );
        assert!(AuthError::InvalidCredentials.to_app_error().action().is_none());
    }

    #[test]
    fn test_app_error_conversion_keeps_validation() {
        let err: AuthError = AppError::bad_request("Device id cannot be empty").into();
        assert!(matches!(err, AuthError::Validation(_)));
    }
}
