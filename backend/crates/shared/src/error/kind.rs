//! Error Kind - Classification of errors
//!
//! Defines the [`ErrorKind`] enum: the semantic error taxonomy shared by every
//! crate. Transport concerns (HTTP status codes) are derived from it, never
//! the other way around.

use serde::Serialize;

/// Semantic error classification
///
/// Services return these kinds regardless of which collaborator failed;
/// the HTTP layer maps each kind to exactly one status code.
///
/// ## Examples
/// ```rust
/// use kernel::error::kind::ErrorKind;
///
/// let kind = ErrorKind::NotFound;
/// assert_eq!(kind.status_code(), 404);
/// assert_eq!(kind.as_str(), "Not Found");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorKind {
    /// The addressed resource does not exist
    NotFound,
    /// A unique resource with the same identity already exists
    AlreadyExists,
    /// The operation conflicts with concurrent modification
    Conflict,
    /// Input violates a data constraint
    InvalidData,
    /// Login credentials did not match
    InvalidCredentials,
    /// Authentication missing or rejected
    Unauthorized,
    /// Authenticated but not permitted
    Forbidden,
    /// A token is past its expiry
    TokenExpired,
    /// A token was revoked
    TokenRevoked,
    /// Malformed or semantically invalid request
    BadRequest,
    /// The session is no longer valid
    SessionExpired,
    /// Collaborator failure
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind
    ///
    /// ## Examples
    /// ```rust
    /// use kernel::error::kind::ErrorKind;
    /// assert_eq!(ErrorKind::BadRequest.status_code(), 400);
    /// assert_eq!(ErrorKind::AlreadyExists.status_code(), 409);
    /// ```
    #[inline]
    pub const fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest | ErrorKind::InvalidData => 400,
            ErrorKind::Unauthorized
            | ErrorKind::InvalidCredentials
            | ErrorKind::TokenExpired
            | ErrorKind::TokenRevoked
            | ErrorKind::SessionExpired => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists | ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }

    /// Human readable title used in problem responses
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "Not Found",
            ErrorKind::AlreadyExists => "Already Exists",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::InvalidData => "Invalid Data",
            ErrorKind::InvalidCredentials => "Invalid Credentials",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::TokenExpired => "Token Expired",
            ErrorKind::TokenRevoked => "Token Revoked",
            ErrorKind::BadRequest => "Bad Request",
            ErrorKind::SessionExpired => "Session Expired",
            ErrorKind::Internal => "Internal Server Error",
        }
    }

    /// 5xx kinds. These are the ones worth an error-level log line.
    #[inline]
    pub const fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// 4xx kinds
    #[inline]
    pub const fn is_client_error(&self) -> bool {
        let code = self.status_code();
        code >= 400 && code < 500
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorKind::NotFound.status_code(), 404);
        assert_eq!(ErrorKind::AlreadyExists.status_code(), 409);
        assert_eq!(ErrorKind::Conflict.status_code(), 409);
        assert_eq!(ErrorKind::InvalidData.status_code(), 400);
        assert_eq!(ErrorKind::InvalidCredentials.status_code(), 401);
        assert_eq!(ErrorKind::Unauthorized.status_code(), 401);
        assert_eq!(ErrorKind::Forbidden.status_code(), 403);
        assert_eq!(ErrorKind::TokenExpired.status_code(), 401);
        assert_eq!(ErrorKind::TokenRevoked.status_code(), 401);
        assert_eq!(ErrorKind::BadRequest.status_code(), 400);
        assert_eq!(ErrorKind::SessionExpired.status_code(), 401);
        assert_eq!(ErrorKind::Internal.status_code(), 500);
    }

    #[test]
    fn test_is_server_error() {
        assert!(!ErrorKind::BadRequest.is_server_error());
        assert!(!ErrorKind::NotFound.is_server_error());
        assert!(ErrorKind::Internal.is_server_error());
    }

    #[test]
    fn test_is_client_error() {
        assert!(ErrorKind::InvalidCredentials.is_client_error());
        assert!(ErrorKind::Conflict.is_client_error());
        assert!(!ErrorKind::Internal.is_client_error());
    }

    #[test]
    fn test_serialize_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorKind::InvalidCredentials).unwrap();
        assert_eq!(json, "\"INVALID_CREDENTIALS\"");
    }
}
