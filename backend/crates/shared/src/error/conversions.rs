//! Error conversions - From implementations for common error types
//!
//! Storage-specific failures are folded into the semantic taxonomy here so
//! that services never branch on driver error codes themselves.

use super::app_error::AppError;
use super::kind::ErrorKind;

// ============================================================================
// serde_json conversions
// ============================================================================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() {
            AppError::bad_request(format!("JSON parse error: {}", err)).with_source(err)
        } else {
            AppError::internal("JSON serialization error").with_source(err)
        }
    }
}

// ============================================================================
// SQLx conversions (feature-gated)
// ============================================================================

/// Map a PostgreSQL SQLSTATE to a semantic kind
///
/// https://www.postgresql.org/docs/current/errcodes-appendix.html
pub fn classify_sqlstate(code: &str) -> ErrorKind {
    match code {
        // Class 23 - Integrity Constraint Violation
        "23505" => ErrorKind::AlreadyExists,
        "23502" | "23503" | "23514" | "23000" | "23001" => ErrorKind::InvalidData,
        // Class 22 - Data Exception
        c if c.starts_with("22") => ErrorKind::InvalidData,
        // Class 40 - Transaction Rollback
        "40001" | "40P01" => ErrorKind::Conflict,
        _ => ErrorKind::Internal,
    }
}

#[cfg(feature = "sqlx")]
pub fn classify_sqlx(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::RowNotFound => ErrorKind::NotFound,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|code| classify_sqlstate(code.as_ref()))
            .unwrap_or(ErrorKind::Internal),
        _ => ErrorKind::Internal,
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let message = match classify_sqlx(&err) {
            ErrorKind::NotFound => "Record not found",
            ErrorKind::AlreadyExists => "Duplicate key value",
            ErrorKind::InvalidData => "Data constraint violation",
            ErrorKind::Conflict => "Concurrent modification, please retry",
            _ => "Database error",
        };
        AppError::new(classify_sqlx(&err), message).with_source(err)
    }
}

// ============================================================================
// Axum conversions (feature-gated)
// ============================================================================

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;
        use axum::http::StatusCode;

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // RFC 7807 Problem Details for HTTP APIs
        let body = serde_json::json!({
            "type": format!("https://httpstatuses.io/{}", self.status_code()),
            "title": self.kind().as_str(),
            "status": self.status_code(),
            "detail": self.message(),
            "action": self.action(),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_integrity_violations() {
        assert_eq!(classify_sqlstate("23505"), ErrorKind::AlreadyExists);
        assert_eq!(classify_sqlstate("23503"), ErrorKind::InvalidData);
        assert_eq!(classify_sqlstate("23514"), ErrorKind::InvalidData);
        assert_eq!(classify_sqlstate("23502"), ErrorKind::InvalidData);
    }

    #[test]
    fn test_classify_serialization_failure() {
        assert_eq!(classify_sqlstate("40001"), ErrorKind::Conflict);
        assert_eq!(classify_sqlstate("40P01"), ErrorKind::Conflict);
    }

    #[test]
    fn test_classify_data_exception_and_fallback() {
        assert_eq!(classify_sqlstate("22001"), ErrorKind::InvalidData);
        assert_eq!(classify_sqlstate("57P01"), ErrorKind::Internal);
        assert_eq!(classify_sqlstate("42501"), ErrorKind::Internal);
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let app_err: AppError = json_err.into();
        assert_eq!(app_err.kind(), ErrorKind::BadRequest);
    }
}
