//! Auth (Authentication) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, repository traits
//! - `application/` - Token codec, session and account services
//! - `infra/` - PostgreSQL and in-memory repositories
//! - `presentation/` - HTTP handlers, DTOs, router
//!
//! ## Features
//! - Register / login with email + password
//! - Rotating refresh tokens bound to a device, HS256 access tokens
//! - Email verification and password reset through the event bus
//! - Retention sweeper for revoked and expired refresh rows
//!
//! ## Security Model
//! - Passwords hashed with SHA-256 pre-hash + bcrypt
//! - Refresh tokens stored as SHA-256 only; single-use, replay revokes
//!   every session of the user
//! - Verify / reset capabilities are short-lived and deleted on redemption

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;


// Re-exports for convenience
pub use application::{
    AuthConfig, AuthService, EmailFlow, RefreshTokenSweeper, SessionService, TokenCodec,
};
pub use error::{AuthError, AuthResult};
pub use infra::{MemoryAuthRepository, PgAuthRepository};
pub use presentation::{AuthAppState, auth_router};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};
