//! Application Layer
//!
//! Application services: token codec, sessions, the account flows and the
//! retention worker.

pub mod auth_service;
pub mod config;
pub mod email_flow;
pub mod session;
pub mod session_cleanup;
pub mod token_codec;

// Re-exports
pub use auth_service::{AuthService, LoginInput, RegisterInput};
pub use config::AuthConfig;
pub use email_flow::{EmailFlow, EmailPurpose};
pub use session::{SessionService, TokenInfo};
pub use session_cleanup::RefreshTokenSweeper;
pub use token_codec::{AccessClaims, TokenCodec, TokenError};
