//! Presentation Layer
//!
//! HTTP handlers, DTOs, router, and the bearer extractor.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod router;

pub use handlers::AuthAppState;
pub use middleware::{BearerClaims, bearer_token};
pub use router::auth_router;
