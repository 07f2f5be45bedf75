//! Auth Router

use axum::{
    Router,
    routing::{get, post},
};
use platform::broker::EventPublisher;
use platform::cache::TokenStore;

use crate::domain::repository::{RefreshTokenRepository, UserRepository};
use crate::presentation::handlers::{self, AuthAppState};

/// Auth routes plus liveness, nested under `/api/{version}`
pub fn auth_router<R, K, P>(state: AuthAppState<R, K, P>) -> Router
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    let prefix = state.api_prefix.clone();

    let auth = Router::new()
        .route("/register", post(handlers::register::<R, K, P>))
        .route("/login", post(handlers::login::<R, K, P>))
        .route("/refresh", post(handlers::refresh::<R, K, P>))
        .route("/logout", post(handlers::logout::<R, K, P>))
        .route("/forgot-password", post(handlers::forgot_password::<R, K, P>))
        .route(
            "/reset-password",
            get(handlers::reset_password_page::<R, K, P>)
                .post(handlers::reset_password::<R, K, P>),
        )
        .route("/verify-email", get(handlers::verify_email::<R, K, P>))
        .route(
            "/resend-verification",
            post(handlers::resend_verification::<R, K, P>),
        );

    let api = Router::new()
        .nest("/auth", auth)
        .route("/health", get(handlers::health))
        .with_state(state);

    Router::new().nest(&prefix, api)
}
