//! HTTP Handlers

use std::sync::Arc;

use askama::Template;
use axum::Json;
use axum::extract::{FromRef, Query, State};
use axum::response::Html;
use platform::broker::EventPublisher;
use platform::cache::TokenStore;

use crate::application::{AuthService, LoginInput, RegisterInput, TokenCodec, TokenInfo};
use crate::domain::repository::{RefreshTokenRepository, UserRepository};
use crate::domain::value_object::device_id::DeviceId;
use crate::error::{AuthError, AuthResult};
use crate::presentation::dto::{
    EmailRequest, HealthResponse, LoginRequest, LoginResponse, LogoutRequest, MessageResponse,
    RefreshRequest, RegisterRequest, ResetPasswordRequest, TokenQuery, UserResponse,
};
use crate::presentation::middleware::BearerClaims;

/// Shared state for auth handlers
pub struct AuthAppState<R, K, P>
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    pub service: Arc<AuthService<R, K, P>>,
    pub codec: Arc<TokenCodec>,
    /// `/api/{version}`, used for links rendered into pages
    pub api_prefix: String,
}

impl<R, K, P> Clone for AuthAppState<R, K, P>
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            codec: self.codec.clone(),
            api_prefix: self.api_prefix.clone(),
        }
    }
}

impl<R, K, P> FromRef<AuthAppState<R, K, P>> for Arc<TokenCodec>
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    fn from_ref(state: &AuthAppState<R, K, P>) -> Self {
        state.codec.clone()
    }
}

// ============================================================================
// Register / Login
// ============================================================================

/// POST /auth/register
pub async fn register<R, K, P>(
    State(state): State<AuthAppState<R, K, P>>,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<Json<UserResponse>>
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    let user = state
        .service
        .register(RegisterInput {
            email: req.email,
            username: req.username,
            password: req.password,
        })
        .await?;

    Ok(Json(UserResponse::from(&user)))
}

/// POST /auth/login
pub async fn login<R, K, P>(
    State(state): State<AuthAppState<R, K, P>>,
    Json(req): Json<LoginRequest>,
) -> AuthResult<Json<LoginResponse>>
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    let (user, token) = state
        .service
        .login(LoginInput {
            email: req.email,
            password: req.password,
            device_id: req.device_id,
        })
        .await?;

    Ok(Json(LoginResponse {
        user: UserResponse::from(&user),
        token,
    }))
}

// ============================================================================
// Sessions
// ============================================================================

/// POST /auth/refresh
pub async fn refresh<R, K, P>(
    State(state): State<AuthAppState<R, K, P>>,
    Json(req): Json<RefreshRequest>,
) -> AuthResult<Json<TokenInfo>>
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    Ok(Json(state.service.refresh(&req.refresh_token).await?))
}

/// POST /auth/logout (Bearer)
///
/// An empty body logs out the device the access token was issued for.
pub async fn logout<R, K, P>(
    State(state): State<AuthAppState<R, K, P>>,
    BearerClaims(claims): BearerClaims,
    body: Option<Json<LogoutRequest>>,
) -> AuthResult<Json<MessageResponse>>
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let user_id = claims.user_id()?;
    let device_id = match req.device_id {
        Some(raw) => DeviceId::new(raw)?,
        None => claims.device_id(),
    };
    let all_devices = req.all_devices.unwrap_or(false);

    state.service.logout(user_id, &device_id, all_devices).await?;

    Ok(Json(MessageResponse::new(if all_devices {
        "Logged out from all devices"
    } else {
        "Logged out"
    })))
}

// ============================================================================
// Email verification
// ============================================================================

/// GET /auth/verify-email?token=
pub async fn verify_email<R, K, P>(
    State(state): State<AuthAppState<R, K, P>>,
    Query(query): Query<TokenQuery>,
) -> AuthResult<Json<MessageResponse>>
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    if query.token.is_empty() {
        return Err(AuthError::InvalidVerificationToken);
    }
    state.service.verify_email(&query.token).await?;
    Ok(Json(MessageResponse::new("Email verified")))
}

/// POST /auth/resend-verification
pub async fn resend_verification<R, K, P>(
    State(state): State<AuthAppState<R, K, P>>,
    Json(req): Json<EmailRequest>,
) -> AuthResult<Json<MessageResponse>>
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    state.service.resend_verification(&req.email).await?;
    Ok(Json(MessageResponse::new("Verification email sent")))
}

// ============================================================================
// Password reset
// ============================================================================

/// POST /auth/forgot-password
pub async fn forgot_password<R, K, P>(
    State(state): State<AuthAppState<R, K, P>>,
    Json(req): Json<EmailRequest>,
) -> AuthResult<Json<MessageResponse>>
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    state.service.forgot_password(&req.email).await?;
    Ok(Json(MessageResponse::new("Password reset email sent")))
}

/// POST /auth/reset-password
pub async fn reset_password<R, K, P>(
    State(state): State<AuthAppState<R, K, P>>,
    Json(req): Json<ResetPasswordRequest>,
) -> AuthResult<Json<MessageResponse>>
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    state.service.reset_password(&req.token, req.password).await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}

#[derive(Template)]
#[template(path = "reset_password.html")]
struct ResetPasswordPage<'a> {
    valid: bool,
    token: &'a str,
    action: String,
}

/// GET /auth/reset-password?token=
///
/// Landing page of the reset mail; the form posts back to the JSON route.
pub async fn reset_password_page<R, K, P>(
    State(state): State<AuthAppState<R, K, P>>,
    Query(query): Query<TokenQuery>,
) -> AuthResult<Html<String>>
where
    R: UserRepository + RefreshTokenRepository + Send + Sync + 'static,
    K: TokenStore + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    let valid = !query.token.is_empty()
        && state
            .service
            .is_reset_password_token_valid(&query.token)
            .await?;

    let page = ResetPasswordPage {
        valid,
        token: &query.token,
        action: format!("{}/auth/reset-password", state.api_prefix),
    };
    let html = page
        .render()
        .map_err(|e| AuthError::Internal(format!("template render failed: {e}")))?;
    Ok(Html(html))
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
