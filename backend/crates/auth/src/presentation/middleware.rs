//! Auth Middleware
//!
//! Bearer authentication for protected routes.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::{HeaderMap, header, request::Parts};

use crate::application::token_codec::{AccessClaims, TokenCodec};
use crate::error::AuthError;

/// Verified access-token claims of the caller
///
/// Rejects with `MissingBearer` when there is no `Authorization: Bearer`
/// header and with the codec's error when the token does not validate.
#[derive(Debug, Clone)]
pub struct BearerClaims(pub AccessClaims);

impl<S> FromRequestParts<S> for BearerClaims
where
    Arc<TokenCodec>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AuthError::MissingBearer)?;
        let codec = Arc::<TokenCodec>::from_ref(state);
        Ok(Self(codec.parse(token)?))
    }
}

/// Token of an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
