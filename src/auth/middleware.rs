//! Bearer-token authentication for protected routes.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::error::AuthError;
use super::token::TokenKind;
use crate::http::server::AppState;

/// Identity attached to a request that passed [`require_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
}

/// Require a valid access token whose subject still exists.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match authenticate_bearer(&state, request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(error) => error.into_response(),
    }
}

async fn authenticate_bearer(state: &AppState, headers: &HeaderMap) -> Result<AuthenticatedUser, AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::MissingCredentials)?;

    let claims = state
        .gatekeeper
        .tokens()
        .validate_kind(token, TokenKind::Access)
        .map_err(|e| {
            tracing::warn!(reason = %e, "Bearer token rejected");
            AuthError::InvalidAccessToken
        })?;

    match state.directory.exists(&claims.sub).await {
        Ok(true) => Ok(AuthenticatedUser { username: claims.sub }),
        Ok(false) => {
            tracing::warn!(username = %claims.sub, "Token subject no longer exists");
            Err(AuthError::InvalidAccessToken)
        }
        Err(e) => {
            tracing::error!(error = %e, "User lookup failed during authentication");
            Err(AuthError::InvalidAccessToken)
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
