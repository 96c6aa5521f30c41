//! Login, registration and token refresh endpoints.
//!
//! Every failure is a 400 with an `{"error": ...}` body; the variants of
//! [`AuthError`] keep the failure kinds apart.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::directory::DirectoryError;
use super::error::AuthError;
use super::token::{TokenError, TokenKind, TokenService};
use crate::http::server::AppState;
use crate::observability::metrics;

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REGISTER_PATH: &str = "/api/auth/register";
pub const REFRESH_PATH: &str = "/api/auth/refresh";

pub const REGISTRATION_MESSAGE: &str = "Utilisateur créé avec succès";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// A freshly issued token pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub refresh_token: String,
    pub username: String,
    /// Access token lifetime in milliseconds.
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegistrationResponse {
    pub message: String,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}

/// Routes under `/api/auth`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(LOGIN_PATH, post(login))
        .route(REGISTER_PATH, post(register))
        .route(REFRESH_PATH, post(refresh))
}

pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<TokenResponse>, AuthError> {
    let started = Instant::now();
    state.counters.login_attempt();

    let result = authenticate(&state, &credentials).await;
    match &result {
        Ok(_) => {
            state.counters.login_success();
            tracing::info!(username = %credentials.username, "Successful login");
        }
        Err(error) => {
            state.counters.login_failure();
            tracing::warn!(username = %credentials.username, reason = %error, "Failed login attempt");
        }
    }
    metrics::record_auth_duration(started);

    result.map(Json)
}

async fn authenticate(state: &AppState, credentials: &Credentials) -> Result<TokenResponse, AuthError> {
    let verified = state
        .directory
        .verify_credentials(&credentials.username, &credentials.password)
        .await
        .map_err(|e| {
            tracing::error!(username = %credentials.username, error = %e, "Login error");
            AuthError::LoginFailed
        })?;
    if !verified {
        return Err(AuthError::InvalidCredentials);
    }

    issue_pair(state.gatekeeper.tokens(), &credentials.username).map_err(|e| {
        tracing::error!(error = %e, "Token issuance failed");
        AuthError::LoginFailed
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<RegistrationResponse>, AuthError> {
    let username = credentials.username.as_str();

    match state.directory.exists(username).await {
        Ok(true) => return Err(AuthError::UsernameTaken),
        Ok(false) => {}
        Err(e) => {
            tracing::error!(username = %username, error = %e, "Registration error");
            return Err(AuthError::RegistrationFailed);
        }
    }

    match state.directory.create_user(username, &credentials.password).await {
        Ok(()) => {}
        Err(DirectoryError::AlreadyExists(_)) => return Err(AuthError::UsernameTaken),
        Err(e) => {
            tracing::error!(username = %username, error = %e, "Registration error");
            return Err(AuthError::RegistrationFailed);
        }
    }

    state.counters.registration();
    tracing::info!(username = %username, "New user registered");

    let tokens = issue_pair(state.gatekeeper.tokens(), username).map_err(|e| {
        tracing::error!(error = %e, "Token issuance failed");
        AuthError::RegistrationFailed
    })?;

    Ok(Json(RegistrationResponse {
        message: REGISTRATION_MESSAGE.to_string(),
        tokens,
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let Some(token) = request.refresh_token.filter(|t| !t.is_empty()) else {
        return Err(AuthError::InvalidRefreshToken);
    };
    let tokens = state.gatekeeper.tokens();

    let identity = tokens.extract_identity(&token).map_err(|e| {
        tracing::warn!(reason = %e, "Refresh token rejected");
        AuthError::from_refresh(e)
    })?;

    if !tokens.is_refresh_kind(&token) {
        tracing::warn!(username = %identity, "Non-refresh token presented for refresh");
        return Err(AuthError::from_refresh(TokenError::WrongKind {
            expected: TokenKind::Refresh,
        }));
    }

    match state.directory.exists(&identity).await {
        Ok(true) => {}
        Ok(false) => return Err(AuthError::InvalidRefreshToken),
        Err(e) => {
            tracing::error!(error = %e, "Token refresh error");
            return Err(AuthError::RefreshFailed);
        }
    }

    tokens
        .validate(&token, Some(&identity))
        .map_err(AuthError::from_refresh)?;

    issue_pair(tokens, &identity).map(Json).map_err(|e| {
        tracing::error!(error = %e, "Token refresh error");
        AuthError::RefreshFailed
    })
}

fn issue_pair(tokens: &TokenService, username: &str) -> Result<TokenResponse, TokenError> {
    let access = tokens.issue_access_token(username)?;
    let refresh = tokens.issue_refresh_token(username)?;

    Ok(TokenResponse {
        token: access.token,
        refresh_token: refresh.token,
        username: username.to_string(),
        expires_in: tokens.access_ttl().as_millis() as u64,
    })
}
