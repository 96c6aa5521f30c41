//! Client-visible authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use super::token::TokenError;
use crate::http::response::error_response;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Identifiants invalides")]
    InvalidCredentials,

    #[error("Erreur de connexion")]
    LoginFailed,

    #[error("Ce nom d'utilisateur existe déjà")]
    UsernameTaken,

    #[error("Erreur lors de la création du compte")]
    RegistrationFailed,

    #[error("Token de rafraîchissement invalide")]
    InvalidRefreshToken,

    #[error("Token expiré")]
    RefreshTokenExpired,

    #[error("Erreur de rafraîchissement")]
    RefreshFailed,

    #[error("Authentification requise")]
    MissingCredentials,

    #[error("Token invalide ou expiré")]
    InvalidAccessToken,
}

impl AuthError {
    pub fn status(self) -> StatusCode {
        match self {
            AuthError::MissingCredentials | AuthError::InvalidAccessToken => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Map a refresh-token validation failure.
    pub fn from_refresh(error: TokenError) -> Self {
        match error {
            TokenError::Expired => AuthError::RefreshTokenExpired,
            TokenError::Encoding(_) => AuthError::RefreshFailed,
            TokenError::Malformed
            | TokenError::SignatureInvalid
            | TokenError::IdentityMismatch
            | TokenError::WrongKind { .. } => AuthError::InvalidRefreshToken,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        error_response(self.status(), self.to_string())
    }
}
