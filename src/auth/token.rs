//! Signed session tokens.
//!
//! # Responsibilities
//! - Issue access (short-lived) and refresh (long-lived) tokens
//! - Validate signature, expiry, subject and kind
//!
//! # Design Decisions
//! - HS256 over a JSON claim set; the secret is immutable after construction
//! - The signature is checked before any claim is trusted
//! - Expiry is checked here with zero leeway: valid iff `now < exp`
//! - No revocation list; tokens die at `exp` or on secret rotation

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{crypto, decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;

/// Which of the two token tiers a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// The claim set carried inside every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User identity.
    pub sub: String,
    pub kind: TokenKind,
    /// Issued-at, seconds since the epoch.
    pub iat: u64,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
    pub jti: String,
    pub iss: String,
}

/// An encoded token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Reasons a token is not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token has expired")]
    Expired,

    #[error("token subject does not match the expected identity")]
    IdentityMismatch,

    #[error("expected a {expected} token")]
    WrongKind { expected: TokenKind },

    #[error("failed to encode token: {0}")]
    Encoding(String),
}

/// Issues and validates tokens with a process-wide secret.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
    issuer: String,
}

impl TokenService {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration, issuer: impl Into<String>) -> Self {
        // Expiry is enforced by `check_expiry` so the boundary is exact.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["sub".to_string(), "exp".to_string()]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_ttl,
            refresh_ttl,
            issuer: issuer.into(),
        }
    }

    /// Build from configuration and an already-resolved secret.
    pub fn from_config(config: &AuthConfig, secret: &str) -> Self {
        Self::new(
            secret.as_bytes(),
            config.access_ttl(),
            config.refresh_ttl(),
            config.issuer.clone(),
        )
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue_access_token(&self, identity: &str) -> Result<IssuedToken, TokenError> {
        self.issue_at(identity, TokenKind::Access, unix_now())
    }

    pub fn issue_refresh_token(&self, identity: &str) -> Result<IssuedToken, TokenError> {
        self.issue_at(identity, TokenKind::Refresh, unix_now())
    }

    /// Issue a token as if the clock read `issued_at` (seconds since the epoch).
    pub fn issue_at(&self, identity: &str, kind: TokenKind, issued_at: u64) -> Result<IssuedToken, TokenError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };

        let claims = Claims {
            sub: identity.to_string(),
            kind,
            iat: issued_at,
            exp: issued_at.saturating_add(ttl.as_secs()),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;

        Ok(IssuedToken { token, claims })
    }

    /// Verify signature and expiry, and optionally the subject.
    pub fn validate(&self, token: &str, expected_identity: Option<&str>) -> Result<Claims, TokenError> {
        self.validate_at(token, expected_identity, unix_now())
    }

    /// [`TokenService::validate`] against an explicit clock reading.
    pub fn validate_at(
        &self,
        token: &str,
        expected_identity: Option<&str>,
        now: u64,
    ) -> Result<Claims, TokenError> {
        let claims = self.decode_verified(token)?;
        check_expiry(&claims, now)?;

        if let Some(expected) = expected_identity {
            if claims.sub != expected {
                return Err(TokenError::IdentityMismatch);
            }
        }
        Ok(claims)
    }

    /// Validate and additionally require a particular token kind.
    pub fn validate_kind(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.validate(token, None)?;
        if claims.kind != expected {
            return Err(TokenError::WrongKind { expected });
        }
        Ok(claims)
    }

    /// Read the subject of a genuine, unexpired token.
    pub fn extract_identity(&self, token: &str) -> Result<String, TokenError> {
        self.validate(token, None).map(|claims| claims.sub)
    }

    /// True only for a genuine, unexpired refresh token.
    pub fn is_refresh_kind(&self, token: &str) -> bool {
        matches!(self.validate(token, None), Ok(claims) if claims.kind == TokenKind::Refresh)
    }

    fn decode_verified(&self, token: &str) -> Result<Claims, TokenError> {
        // The MAC covers `header.payload`; check it before parsing either.
        let (message, signature) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
        if !message.contains('.') {
            return Err(TokenError::Malformed);
        }
        match crypto::verify(signature, message.as_bytes(), &self.decoding_key, Algorithm::HS256) {
            Ok(true) => {}
            Ok(false) => return Err(TokenError::SignatureInvalid),
            Err(_) => return Err(TokenError::Malformed),
        }

        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
                _ => TokenError::Malformed,
            })
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

fn check_expiry(claims: &Claims, now: u64) -> Result<(), TokenError> {
    if now >= claims.exp {
        return Err(TokenError::Expired);
    }
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"myVerySecureSecretKeyThatIsAtLeast256BitsLongForHS256Algorithm";
    const DAY: u64 = 24 * 3600;

    fn service() -> TokenService {
        TokenService::new(
            SECRET,
            Duration::from_secs(DAY),
            Duration::from_secs(7 * DAY),
            "gatekeeper",
        )
    }

    #[test]
    fn test_issue_and_validate_access_token() {
        let tokens = service();
        let issued = tokens.issue_access_token("testuser").unwrap();

        assert!(!issued.token.is_empty());
        assert_eq!(issued.claims.kind, TokenKind::Access);
        assert_eq!(issued.claims.exp - issued.claims.iat, DAY);

        let claims = tokens.validate(&issued.token, Some("testuser")).unwrap();
        assert_eq!(claims.sub, "testuser");
        assert_eq!(tokens.extract_identity(&issued.token).unwrap(), "testuser");
        assert!(!tokens.is_refresh_kind(&issued.token));
    }

    #[test]
    fn test_refresh_token_lifetime_and_kind() {
        let tokens = service();
        let issued = tokens.issue_refresh_token("testuser").unwrap();

        assert_eq!(issued.claims.exp - issued.claims.iat, 7 * DAY);
        assert!(tokens.is_refresh_kind(&issued.token));
    }

    #[test]
    fn test_expiry_boundary() {
        let tokens = service();
        let issued_at = 1_700_000_000;
        let issued = tokens.issue_at("alice", TokenKind::Access, issued_at).unwrap();

        for now in [issued_at, issued_at + 1, issued_at + DAY / 2, issued_at + DAY - 1] {
            assert!(tokens.validate_at(&issued.token, None, now).is_ok(), "valid at {}", now);
        }
        for now in [issued_at + DAY, issued_at + DAY + 1, issued_at + 30 * DAY] {
            assert_eq!(
                tokens.validate_at(&issued.token, None, now),
                Err(TokenError::Expired),
                "expired at {}",
                now
            );
        }
    }

    #[test]
    fn test_expired_token_not_valid_even_with_good_signature() {
        let tokens = service();
        let issued = tokens.issue_at("alice", TokenKind::Refresh, 1_000).unwrap();

        assert_eq!(tokens.validate(&issued.token, None), Err(TokenError::Expired));
        assert_eq!(tokens.extract_identity(&issued.token), Err(TokenError::Expired));
        assert!(!tokens.is_refresh_kind(&issued.token));
    }

    #[test]
    fn test_kind_is_enforced_both_ways() {
        let tokens = service();
        let access = tokens.issue_access_token("alice").unwrap();
        let refresh = tokens.issue_refresh_token("alice").unwrap();

        assert_eq!(
            tokens.validate_kind(&access.token, TokenKind::Refresh),
            Err(TokenError::WrongKind { expected: TokenKind::Refresh })
        );
        assert_eq!(
            tokens.validate_kind(&refresh.token, TokenKind::Access),
            Err(TokenError::WrongKind { expected: TokenKind::Access })
        );
        assert!(tokens.validate_kind(&access.token, TokenKind::Access).is_ok());
        assert!(tokens.validate_kind(&refresh.token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn test_identity_mismatch() {
        let tokens = service();
        let issued = tokens.issue_access_token("alice").unwrap();
        assert_eq!(
            tokens.validate(&issued.token, Some("bob")),
            Err(TokenError::IdentityMismatch)
        );
    }

    #[test]
    fn test_tampered_payload_or_signature_is_rejected() {
        let tokens = service();
        let issued = tokens.issue_access_token("alice").unwrap();
        let header_len = issued.token.find('.').unwrap();

        // Flip one byte in every position after the header segment.
        for idx in (header_len + 1)..issued.token.len() {
            let mut bytes = issued.token.clone().into_bytes();
            if bytes[idx] == b'.' {
                continue;
            }
            bytes[idx] = if bytes[idx] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            if tampered == issued.token {
                continue;
            }

            assert_eq!(
                tokens.validate(&tampered, None),
                Err(TokenError::SignatureInvalid),
                "byte {} accepted",
                idx
            );
        }
    }

    #[test]
    fn test_tampered_header_is_signature_invalid() {
        let tokens = service();
        let issued = tokens.issue_access_token("alice").unwrap();
        let header_len = issued.token.find('.').unwrap();

        for idx in 0..header_len {
            let mut bytes = issued.token.clone().into_bytes();
            bytes[idx] = if bytes[idx] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(
                tokens.validate(&tampered, None),
                Err(TokenError::SignatureInvalid),
                "header byte {} accepted",
                idx
            );
        }
    }

    #[test]
    fn test_signed_but_unparseable_claims_are_malformed() {
        let tokens = service();
        let header = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";
        let message = format!("{}.bm90LWpzb24", header);
        let signature = crypto::sign(message.as_bytes(), &EncodingKey::from_secret(SECRET), Algorithm::HS256).unwrap();
        let token = format!("{}.{}", message, signature);

        assert_eq!(tokens.validate(&token, None), Err(TokenError::Malformed));
    }

    #[test]
    fn test_foreign_secret_is_signature_invalid() {
        let tokens = service();
        let other = TokenService::new(
            b"another-secret-that-is-also-long-enough-for-hs256",
            Duration::from_secs(DAY),
            Duration::from_secs(7 * DAY),
            "gatekeeper",
        );
        let issued = other.issue_access_token("alice").unwrap();
        assert_eq!(tokens.validate(&issued.token, None), Err(TokenError::SignatureInvalid));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let tokens = service();
        assert_eq!(tokens.validate("not-a-token", None), Err(TokenError::Malformed));
        assert_eq!(tokens.validate("", None), Err(TokenError::Malformed));
        assert_eq!(tokens.extract_identity("a.b"), Err(TokenError::Malformed));
        assert_eq!(tokens.validate("a.b.c", None), Err(TokenError::SignatureInvalid));
    }
}
