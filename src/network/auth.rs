//! Handshake Authentication
//!
//! Players connect with `?token=<jwt>` on the WebSocket URL. Tokens are
//! issued by the account service; this server only verifies them and turns
//! the account subject into a `PlayerId`.

use std::collections::HashSet;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::services::PlayerId;

/// Token verification settings.
///
/// One key source is used: the RS256 public key when present, otherwise
/// the HS256 secret.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Required `iss`, if any.
    pub issuer: Option<String>,
    /// Required `aud`, if any.
    pub audience: Option<String>,
    /// RS256 public key (PEM).
    pub public_key_pem: Option<String>,
    /// HS256 shared secret.
    pub secret: Option<String>,
    /// Accept expired tokens. Local development only.
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Read `AUTH_*` environment variables.
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            issuer: var("AUTH_ISSUER"),
            audience: var("AUTH_AUDIENCE"),
            public_key_pem: var("AUTH_PUBLIC_KEY_PEM"),
            secret: var("AUTH_SECRET"),
            skip_expiry: matches!(var("AUTH_SKIP_EXPIRY").as_deref(), Some("1" | "true")),
        }
    }

    /// A key source is set.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }

    fn decoding_key(&self) -> Result<(DecodingKey, Algorithm), AuthError> {
        if let Some(pem) = &self.public_key_pem {
            let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|e| AuthError::DecodeError(format!("bad public key: {}", e)))?;
            return Ok((key, Algorithm::RS256));
        }
        match &self.secret {
            Some(secret) => Ok((DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)),
            None => Err(AuthError::NotConfigured),
        }
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = !self.skip_expiry;

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }
}

/// Claims read from account tokens.
///
/// Account services put the account id either in `sub` or in `user_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Account subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Account id, used when `sub` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<serde_json::Value>,
    /// Expiry (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at (Unix seconds).
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience, a string or a list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,
}

impl TokenClaims {
    /// Account subject: `sub`, else `user_id` as text.
    pub fn subject(&self) -> Option<String> {
        if let Some(sub) = self.sub.as_ref().filter(|s| !s.is_empty()) {
            return Some(sub.clone());
        }
        match &self.user_id {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Player id for the subject.
    pub fn player_id(&self) -> Option<PlayerId> {
        self.subject().map(|s| PlayerId::from_subject(&s))
    }
}

/// Why a token was refused.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Server has no key to verify with.
    #[error("authentication not configured")]
    NotConfigured,
    /// Request carried no token.
    #[error("missing token")]
    MissingToken,
    /// Not a JWT.
    #[error("invalid token format")]
    InvalidFormat,
    /// Signature does not verify.
    #[error("invalid signature")]
    InvalidSignature,
    /// Past `exp`.
    #[error("token expired")]
    Expired,
    /// Wrong `iss`.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Wrong `aud`.
    #[error("invalid audience")]
    InvalidAudience,
    /// A claim we need is absent.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// Anything else the decoder reported.
    #[error("decode error: {0}")]
    DecodeError(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) => AuthError::InvalidFormat,
            _ => AuthError::DecodeError(err.to_string()),
        }
    }
}

/// Pull a non-empty parameter out of a request query string.
///
/// Values are returned verbatim, without percent-decoding. Tokens are
/// base64url and never need escaping; a dev `player` name is only hashed
/// into an id, so an escaped name maps to a stable id of its own.
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Pull the `token` parameter out of a request query string.
pub fn token_from_query(query: Option<&str>) -> Option<String> {
    query_param(query, "token")
}

/// Verify a token and resolve the player it belongs to.
pub fn authenticate(token: &str, config: &AuthConfig) -> Result<(PlayerId, TokenClaims), AuthError> {
    let claims = validate_token(token, config)?;
    let player_id = claims
        .player_id()
        .ok_or_else(|| AuthError::MissingClaim("sub".into()))?;
    Ok((player_id, claims))
}

/// Check signature, expiry, issuer and audience, then return the claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    let (key, algorithm) = config.decoding_key()?;
    let claims = decode::<TokenClaims>(token, &key, &config.validation(algorithm))?.claims;

    if claims.subject().is_none() {
        return Err(AuthError::MissingClaim("sub".into()));
    }
    Ok(claims)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "angler-test-secret";

    fn now() -> u64 {
        chrono::Utc::now().timestamp() as u64
    }

    fn sign(claims: &TokenClaims, secret: &str) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn claims_for(subject: &str) -> TokenClaims {
        TokenClaims {
            sub: Some(subject.into()),
            exp: now() + 3600,
            iat: now(),
            iss: Some("accounts".into()),
            ..Default::default()
        }
    }

    fn hs256() -> AuthConfig {
        AuthConfig { secret: Some(SECRET.into()), ..Default::default() }
    }

    #[test]
    fn test_subject_becomes_player_id() {
        let token = sign(&claims_for("angler-42"), SECRET);

        let (player, claims) = authenticate(&token, &hs256()).unwrap();
        assert_eq!(claims.subject().as_deref(), Some("angler-42"));
        assert_eq!(player, PlayerId::from_subject("angler-42"));
    }

    #[test]
    fn test_numeric_user_id_fallback() {
        let claims = TokenClaims {
            sub: None,
            user_id: Some(serde_json::json!(17)),
            ..claims_for("")
        };
        let token = sign(&claims, SECRET);

        let (player, _) = authenticate(&token, &hs256()).unwrap();
        assert_eq!(player, PlayerId::from_subject("17"));
    }

    #[test]
    fn test_expired_token() {
        let token = sign(&TokenClaims { exp: 1, ..claims_for("late") }, SECRET);

        assert!(matches!(validate_token(&token, &hs256()), Err(AuthError::Expired)));

        let lenient = AuthConfig { skip_expiry: true, ..hs256() };
        assert!(validate_token(&token, &lenient).is_ok());
    }

    #[test]
    fn test_wrong_secret() {
        let token = sign(&claims_for("angler-42"), "not-the-server-secret");
        assert!(matches!(validate_token(&token, &hs256()), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_empty_subject() {
        let token = sign(&claims_for(""), SECRET);
        assert!(matches!(validate_token(&token, &hs256()), Err(AuthError::MissingClaim(_))));
    }

    #[test]
    fn test_issuer_and_audience() {
        let token = sign(&claims_for("angler-42"), SECRET);

        let other_issuer = AuthConfig { issuer: Some("elsewhere".into()), ..hs256() };
        assert!(matches!(validate_token(&token, &other_issuer), Err(AuthError::InvalidIssuer)));

        let same_issuer = AuthConfig { issuer: Some("accounts".into()), ..hs256() };
        assert!(validate_token(&token, &same_issuer).is_ok());

        let needs_audience = AuthConfig { audience: Some("angler".into()), ..hs256() };
        assert!(validate_token(&token, &needs_audience).is_err());
    }

    #[test]
    fn test_garbage_and_unconfigured() {
        assert!(matches!(validate_token("not-a-jwt", &hs256()), Err(AuthError::InvalidFormat)));
        assert!(matches!(
            validate_token("some.jwt.token", &AuthConfig::default()),
            Err(AuthError::NotConfigured)
        ));
    }

    #[test]
    fn test_query_params() {
        assert_eq!(token_from_query(Some("token=abc.def")), Some("abc.def".to_string()));
        assert_eq!(token_from_query(Some("player=x&token=t0k")), Some("t0k".to_string()));
        assert_eq!(token_from_query(Some("token=")), None);
        assert_eq!(token_from_query(None), None);
        assert_eq!(query_param(Some("player=dev"), "player"), Some("dev".to_string()));
    }

    #[test]
    fn test_query_values_are_raw() {
        assert_eq!(query_param(Some("player=J%C3%B6rg"), "player"), Some("J%C3%B6rg".to_string()));
        assert_eq!(query_param(Some("token=a.b-c_d"), "token"), Some("a.b-c_d".to_string()));
    }
}
