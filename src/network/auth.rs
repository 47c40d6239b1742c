//! JWT Authentication
//!
//! Validates JWTs from external identity providers. The gateway never
//! issues tokens. A validated subject is mapped to a ledger address, and
//! that address is the caller of every transaction on the connection.

use std::collections::HashSet;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::clock::Timestamp;
use crate::core::ids::Address;

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format.
    pub public_key_pem: Option<String>,
    /// HS256 shared secret.
    pub secret: Option<String>,
    /// Seconds of clock skew tolerated on `exp`.
    pub leeway_secs: u64,
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
            leeway_secs: std::env::var("AUTH_LEEWAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }

    /// Check if a verification key is configured.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

/// JWT claims read from the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject, the provider's user id.
    pub sub: String,
    /// Expiry (unix seconds). Zero means no expiry.
    #[serde(default)]
    pub exp: u64,
    /// Issued at.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,
}

impl TokenClaims {
    /// Ledger address for this subject.
    pub fn address(&self) -> Address {
        Address::derive(&self.sub)
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Provider subject.
    pub subject: String,
    /// Derived ledger address.
    pub address: Address,
    /// Token expiry, if the token has one.
    pub expires_at: Option<Timestamp>,
}

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No verification key configured.
    #[error("authentication not configured")]
    NotConfigured,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer claim mismatch.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience claim mismatch.
    #[error("invalid audience")]
    InvalidAudience,
    /// Required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(&'static str),
    /// Key or token could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Token validator built once from an [`AuthConfig`].
#[derive(Clone)]
pub struct Authenticator {
    key: DecodingKey,
    validation: Validation,
    leeway_secs: u64,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Build a validator. RS256 is used when a public key is configured,
    /// HS256 otherwise.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let (key, algorithm) = match (&config.public_key_pem, &config.secret) {
            (Some(pem), _) => {
                let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(|e| AuthError::Decode(format!("invalid public key: {e}")))?;
                (key, Algorithm::RS256)
            }
            (None, Some(secret)) => (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256),
            (None, None) => return Err(AuthError::NotConfigured),
        };

        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims = HashSet::new();
        // Expiry is checked against the host clock in `authenticate`.
        validation.validate_exp = false;

        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            key,
            validation,
            leeway_secs: config.leeway_secs,
        })
    }

    /// Validate `token` at host time `now`.
    pub fn authenticate(&self, token: &str, now: Timestamp) -> Result<Identity, AuthError> {
        let claims = decode::<TokenClaims>(token, &self.key, &self.validation)
            .map_err(map_jwt_error)?
            .claims;

        if claims.sub.is_empty() {
            return Err(AuthError::MissingClaim("sub"));
        }
        if claims.exp > 0 && now > claims.exp.saturating_add(self.leeway_secs) {
            return Err(AuthError::Expired);
        }

        Ok(Identity {
            address: claims.address(),
            expires_at: (claims.exp > 0).then_some(claims.exp),
            subject: claims.sub,
        })
    }
}

/// Map JWT library errors to our error type.
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::Decode(err.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-key-256-bits-long!!";
    const NOW: Timestamp = 1_700_000_000;

    fn sign(claims: &TokenClaims, secret: &str) -> String {
        let key = EncodingKey::from_secret(secret.as_bytes());
        encode(&Header::new(Algorithm::HS256), claims, &key).unwrap()
    }

    fn claims() -> TokenClaims {
        TokenClaims {
            sub: "player-7".into(),
            exp: NOW + 3_600,
            iat: NOW,
            iss: Some("test-issuer".into()),
            aud: Some(serde_json::json!("rps")),
        }
    }

    fn authenticator(config: AuthConfig) -> Authenticator {
        Authenticator::new(&AuthConfig { secret: Some(SECRET.into()), ..config }).unwrap()
    }

    #[test]
    fn test_valid_token_yields_address() {
        let identity = authenticator(AuthConfig::default())
            .authenticate(&sign(&claims(), SECRET), NOW)
            .unwrap();

        assert_eq!(identity.subject, "player-7");
        assert_eq!(identity.address, Address::derive("player-7"));
        assert_eq!(identity.expires_at, Some(NOW + 3_600));
    }

    #[test]
    fn test_expiry_uses_supplied_time() {
        let auth = authenticator(AuthConfig { leeway_secs: 30, ..Default::default() });
        let token = sign(&claims(), SECRET);

        assert!(auth.authenticate(&token, NOW + 3_630).is_ok());
        assert_eq!(auth.authenticate(&token, NOW + 3_631), Err(AuthError::Expired));
    }

    #[test]
    fn test_token_without_expiry() {
        let token = sign(&TokenClaims { exp: 0, ..claims() }, SECRET);
        let identity = authenticator(AuthConfig::default()).authenticate(&token, u64::MAX).unwrap();
        assert_eq!(identity.expires_at, None);
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let token = sign(&claims(), "some-other-secret-entirely!!!!");
        let result = authenticator(AuthConfig::default()).authenticate(&token, NOW);
        assert_eq!(result, Err(AuthError::InvalidSignature));
    }

    #[test]
    fn test_missing_sub_rejected() {
        let token = sign(&TokenClaims { sub: String::new(), ..claims() }, SECRET);
        let result = authenticator(AuthConfig::default()).authenticate(&token, NOW);
        assert_eq!(result, Err(AuthError::MissingClaim("sub")));
    }

    #[test]
    fn test_issuer_and_audience() {
        let token = sign(&claims(), SECRET);

        let wrong_issuer = authenticator(AuthConfig { issuer: Some("elsewhere".into()), ..Default::default() });
        assert_eq!(wrong_issuer.authenticate(&token, NOW), Err(AuthError::InvalidIssuer));

        let wrong_audience = authenticator(AuthConfig { audience: Some("other".into()), ..Default::default() });
        assert_eq!(wrong_audience.authenticate(&token, NOW), Err(AuthError::InvalidAudience));

        let matching = authenticator(AuthConfig {
            issuer: Some("test-issuer".into()),
            audience: Some("rps".into()),
            ..Default::default()
        });
        assert!(matching.authenticate(&token, NOW).is_ok());
    }

    #[test]
    fn test_garbage_token() {
        let result = authenticator(AuthConfig::default()).authenticate("not-a-jwt", NOW);
        assert!(result.is_err());
    }

    #[test]
    fn test_not_configured() {
        assert_eq!(
            Authenticator::new(&AuthConfig::default()).unwrap_err(),
            AuthError::NotConfigured
        );
    }

    #[test]
    fn test_address_is_stable_per_subject() {
        let a = claims();
        let b = TokenClaims { sub: "player-8".into(), ..claims() };
        assert_eq!(a.address(), claims().address());
        assert_ne!(a.address(), b.address());
    }
}
