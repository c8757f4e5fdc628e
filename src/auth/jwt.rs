//! JWT Token Service
//! Mission: Issue and verify signed, time-bound identity tokens

use crate::auth::models::{Claims, Identity, Role};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signing secret is empty")]
    MissingKey,

    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    /// Bad signature, malformed payload or expiry. Callers see one category.
    #[error("invalid or expired token")]
    Invalid,
}

/// A freshly issued token and its lifetime in seconds.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: i64,
}

/// Stateless HS256 token service. Nothing is stored server-side.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    key_present: bool,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            key_present: !secret.is_empty(),
        }
    }

    /// Issue a token asserting `username` and `role`, valid for the configured lifetime.
    pub fn issue(&self, username: &str, role: Role) -> Result<IssuedToken, TokenError> {
        self.issue_at(username, role, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        username: &str,
        role: Role,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        if !self.key_present {
            return Err(TokenError::MissingKey);
        }

        let claims = Claims {
            sub: username.to_string(),
            role,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(TokenError::Signing)?;

        debug!(
            "Issued token for {} ({}), expires in {}h",
            username,
            role,
            self.ttl.num_hours()
        );

        Ok(IssuedToken {
            token,
            expires_in: self.ttl.num_seconds(),
        })
    }

    /// Verify signature and expiry, returning the identity the token asserts.
    pub fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let decoded = decode::<Claims>(token, &self.decoding, &validation).map_err(|err| {
            debug!("Token rejected: {}", err);
            TokenError::Invalid
        })?;

        // jsonwebtoken accepts exp == now; a token is only valid strictly before expiry.
        if decoded.claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Invalid);
        }

        Ok(Identity {
            username: decoded.claims.sub,
            role: decoded.claims.role,
        })
    }
}
