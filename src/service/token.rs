use crate::models::session::Claims;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why a presented token was not accepted.
///
/// Every variant maps to the same rejection for the client; the distinction only
/// exists for logs.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            _ => TokenError::Malformed,
        }
    }
}

/// Issues and checks HS256 session tokens with a process-wide secret.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
    validation: Validation,
    unverified: Validation,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService").field("lifetime", &self.lifetime).finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str, lifetime: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let mut unverified = Validation::new(Algorithm::HS256);
        unverified.insecure_disable_signature_validation();
        unverified.validate_exp = false;
        unverified.required_spec_claims.clear();

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
            validation,
            unverified,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, username: &str) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(username, Utc::now())
    }

    pub(crate) fn issue_at(&self, username: &str, now: DateTime<Utc>) -> Result<String, jsonwebtoken::errors::Error> {
        let issued_at = now.timestamp();
        let claims = Claims {
            username: username.to_string(),
            iat: issued_at,
            exp: issued_at.saturating_add(i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX)),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Checks signature and expiry. This is the only path allowed to authorize access.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }

    /// Reads the claims without checking signature or expiry.
    ///
    /// Only used to find out *who* a request claims to be for activity tracking
    /// and logout. Never use the result to grant access.
    pub fn decode_unverified(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(token, &self.decoding, &self.unverified).ok().map(|data| data.claims)
    }
}
