//! Manage json web tokens.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::Token as TokenConfig;

pub const DEFAULT_EXPIRATION_TIME: u64 = 60 * 15; // 15 minutes.
pub const CONFIRMATION_EXPIRATION_TIME: u64 = 60 * 60 * 24; // 1 day.

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
    #[error("token issued for {0:?}")]
    WrongPurpose(Purpose),
    #[error("cannot sign token: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),
}

/// What a token may be used for.
///
/// A confirmation token never opens a session and the other way around.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    #[default]
    Session,
    EmailConfirmation,
}

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
    #[serde(default)]
    pub purpose: Purpose,
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    expires_in: u64,
    confirmation_expires_in: u64,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a new [`TokenManager`] instance.
    pub fn new(config: &TokenConfig) -> Self {
        let secret = config.secret.as_bytes();

        Self {
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            expires_in: config.expires_in,
            confirmation_expires_in: config.confirmation_expires_in,
        }
    }

    /// Lifetime of session tokens, in seconds.
    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    /// Create a new session token for `user_id`.
    pub fn create(&self, user_id: &str) -> Result<String, TokenError> {
        self.create_at(user_id, now())
    }

    /// Create a session token as if issued at `issued_at` (UNIX seconds).
    pub fn create_at(&self, user_id: &str, issued_at: u64) -> Result<String, TokenError> {
        self.issue(user_id, Purpose::Session, issued_at)
    }

    /// Create an email confirmation token for `user_id`.
    pub fn create_confirmation(&self, user_id: &str) -> Result<String, TokenError> {
        self.create_confirmation_at(user_id, now())
    }

    pub fn create_confirmation_at(
        &self,
        user_id: &str,
        issued_at: u64,
    ) -> Result<String, TokenError> {
        self.issue(user_id, Purpose::EmailConfirmation, issued_at)
    }

    fn issue(&self, user_id: &str, purpose: Purpose, issued_at: u64) -> Result<String, TokenError> {
        let lifetime = match purpose {
            Purpose::Session => self.expires_in,
            Purpose::EmailConfirmation => self.confirmation_expires_in,
        };
        let claims = Claims {
            aud: self.audience.clone(),
            exp: issued_at + lifetime,
            iat: issued_at,
            iss: self.issuer.clone(),
            sub: user_id.to_owned(),
            purpose,
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(TokenError::Encoding)
    }

    /// Decode and check a session token.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_at(token, now())
    }

    /// Decode and check a session token against the instant `now` (UNIX
    /// seconds).
    pub fn decode_at(&self, token: &str, now: u64) -> Result<Claims, TokenError> {
        self.check(token, Purpose::Session, now)
    }

    /// Decode and check an email confirmation token.
    pub fn decode_confirmation(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_confirmation_at(token, now())
    }

    pub fn decode_confirmation_at(&self, token: &str, now: u64) -> Result<Claims, TokenError> {
        self.check(token, Purpose::EmailConfirmation, now)
    }

    /// No clock skew is tolerated: the token is refused as soon as
    /// `now >= exp`.
    fn check(&self, token: &str, purpose: Purpose, now: u64) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        // expiry is checked below with `now`.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(TokenError::Invalid)?
            .claims;

        if claims.purpose != purpose {
            return Err(TokenError::WrongPurpose(claims.purpose));
        }
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

fn now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
