//! JWT session handling
//!
//! MediaVault sessions are short-lived HS256 tokens minted at login. The
//! claims carry everything the ability engine needs to know about the
//! caller's identity: user id, username, resolved role groups, any
//! course/LTI virtual groups attached at sign-in, and the login kind
//! (interactive session vs. API).

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Login kind claim value for interactive (full) logins
pub const TOKEN_TYPE_SESSION: &str = "session";
/// Login kind claim value for API logins
pub const TOKEN_TYPE_API: &str = "api";

/// JWT claims for an authenticated MediaVault caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// Subject (username)
    pub sub: String,
    /// Issued at (timestamp)
    pub iat: i64,
    /// Expiration time (timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// User UUID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Role groups the user belonged to at login ("administrator", "manager", ...)
    #[serde(default)]
    pub groups: Vec<String>,
    /// Virtual groups granted for this session only (LTI/course contexts)
    #[serde(default)]
    pub virtual_groups: Vec<String>,
    /// Login kind: "session" for full logins, "api" for API logins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl SessionClaims {
    pub fn new(username: String, issuer: String, audience: String, validity: Duration) -> Self {
        let now = Utc::now();
        let exp = now + validity;

        Self {
            sub: username,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: issuer,
            aud: audience,
            user_id: None,
            groups: Vec::new(),
            virtual_groups: Vec::new(),
            token_type: None,
        }
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    /// Attach session-scoped virtual groups (e.g. course contexts from an
    /// LTI launch). These are never persisted on the user record.
    pub fn with_virtual_groups(mut self, groups: Vec<String>) -> Self {
        self.virtual_groups = groups;
        self
    }

    pub fn with_token_type(mut self, token_type: String) -> Self {
        self.token_type = Some(token_type);
        self
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    /// Whether these claims represent an interactive (full) login.
    pub fn is_full_login(&self) -> bool {
        self.token_type.as_deref() == Some(TOKEN_TYPE_SESSION)
    }

    /// Whether these claims represent an API login.
    pub fn is_api_login(&self) -> bool {
        self.token_type.as_deref() == Some(TOKEN_TYPE_API)
    }
}

/// Error types for JWT operations
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Token is invalid: {0}")]
    InvalidToken(String),

    #[error("Token has expired")]
    Expired,
}

/// Validates and decodes session JWTs with a shared secret
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Audience varies by deployment; expiry and signature are what we enforce
        validation.validate_aud = false;

        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Encode claims into a signed JWT string.
    pub fn encode(secret: &[u8], claims: &SessionClaims) -> Result<String, JwtError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret),
        )
        .map_err(|e| JwtError::EncodingFailed(e.to_string()))
    }

    /// Validate signature and expiry, returning the decoded claims.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, JwtError> {
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::InvalidToken(e.to_string()),
            })
    }
}
