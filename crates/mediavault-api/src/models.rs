//! Request and response bodies for the REST API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Standard error body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
    /// Machine-readable error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Field-level validation failures, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldErrorBody>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: Some(code.to_string()),
            details: None,
        }
    }

    pub fn validation(errors: &mediavault_access::ValidationErrors) -> Self {
        Self {
            error: errors.to_string(),
            code: Some("VALIDATION_FAILED".to_string()),
            details: Some(
                errors
                    .errors
                    .iter()
                    .map(|e| FieldErrorBody {
                        field: e.field.to_string(),
                        message: e.message.clone(),
                    })
                    .collect(),
            ),
        }
    }
}

/// One field-level validation failure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FieldErrorBody {
    pub field: String,
    pub message: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Login request; `login` accepts a username or an email address
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
    /// Mint an API session instead of an interactive one
    #[serde(default)]
    pub api: bool,
}

/// Login response with the signed session token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

/// Public view of a user account
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
}

/// Request to create an access token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAccessTokenRequest {
    /// Media object the token grants access to
    pub media_object_id: String,
    /// When the grant ends; must be in the future
    pub expiration: Option<DateTime<Utc>>,
    /// "streaming_only", "download_only", or "streaming_and_download";
    /// anything else grants nothing
    pub access_mode: Option<String>,
    pub description: Option<String>,
}

/// Request to update an access token
///
/// `expiration` is accepted for wire compatibility but ignored: the
/// expiration of a persisted token cannot be changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateAccessTokenRequest {
    pub revoked: Option<bool>,
    pub description: Option<String>,
    pub access_mode: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

/// An access token as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccessTokenResponse {
    pub id: Uuid,
    pub token: String,
    pub media_object_id: String,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub expiration: DateTime<Utc>,
    pub access_mode: String,
    pub allow_streaming: bool,
    pub allow_download: bool,
    pub revoked: bool,
    pub expired: bool,
    /// Not expired and not revoked, evaluated now
    pub active: bool,
    /// "active", "expired", or "revoked"
    pub status: String,
    /// Patron-facing playback URL carrying the token; present while active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// List of access tokens
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccessTokenList {
    pub tokens: Vec<AccessTokenResponse>,
    pub total: usize,
}

/// Query parameters for the token list
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ListTokensQuery {
    /// "active" (default), "expired", "revoked", or "all"
    pub status: Option<String>,
}

/// Query parameters for the authorization endpoints
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AuthorizationQuery {
    /// Presented access-token value
    pub access_token: Option<String>,
}

/// Decision returned by the authorization endpoints
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthorizationResponse {
    pub media_object_id: String,
    pub authorized: bool,
}

/// Result of a sweep pass
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SweepResponse {
    /// Tokens transitioned to expired
    pub processed: usize,
    /// Tokens whose transition failed and will be retried
    pub failed: usize,
}
