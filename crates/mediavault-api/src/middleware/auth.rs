//! Session authentication middleware
//!
//! Extracts the session JWT from an HTTP-only cookie or the Authorization
//! header, validates it, and injects an [`AuthUser`] into request
//! extensions. Token-management routes use [`require_session`];
//! authorization endpoints use [`optional_session`] so patrons following a
//! token link are evaluated anonymously instead of being turned away.

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use mediavault_access::{Creator, SessionUser};
use mediavault_auth::{JwtValidator, SessionClaims, TOKEN_TYPE_SESSION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::models::ErrorResponse;

/// Authenticated caller context extracted from session claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
    /// Role groups resolved at login
    pub groups: Vec<String>,
    /// Session-scoped course/LTI groups
    pub virtual_groups: Vec<String>,
    /// "session" or "api"
    pub token_type: String,
}

impl AuthUser {
    pub fn is_full_login(&self) -> bool {
        self.token_type == TOKEN_TYPE_SESSION
    }

    pub fn is_api_request(&self) -> bool {
        !self.is_full_login()
    }

    pub fn session_user(&self) -> SessionUser {
        SessionUser {
            id: self.user_id,
            username: self.username.clone(),
            groups: self.groups.clone(),
        }
    }

    pub fn creator(&self) -> Creator {
        Creator {
            id: self.user_id,
            username: self.username.clone(),
            is_admin: self
                .groups
                .iter()
                .any(|g| g == mediavault_access::ability::ADMINISTRATOR_GROUP),
        }
    }
}

/// JWT validation state shared across middleware instances
#[derive(Clone)]
pub struct JwtState {
    pub validator: Arc<JwtValidator>,
}

impl JwtState {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            validator: Arc::new(JwtValidator::new(secret)),
        }
    }
}

fn unauthorized(message: &str, code: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new(message, code)),
    )
}

/// Pull the raw session token from the `session_token` cookie or a
/// `Bearer` Authorization header.
fn extract_token(request: &Request) -> Option<String> {
    if let Some(cookie_header) = request.headers().get(header::COOKIE) {
        if let Some(token) = cookie_header.to_str().ok().and_then(|cookies| {
            cookies
                .split(';')
                .map(|c| c.trim())
                .find(|c| c.starts_with("session_token="))
                .and_then(|c| c.strip_prefix("session_token="))
        }) {
            return Some(token.to_string());
        }
    }

    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

fn auth_user_from_claims(claims: SessionClaims) -> Result<AuthUser, &'static str> {
    let token_type = claims.token_type.ok_or("Token missing 'token_type' claim")?;
    let user_id = claims
        .user_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or("Token missing or malformed 'user_id' claim")?;

    Ok(AuthUser {
        user_id,
        username: claims.sub,
        groups: claims.groups,
        virtual_groups: claims.virtual_groups,
        token_type,
    })
}

/// Authentication middleware for routes that need a logged-in caller.
///
/// Returns 401 when the token is missing, malformed, expired, or lacking
/// the identity claims.
pub async fn require_session(
    state: axum::extract::State<Arc<JwtState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let token = extract_token(&request).ok_or_else(|| {
        unauthorized(
            "Missing authentication token (cookie or Authorization header)",
            "MISSING_AUTH",
        )
    })?;

    let claims = state.validator.validate(&token).map_err(|e| {
        unauthorized(&format!("Invalid or expired session: {e}"), "INVALID_TOKEN")
    })?;

    let auth_user =
        auth_user_from_claims(claims).map_err(|msg| unauthorized(msg, "INVALID_CLAIMS"))?;

    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Best-effort authentication for endpoints that also serve anonymous
/// callers. A missing or invalid session is treated as anonymous; it never
/// rejects the request.
pub async fn optional_session(
    state: axum::extract::State<Arc<JwtState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_token(&request) {
        match state.validator.validate(&token) {
            Ok(claims) => {
                if let Ok(auth_user) = auth_user_from_claims(claims) {
                    request.extensions_mut().insert(auth_user);
                }
            }
            Err(e) => {
                debug!(error = %e, "Ignoring invalid session on anonymous-capable route");
            }
        }
    }

    next.run(request).await
}
