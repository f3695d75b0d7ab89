use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::Duration;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{Condition, EntityTrait, QueryFilter};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use mediavault_access::{
    AccessError, AccessMode, Action, MasterFile, NewAccessToken, RequestContext, Target,
    TokenStatus, TokenUpdate,
};
use mediavault_auth::{JwtValidator, SessionClaims, TOKEN_TYPE_API, TOKEN_TYPE_SESSION};
use mediavault_db::entities::{access_token, user};

use crate::middleware::AuthUser;
use crate::models::*;
use crate::AppState;

const SESSION_HOURS: i64 = 12;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(e: impl std::fmt::Display) -> ApiError {
    error!("Internal error: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal server error", "INTERNAL")),
    )
}

fn not_found() -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("not found", "NOT_FOUND")),
    )
}

fn forbidden() -> ApiError {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse::new("Administrator access required", "FORBIDDEN")),
    )
}

fn map_access_error(e: AccessError) -> ApiError {
    match e {
        AccessError::Validation(errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::validation(&errors)),
        ),
        AccessError::TokenNotFound => not_found(),
        AccessError::Store(e) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse::new(
                format!("Media repository unavailable: {e}"),
                "REPOSITORY_ERROR",
            )),
        ),
        AccessError::Database(e) => internal_error(e),
    }
}

/// First address in X-Forwarded-For, when the proxy supplies one.
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
}

fn request_context(
    user: Option<&AuthUser>,
    access_token: Option<String>,
    remote_ip: Option<IpAddr>,
) -> RequestContext {
    match user {
        Some(u) => RequestContext {
            user: Some(u.session_user()),
            full_login: u.is_full_login(),
            api_request: u.is_api_request(),
            access_token,
            remote_ip,
            virtual_groups: u.virtual_groups.clone(),
        },
        None => RequestContext {
            access_token,
            remote_ip,
            ..Default::default()
        },
    }
}

fn token_json(state: &AppState, token: &access_token::Model) -> AccessTokenResponse {
    let active = state.tokens.is_currently_active(token);
    let status = if token.revoked {
        "revoked"
    } else if active {
        "active"
    } else {
        "expired"
    };

    AccessTokenResponse {
        id: token.id,
        token: token.token.clone(),
        media_object_id: token.media_object_id.clone(),
        user_id: token.user_id,
        description: token.description.clone(),
        expiration: token.expiration,
        access_mode: AccessMode::from_flags(token.allow_streaming, token.allow_download)
            .as_str()
            .to_string(),
        allow_streaming: token.allow_streaming,
        allow_download: token.allow_download,
        revoked: token.revoked,
        expired: token.expired,
        active,
        status: status.to_string(),
        access_url: active.then(|| {
            format!(
                "{}/media/{}?access_token={}",
                state.public_url, token.media_object_id, token.token
            )
        }),
        created_at: token.created_at,
    }
}

/// Service health check
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Log in with username or email
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session created", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let invalid = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Invalid credentials", "INVALID_CREDENTIALS")),
        )
    };

    // username and email match case-insensitively
    let needle = req.login.trim().to_lowercase();
    let account = user::Entity::find()
        .filter(
            Condition::any()
                .add(
                    Expr::expr(Func::lower(Expr::col((
                        user::Entity,
                        user::Column::Username,
                    ))))
                    .eq(needle.clone()),
                )
                .add(
                    Expr::expr(Func::lower(Expr::col((user::Entity, user::Column::Email))))
                        .eq(needle),
                ),
        )
        .one(&state.db)
        .await
        .map_err(internal_error)?
        .ok_or_else(invalid)?;

    let verified = mediavault_auth::verify_password(&req.password, &account.password_hash)
        .map_err(internal_error)?;
    if !verified {
        return Err(invalid());
    }

    let mut groups = Vec::new();
    if account.is_admin {
        groups.push(mediavault_access::ability::ADMINISTRATOR_GROUP.to_string());
    }

    let token_type = if req.api {
        TOKEN_TYPE_API
    } else {
        TOKEN_TYPE_SESSION
    };
    let claims = SessionClaims::new(
        account.username.clone(),
        "mediavault".to_string(),
        "mediavault-web".to_string(),
        Duration::hours(SESSION_HOURS),
    )
    .with_user_id(account.id.to_string())
    .with_groups(groups)
    .with_token_type(token_type.to_string());

    let token = JwtValidator::encode(&state.jwt_secret, &claims).map_err(internal_error)?;

    info!(username = %account.username, "User logged in");

    Ok(Json(LoginResponse {
        token,
        user: UserInfo {
            id: account.id,
            username: account.username,
            email: account.email,
            is_admin: account.is_admin,
        },
    }))
}

/// Create an access token
#[utoipa::path(
    post,
    path = "/api/access-tokens",
    request_body = CreateAccessTokenRequest,
    responses(
        (status = 201, description = "Token created", body = AccessTokenResponse),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 422, description = "Validation failed", body = ErrorResponse)
    ),
    tag = "access-tokens"
)]
pub async fn create_access_token(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateAccessTokenRequest>,
) -> Result<(StatusCode, Json<AccessTokenResponse>), ApiError> {
    debug!(media_object_id = %req.media_object_id, "Creating access token");

    let creator = auth.creator();
    let params = NewAccessToken {
        media_object_id: req.media_object_id,
        expiration: req.expiration,
        mode: req
            .access_mode
            .as_deref()
            .map(AccessMode::parse)
            .unwrap_or(AccessMode::None),
        description: req.description,
    };

    let token = state
        .tokens
        .create(&creator, params)
        .await
        .map_err(map_access_error)?;

    Ok((StatusCode::CREATED, Json(token_json(&state, &token))))
}

/// List access tokens
///
/// Administrators see every token; other callers only see tokens for
/// collections they edit.
#[utoipa::path(
    get,
    path = "/api/access-tokens",
    params(
        ("status" = Option<String>, Query, description = "active (default), expired, revoked, or all")
    ),
    responses(
        (status = 200, description = "Tokens visible to the caller", body = AccessTokenList),
        (status = 401, description = "Not logged in", body = ErrorResponse)
    ),
    tag = "access-tokens"
)]
pub async fn list_access_tokens(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListTokensQuery>,
) -> Result<Json<AccessTokenList>, ApiError> {
    let status = TokenStatus::parse(query.status.as_deref());
    debug!(status = status.as_str(), "Listing access tokens");

    let viewer = auth.creator();
    let tokens = state
        .tokens
        .list_visible_to(status, &viewer)
        .await
        .map_err(map_access_error)?;

    let tokens: Vec<AccessTokenResponse> =
        tokens.iter().map(|t| token_json(&state, t)).collect();

    Ok(Json(AccessTokenList {
        total: tokens.len(),
        tokens,
    }))
}

/// Show one access token
#[utoipa::path(
    get,
    path = "/api/access-tokens/{id}",
    params(
        ("id" = Uuid, Path, description = "Access token id")
    ),
    responses(
        (status = 200, description = "Token details", body = AccessTokenResponse),
        (status = 404, description = "No such token visible to the caller", body = ErrorResponse)
    ),
    tag = "access-tokens"
)]
pub async fn get_access_token(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let token = state
        .tokens
        .find(id)
        .await
        .map_err(map_access_error)?
        .ok_or_else(not_found)?;

    // non-editors get the same 404 as a missing token
    let viewer = auth.creator();
    let visible = state
        .tokens
        .editable_by(&token, &viewer)
        .await
        .map_err(|e| map_access_error(e.into()))?;
    if !visible {
        return Err(not_found());
    }

    Ok(Json(token_json(&state, &token)))
}

/// Update an access token
///
/// Revocation, description, and access mode are mutable. An expiration in
/// the body is ignored: the window of a persisted token cannot be changed.
#[utoipa::path(
    patch,
    path = "/api/access-tokens/{id}",
    params(
        ("id" = Uuid, Path, description = "Access token id")
    ),
    request_body = UpdateAccessTokenRequest,
    responses(
        (status = 200, description = "Updated token", body = AccessTokenResponse),
        (status = 404, description = "No such token visible to the caller", body = ErrorResponse)
    ),
    tag = "access-tokens"
)]
pub async fn update_access_token(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAccessTokenRequest>,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let token = state
        .tokens
        .find(id)
        .await
        .map_err(map_access_error)?
        .ok_or_else(not_found)?;

    let ability = state
        .resolver
        .resolve(request_context(Some(&auth), None, None))
        .await
        .map_err(map_access_error)?;
    let view = state
        .resolver
        .token_target_view(&token.media_object_id)
        .await
        .map_err(map_access_error)?;
    let allowed = view
        .as_ref()
        .map(|v| ability.can(Action::UpdateToken, &Target::Token(v)))
        .unwrap_or(false);
    if !allowed {
        return Err(not_found());
    }

    let updated = state
        .tokens
        .update(
            token.id,
            TokenUpdate {
                revoked: req.revoked,
                description: req.description,
                mode: req.access_mode.as_deref().map(AccessMode::parse),
                expiration: req.expiration,
            },
        )
        .await
        .map_err(map_access_error)?;

    Ok(Json(token_json(&state, &updated)))
}

/// Run the expiry sweep now (administrators only)
#[utoipa::path(
    post,
    path = "/api/access-tokens/sweep",
    responses(
        (status = 200, description = "Sweep report", body = SweepResponse),
        (status = 403, description = "Not an administrator", body = ErrorResponse)
    ),
    tag = "access-tokens"
)]
pub async fn sweep_access_tokens(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<SweepResponse>, ApiError> {
    let ability = state
        .resolver
        .resolve(request_context(Some(&auth), None, None))
        .await
        .map_err(map_access_error)?;
    if !ability.can(Action::ListAllTokens, &Target::TokenIndex) {
        return Err(forbidden());
    }

    let report = state
        .tokens
        .sweep_expired()
        .await
        .map_err(map_access_error)?;

    info!(
        processed = report.processed,
        failed = report.failed,
        "Manual sweep finished"
    );

    Ok(Json(SweepResponse {
        processed: report.processed,
        failed: report.failed,
    }))
}

/// Can the caller stream this media object?
///
/// The decision the streaming front-end enforces. Works for anonymous
/// callers presenting only an access token.
#[utoipa::path(
    get,
    path = "/api/media/{id}/stream-authorization",
    params(
        ("id" = String, Path, description = "Media object id"),
        ("access_token" = Option<String>, Query, description = "Presented access-token value")
    ),
    responses(
        (status = 200, description = "Streaming decision", body = AuthorizationResponse),
        (status = 404, description = "Unknown media object", body = ErrorResponse)
    ),
    tag = "authorization"
)]
pub async fn stream_authorization(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<AuthorizationQuery>,
    user: Option<Extension<AuthUser>>,
    headers: HeaderMap,
) -> Result<Json<AuthorizationResponse>, ApiError> {
    let media = state
        .resolver
        .media_view(&id)
        .await
        .map_err(map_access_error)?
        .ok_or_else(not_found)?;

    let ctx = request_context(
        user.as_ref().map(|Extension(u)| u),
        query.access_token,
        client_ip(&headers),
    );
    let ability = state.resolver.resolve(ctx).await.map_err(map_access_error)?;

    Ok(Json(AuthorizationResponse {
        authorized: ability.can(Action::Stream, &Target::Media(&media)),
        media_object_id: id,
    }))
}

/// Can the caller download this master file?
#[utoipa::path(
    get,
    path = "/api/media/{media_id}/files/{file_id}/download-authorization",
    params(
        ("media_id" = String, Path, description = "Parent media object id"),
        ("file_id" = String, Path, description = "Master file id"),
        ("access_token" = Option<String>, Query, description = "Presented access-token value")
    ),
    responses(
        (status = 200, description = "Download decision", body = AuthorizationResponse),
        (status = 404, description = "Unknown media object", body = ErrorResponse)
    ),
    tag = "authorization"
)]
pub async fn download_authorization(
    State(state): State<Arc<AppState>>,
    Path((media_id, file_id)): Path<(String, String)>,
    Query(query): Query<AuthorizationQuery>,
    user: Option<Extension<AuthUser>>,
    headers: HeaderMap,
) -> Result<Json<AuthorizationResponse>, ApiError> {
    let file = MasterFile {
        id: file_id,
        media_object_id: media_id.clone(),
    };
    let view = state
        .resolver
        .file_view(file)
        .await
        .map_err(map_access_error)?
        .ok_or_else(not_found)?;

    let ctx = request_context(
        user.as_ref().map(|Extension(u)| u),
        query.access_token,
        client_ip(&headers),
    );
    let ability = state.resolver.resolve(ctx).await.map_err(map_access_error)?;

    Ok(Json(AuthorizationResponse {
        authorized: ability.can(Action::MasterFileDownload, &Target::File(&view)),
        media_object_id: media_id,
    }))
}
