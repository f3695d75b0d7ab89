//! REST boundary for MediaVault
//!
//! Routes, handlers, and session middleware over the access core. The
//! router splits into a protected tree (token management, behind
//! [`middleware::require_session`]) and an open tree (health, login, and
//! the authorization endpoints, which serve anonymous patrons following
//! token links).

pub mod handlers;
pub mod middleware;
pub mod models;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use mediavault_access::{AbilityResolver, TokenService};
use middleware::JwtState;

/// Application state shared across handlers
pub struct AppState {
    pub db: DatabaseConnection,
    pub tokens: TokenService,
    pub resolver: AbilityResolver,
    pub jwt_secret: Vec<u8>,
    /// Public base URL used in patron-facing access links
    pub public_url: String,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "MediaVault API",
        version = "0.1.0",
        description = "Access-token management and authorization decisions for a digital media repository",
        contact(
            name = "MediaVault Team",
            email = "dev@mediavault.io"
        )
    ),
    paths(
        handlers::health_check,
        handlers::login,
        handlers::create_access_token,
        handlers::list_access_tokens,
        handlers::get_access_token,
        handlers::update_access_token,
        handlers::sweep_access_tokens,
        handlers::stream_authorization,
        handlers::download_authorization,
    ),
    components(
        schemas(
            models::ErrorResponse,
            models::FieldErrorBody,
            models::HealthResponse,
            models::LoginRequest,
            models::LoginResponse,
            models::UserInfo,
            models::CreateAccessTokenRequest,
            models::UpdateAccessTokenRequest,
            models::AccessTokenResponse,
            models::AccessTokenList,
            models::AuthorizationResponse,
            models::SweepResponse,
        )
    ),
    tags(
        (name = "system", description = "Service health"),
        (name = "auth", description = "Sessions"),
        (name = "access-tokens", description = "Access token management"),
        (name = "authorization", description = "Capability decisions")
    )
)]
pub struct ApiDoc;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let jwt_state = Arc::new(JwtState::new(&state.jwt_secret));

    let protected = Router::new()
        .route(
            "/api/access-tokens",
            post(handlers::create_access_token).get(handlers::list_access_tokens),
        )
        .route("/api/access-tokens/sweep", post(handlers::sweep_access_tokens))
        .route(
            "/api/access-tokens/{id}",
            get(handlers::get_access_token).patch(handlers::update_access_token),
        )
        .layer(axum_middleware::from_fn_with_state(
            jwt_state.clone(),
            middleware::require_session,
        ));

    let open = Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/api/auth/login", post(handlers::login))
        .route(
            "/api/media/{id}/stream-authorization",
            get(handlers::stream_authorization),
        )
        .route(
            "/api/media/{media_id}/files/{file_id}/download-authorization",
            get(handlers::download_authorization),
        )
        .layer(axum_middleware::from_fn_with_state(
            jwt_state,
            middleware::optional_session,
        ));

    Router::new()
        .merge(protected)
        .merge(open)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve the API.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
