//! End-to-end API tests over the real router, an in-memory SQLite database,
//! and the in-memory media repository.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use mediavault_access::{
    AbilityResolver, CollectionRoles, MemoryRepository, Resource, TokenService,
};
use mediavault_api::{models::*, router, AppState};

const JWT_SECRET: &[u8] = b"integration-test-secret";
const COLLECTION: &str = "coll-oral-history";
const MEDIA_OBJECT: &str = "mo-interview-07";

struct TestApp {
    app: Router,
    repo: MemoryRepository,
}

async fn spawn_app() -> TestApp {
    let db = mediavault_db::connect("sqlite::memory:").await.unwrap();
    mediavault_db::migrate(&db).await.unwrap();

    let repo = MemoryRepository::new();
    repo.insert_resource(Resource {
        id: MEDIA_OBJECT.to_string(),
        collection_id: COLLECTION.to_string(),
        read_groups: BTreeSet::new(),
        published: true,
    })
    .await;
    repo.insert_collection(
        COLLECTION,
        CollectionRoles {
            managers: BTreeSet::from(["archivist".to_string()]),
            editors: BTreeSet::new(),
            depositors: BTreeSet::new(),
        },
    )
    .await;

    for (username, is_admin) in [("archivist", false), ("root", true), ("visitor", false)] {
        seed_user(&db, username, is_admin).await;
    }

    let tokens = TokenService::new(db.clone(), Arc::new(repo.clone()), Arc::new(repo.clone()));
    let resolver = AbilityResolver::new(
        tokens.clone(),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    );

    let state = Arc::new(AppState {
        db,
        tokens,
        resolver,
        jwt_secret: JWT_SECRET.to_vec(),
        public_url: "https://vault.example.edu".to_string(),
    });

    TestApp {
        app: router(state),
        repo,
    }
}

async fn seed_user(db: &sea_orm::DatabaseConnection, username: &str, is_admin: bool) {
    use sea_orm::{ActiveModelTrait, Set};

    mediavault_db::entities::user::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        email: Set(format!("{username}@example.edu")),
        password_hash: Set(mediavault_auth::hash_password("letmein-please").unwrap()),
        is_admin: Set(is_admin),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .unwrap();
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, bearer: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn login(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({"login": username, "password": "letmein-please"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

async fn create_token(app: &Router, session: &str, access_mode: &str) -> AccessTokenResponse {
    let expiration = Utc::now() + Duration::days(7);
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/access-tokens",
            Some(session),
            json!({
                "media_object_id": MEDIA_OBJECT,
                "expiration": expiration,
                "access_mode": access_mode,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    serde_json::from_value(body).unwrap()
}

#[tokio::test]
async fn health_is_open() {
    let t = spawn_app().await;
    let (status, body) = send(&t.app, get_request("/api/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let t = spawn_app().await;

    let (status, _) = send(
        &t.app,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({"login": "archivist", "password": "wrong"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // unknown user gets the same answer
    let (status, _) = send(
        &t.app,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({"login": "nobody", "password": "letmein-please"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_management_requires_a_session() {
    let t = spawn_app().await;

    let (status, _) = send(
        &t.app,
        json_request("POST", "/api/access-tokens", None, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn manager_creates_token_and_read_group_appears() {
    let t = spawn_app().await;
    let session = login(&t.app, "archivist").await;

    let token = create_token(&t.app, &session, "streaming_and_download").await;

    assert_eq!(token.media_object_id, MEDIA_OBJECT);
    assert_eq!(token.access_mode, "streaming_and_download");
    assert_eq!(token.status, "active");
    assert!(token.active);
    let url = token.access_url.expect("active token should carry a link");
    assert!(url.contains(&token.token));
    assert!(url.starts_with("https://vault.example.edu/media/"));

    assert!(t.repo.read_groups(MEDIA_OBJECT).await.contains(&token.token));
}

#[tokio::test]
async fn validation_errors_come_back_as_field_details() {
    let t = spawn_app().await;
    let session = login(&t.app, "archivist").await;

    let (status, body) = send(
        &t.app,
        json_request(
            "POST",
            "/api/access-tokens",
            Some(&session),
            json!({
                "media_object_id": MEDIA_OBJECT,
                "expiration": Utc::now() - Duration::days(1),
                "access_mode": "streaming_only",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let details = body["details"].as_array().unwrap();
    assert!(details
        .iter()
        .any(|d| d["field"] == "expiration" && d["message"] == "is in the past"));
}

#[tokio::test]
async fn outsiders_get_not_found_instead_of_forbidden() {
    let t = spawn_app().await;
    let session = login(&t.app, "visitor").await;

    let (status, body) = send(
        &t.app,
        json_request(
            "POST",
            "/api/access-tokens",
            Some(&session),
            json!({
                "media_object_id": MEDIA_OBJECT,
                "expiration": Utc::now() + Duration::days(7),
                "access_mode": "streaming_only",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let details = body["details"].as_array().unwrap();
    assert!(details
        .iter()
        .any(|d| d["field"] == "media_object" && d["message"] == "not found"));
}

#[tokio::test]
async fn stream_authorization_honors_tokens_and_revocation() {
    let t = spawn_app().await;
    let session = login(&t.app, "archivist").await;
    let token = create_token(&t.app, &session, "streaming_only").await;

    let auth_uri = format!(
        "/api/media/{MEDIA_OBJECT}/stream-authorization?access_token={}",
        token.token
    );

    // anonymous caller with the token link
    let (status, body) = send(&t.app, get_request(&auth_uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authorized"], true);

    // anonymous caller without it
    let bare_uri = format!("/api/media/{MEDIA_OBJECT}/stream-authorization");
    let (_, body) = send(&t.app, get_request(&bare_uri, None)).await;
    assert_eq!(body["authorized"], false);

    // revoke, then the same link stops working immediately
    let (status, _) = send(
        &t.app,
        json_request(
            "PATCH",
            &format!("/api/access-tokens/{}", token.id),
            Some(&session),
            json!({"revoked": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&t.app, get_request(&auth_uri, None)).await;
    assert_eq!(body["authorized"], false);
    assert!(!t.repo.read_groups(MEDIA_OBJECT).await.contains(&token.token));
}

#[tokio::test]
async fn download_authorization_uses_the_token_group() {
    let t = spawn_app().await;
    let session = login(&t.app, "archivist").await;
    let token = create_token(&t.app, &session, "download_only").await;

    let uri = format!(
        "/api/media/{MEDIA_OBJECT}/files/mf-001/download-authorization?access_token={}",
        token.token
    );
    let (status, body) = send(&t.app, get_request(&uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authorized"], true);

    // a streaming-only token does not allow downloads
    let streaming = create_token(&t.app, &session, "streaming_only").await;
    let uri = format!(
        "/api/media/{MEDIA_OBJECT}/files/mf-001/download-authorization?access_token={}",
        streaming.token
    );
    let (_, body) = send(&t.app, get_request(&uri, None)).await;
    assert_eq!(body["authorized"], false);
}

#[tokio::test]
async fn expiration_changes_are_ignored_on_update() {
    let t = spawn_app().await;
    let session = login(&t.app, "archivist").await;
    let token = create_token(&t.app, &session, "streaming_only").await;

    let (status, body) = send(
        &t.app,
        json_request(
            "PATCH",
            &format!("/api/access-tokens/{}", token.id),
            Some(&session),
            json!({"expiration": Utc::now() + Duration::days(90)}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let updated: AccessTokenResponse = serde_json::from_value(body).unwrap();
    assert_eq!(updated.expiration, token.expiration);
}

#[tokio::test]
async fn listing_is_scoped_by_role() {
    let t = spawn_app().await;
    let manager = login(&t.app, "archivist").await;
    let admin = login(&t.app, "root").await;
    let visitor = login(&t.app, "visitor").await;

    create_token(&t.app, &manager, "streaming_only").await;

    for (session, expected) in [(&admin, 1), (&manager, 1), (&visitor, 0)] {
        let (status, body) = send(
            &t.app,
            get_request("/api/access-tokens?status=all", Some(session)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], expected);
    }
}

#[tokio::test]
async fn show_hides_tokens_from_non_editors() {
    let t = spawn_app().await;
    let manager = login(&t.app, "archivist").await;
    let visitor = login(&t.app, "visitor").await;
    let token = create_token(&t.app, &manager, "streaming_only").await;

    let uri = format!("/api/access-tokens/{}", token.id);

    let (status, _) = send(&t.app, get_request(&uri, Some(&manager))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&t.app, get_request(&uri, Some(&visitor))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sweep_is_admin_only_and_reports() {
    let t = spawn_app().await;
    let manager = login(&t.app, "archivist").await;
    let admin = login(&t.app, "root").await;

    let (status, _) = send(
        &t.app,
        json_request("POST", "/api/access-tokens/sweep", Some(&manager), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &t.app,
        json_request("POST", "/api/access-tokens/sweep", Some(&admin), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], 0);
    assert_eq!(body["failed"], 0);
}

#[tokio::test]
async fn unknown_media_object_is_a_404() {
    let t = spawn_app().await;

    let (status, _) = send(
        &t.app,
        get_request("/api/media/mo-unknown/stream-authorization", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
