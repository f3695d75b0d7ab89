//! Resolver-level tests: group composition from session, network, course,
//! and token signals, and the tolerance rules for bad inputs.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use mediavault_access::{
    download_group_name, AbilityResolver, AccessMode, Action, CollectionRoles, Creator,
    IpGroupResolver, MemoryRepository, NetworkGroup, NewAccessToken, RequestContext, Resource,
    SessionUser, StoreError, Target, TokenService,
};

const COLLECTION: &str = "coll-film";
const MEDIA_OBJECT: &str = "mo-newsreel-42";

async fn fixture() -> (TokenService, AbilityResolver, MemoryRepository, Creator) {
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

    let manager = Creator {
        id: seed_user(&db, "archivist").await,
        username: "archivist".to_string(),
        is_admin: false,
    };

    let service = TokenService::new(db, Arc::new(repo.clone()), Arc::new(repo.clone()));
    let resolver = AbilityResolver::new(
        service.clone(),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    );

    (service, resolver, repo, manager)
}

async fn seed_user(db: &sea_orm::DatabaseConnection, username: &str) -> Uuid {
    use sea_orm::{ActiveModelTrait, Set};

    mediavault_db::entities::user::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        email: Set(format!("{username}@example.edu")),
        password_hash: Set("$argon2id$stub".to_string()),
        is_admin: Set(false),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .unwrap()
    .id
}

fn download_token(service: &TokenService, manager: &Creator) -> (TokenService, Creator, NewAccessToken) {
    (
        service.clone(),
        manager.clone(),
        NewAccessToken {
            media_object_id: MEDIA_OBJECT.to_string(),
            expiration: Some(Utc::now() + Duration::days(7)),
            mode: AccessMode::StreamingAndDownload,
            description: None,
        },
    )
}

#[tokio::test]
async fn baseline_groups_for_anonymous_and_known_users() {
    let (_service, resolver, _repo, _manager) = fixture().await;

    let anon = resolver.resolve(RequestContext::default()).await.unwrap();
    assert!(anon.groups().contains("public"));
    assert!(!anon.groups().contains("registered"));

    let known = resolver
        .resolve(RequestContext {
            user: Some(SessionUser {
                id: Uuid::new_v4(),
                username: "patron".to_string(),
                groups: vec!["course_reserves".to_string()],
            }),
            full_login: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(known.groups().contains("public"));
    assert!(known.groups().contains("registered"));
    assert!(known.groups().contains("course_reserves"));
}

#[tokio::test]
async fn virtual_and_network_groups_are_merged() {
    let (_service, resolver, repo, _manager) = fixture().await;

    let ip: IpAddr = "192.0.2.44".parse().unwrap();
    repo.insert_ip_group(ip, NetworkGroup::new("campus").unwrap())
        .await;

    let ability = resolver
        .resolve(RequestContext {
            remote_ip: Some(ip),
            virtual_groups: vec!["lti:HIST301".to_string(), "lti:HIST301".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(ability.groups().contains("192.0.2.44"));
    assert!(ability.groups().contains("net.range:campus"));
    // duplicates collapse
    assert_eq!(
        ability.groups().iter().filter(|g| *g == "lti:HIST301").count(),
        1
    );
}

#[tokio::test]
async fn active_download_token_contributes_its_group() {
    let (service, resolver, _repo, manager) = fixture().await;
    let (service, manager, params) = download_token(&service, &manager);
    let token = service.create(&manager, params).await.unwrap();

    let ability = resolver
        .resolve(RequestContext {
            access_token: Some(token.token.clone()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(ability
        .groups()
        .contains(&download_group_name(MEDIA_OBJECT)));
}

#[tokio::test]
async fn revoked_token_contributes_nothing() {
    let (service, resolver, _repo, manager) = fixture().await;
    let (service, manager, params) = download_token(&service, &manager);
    let token = service.create(&manager, params).await.unwrap();
    service.revoke(token.id).await.unwrap();

    let ability = resolver
        .resolve(RequestContext {
            access_token: Some(token.token.clone()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(!ability
        .groups()
        .contains(&download_group_name(MEDIA_OBJECT)));
}

#[tokio::test]
async fn garbage_token_values_resolve_to_no_groups() {
    let (_service, resolver, _repo, _manager) = fixture().await;

    for bad in ["", "    ", "definitely-not-a-token"] {
        let ability = resolver
            .resolve(RequestContext {
                access_token: Some(bad.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(
            !ability.groups().iter().any(|g| g.starts_with("allow_download_")),
            "token value {bad:?} must grant nothing"
        );
    }
}

struct FlakyIpResolver;

#[async_trait]
impl IpGroupResolver for FlakyIpResolver {
    async fn groups_for(&self, _ip: IpAddr) -> Result<Vec<NetworkGroup>, StoreError> {
        Err(StoreError::Backend("ip manager unreachable".to_string()))
    }
}

#[tokio::test]
async fn ip_resolver_failure_degrades_to_no_network_groups() {
    let (service, _resolver, repo, _manager) = fixture().await;

    let resolver = AbilityResolver::new(
        service,
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(FlakyIpResolver),
    );

    let ip: IpAddr = "198.51.100.7".parse().unwrap();
    let ability = resolver
        .resolve(RequestContext {
            remote_ip: Some(ip),
            ..Default::default()
        })
        .await
        .unwrap();

    // the raw address group is still present; resolver-derived groups are not
    assert!(ability.groups().contains("198.51.100.7"));
    assert!(!ability.groups().iter().any(|g| g.starts_with("net.range:")));
}

#[tokio::test]
async fn stream_decision_end_to_end_with_token() {
    let (service, resolver, _repo, manager) = fixture().await;
    let token = service
        .create(
            &manager,
            NewAccessToken {
                media_object_id: MEDIA_OBJECT.to_string(),
                expiration: Some(Utc::now() + Duration::days(7)),
                mode: AccessMode::StreamingOnly,
                description: None,
            },
        )
        .await
        .unwrap();

    let media = resolver.media_view(MEDIA_OBJECT).await.unwrap().unwrap();

    let with_token = resolver
        .resolve(RequestContext {
            access_token: Some(token.token.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(with_token.can(Action::Stream, &Target::Media(&media)));

    let without_token = resolver.resolve(RequestContext::default()).await.unwrap();
    assert!(!without_token.can(Action::Stream, &Target::Media(&media)));

    // revocation is visible on the very next evaluation
    service.revoke(token.id).await.unwrap();
    let after_revoke = resolver
        .resolve(RequestContext {
            access_token: Some(token.token.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(!after_revoke.can(Action::Stream, &Target::Media(&media)));
}
