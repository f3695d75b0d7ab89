//! Access-token lifecycle
//!
//! Creation (with its validation and information-hiding rules), the one-way
//! active → expired/revoked transitions, and the read-group entry kept in
//! sync on the protected media object. All time comparisons go through an
//! injected clock so expiry behavior is testable.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use mediavault_auth::TokenGenerator;
use mediavault_db::entities::access_token::{self, Entity as AccessToken};

use crate::error::{AccessError, ValidationErrors};
use crate::mode::{AccessMode, TokenStatus};
use crate::store::{CollectionDirectory, ResourceStore, StoreError};

/// Injected time source; production uses `Utc::now`.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The principal performing a token operation.
#[derive(Debug, Clone)]
pub struct Creator {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
}

/// Parameters for creating an access token.
#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub media_object_id: String,
    pub expiration: Option<DateTime<Utc>>,
    pub mode: AccessMode,
    pub description: Option<String>,
}

/// Mutable fields of a persisted token. An `expiration` here is ignored
/// with a warning: granted access windows cannot be shortened or extended
/// after the fact.
#[derive(Debug, Clone, Default)]
pub struct TokenUpdate {
    pub revoked: Option<bool>,
    pub description: Option<String>,
    pub mode: Option<AccessMode>,
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct TokenService {
    db: DatabaseConnection,
    resources: Arc<dyn ResourceStore>,
    collections: Arc<dyn CollectionDirectory>,
    clock: Clock,
}

impl TokenService {
    pub fn new(
        db: DatabaseConnection,
        resources: Arc<dyn ResourceStore>,
        collections: Arc<dyn CollectionDirectory>,
    ) -> Self {
        Self {
            db,
            resources,
            collections,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the time source (tests).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub(crate) fn database(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Create a token after validating expiration, resource existence, and
    /// the creator's standing. An unauthorized creator gets the same
    /// "not found" error as a nonexistent resource, so creation attempts
    /// cannot probe for resource existence.
    pub async fn create(
        &self,
        creator: &Creator,
        params: NewAccessToken,
    ) -> Result<access_token::Model, AccessError> {
        let now = self.now();
        let mut errors = ValidationErrors::new();

        match params.expiration {
            None => errors.add("expiration", "can't be blank"),
            Some(expiration) if expiration <= now => errors.add("expiration", "is in the past"),
            Some(_) => {}
        }

        match self.resources.load(&params.media_object_id).await? {
            None => errors.add("media_object", "not found"),
            Some(resource) => {
                if !creator.is_admin && !self.member_of_collection(&resource.collection_id, &creator.username).await? {
                    errors.add("media_object", "not found");
                }
            }
        }

        errors.into_result()?;
        let expiration = params.expiration.unwrap_or(now);

        let token_value = self.unique_token_value().await?;
        let (allow_streaming, allow_download) = params.mode.flags();

        let created = access_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            token: Set(token_value),
            media_object_id: Set(params.media_object_id),
            user_id: Set(creator.id),
            description: Set(params.description),
            expiration: Set(expiration),
            allow_streaming: Set(allow_streaming),
            allow_download: Set(allow_download),
            revoked: Set(false),
            expired: Set(expiration <= now),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        info!(
            token_id = %created.id,
            media_object_id = %created.media_object_id,
            mode = params.mode.as_str(),
            "Created access token"
        );

        self.sync_read_group(&created).await?;

        Ok(created)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<access_token::Model>, AccessError> {
        Ok(AccessToken::find_by_id(id).one(&self.db).await?)
    }

    pub async fn find_by_token(
        &self,
        token_value: &str,
    ) -> Result<Option<access_token::Model>, AccessError> {
        Ok(AccessToken::find()
            .filter(access_token::Column::Token.eq(token_value))
            .one(&self.db)
            .await?)
    }

    /// Apply authorized edits to a persisted token. Attempts to move the
    /// expiration are dropped with a warning; the record keeps its original
    /// window.
    pub async fn update(
        &self,
        id: Uuid,
        changes: TokenUpdate,
    ) -> Result<access_token::Model, AccessError> {
        let token = self.find(id).await?.ok_or(AccessError::TokenNotFound)?;
        let now = self.now();

        if let Some(requested) = changes.expiration {
            if requested != token.expiration {
                warn!(
                    token_id = %token.id,
                    "Ignoring attempt to change expiration on a persisted access token"
                );
            }
        }

        let mut active: access_token::ActiveModel = token.clone().into();
        if let Some(mode) = changes.mode {
            let (allow_streaming, allow_download) = mode.flags();
            active.allow_streaming = Set(allow_streaming);
            active.allow_download = Set(allow_download);
        }
        if let Some(description) = changes.description {
            active.description = Set(Some(description));
        }
        if let Some(revoked) = changes.revoked {
            active.revoked = Set(revoked);
        }
        // refresh the cached flag whenever the record is saved
        active.expired = Set(token.is_expired_at(now));
        active.updated_at = Set(now);

        let updated = active.update(&self.db).await?;
        if let Err(e) = self.sync_read_group(&updated).await {
            warn!(
                token_id = %updated.id,
                error = %e,
                "Read-group sync failed after update; the sweep will reconcile"
            );
        }

        Ok(updated)
    }

    /// Revoke a token. The revocation flag is persisted first — denial must
    /// stick even if the repository is unreachable — and the read-group
    /// entry is then removed immediately rather than waiting for the next
    /// sweep. A removal failure is retried by the sweep.
    pub async fn revoke(&self, id: Uuid) -> Result<access_token::Model, AccessError> {
        let token = self.find(id).await?.ok_or(AccessError::TokenNotFound)?;
        let now = self.now();

        let mut active: access_token::ActiveModel = token.into();
        active.revoked = Set(true);
        active.updated_at = Set(now);
        let updated = active.update(&self.db).await?;

        info!(token_id = %updated.id, "Revoked access token");

        if let Err(e) = self.sync_read_group(&updated).await {
            warn!(
                token_id = %updated.id,
                error = %e,
                "Read-group removal failed after revocation; the sweep will retry"
            );
        }

        Ok(updated)
    }

    /// Transition a token whose expiration has passed: remove the
    /// read-group entry, then set the cached flag. A token that is not yet
    /// expired is returned unchanged. The save here deliberately skips
    /// creation-time validation; a past expiration is the point of the
    /// transition.
    ///
    /// Removal runs before the flag is persisted: a failed removal leaves
    /// the token in the sweep's candidate set, so the grant is retried
    /// rather than assumed gone.
    pub async fn expire(
        &self,
        token: access_token::Model,
    ) -> Result<access_token::Model, AccessError> {
        let now = self.now();
        if !token.is_expired_at(now) {
            return Ok(token);
        }

        self.sync_read_group(&token).await?;

        if token.expired {
            return Ok(token);
        }

        let mut active: access_token::ActiveModel = token.into();
        active.expired = Set(true);
        active.updated_at = Set(now);
        let updated = active.update(&self.db).await?;

        debug!(token_id = %updated.id, "Expired access token");

        Ok(updated)
    }

    /// Whether the token currently permits streaming of the given object.
    pub fn token_allows_streaming(
        &self,
        token: &access_token::Model,
        media_object_id: &str,
    ) -> bool {
        token.allow_streaming
            && token.is_active_at(self.now())
            && token.media_object_id == media_object_id
    }

    /// Resolve a presented token value and check it against a media object.
    /// Blank and unknown values grant nothing.
    pub async fn allow_streaming_of(
        &self,
        token_value: Option<&str>,
        media_object_id: &str,
    ) -> Result<bool, AccessError> {
        let Some(token_value) = token_value.filter(|v| !v.is_empty()) else {
            return Ok(false);
        };

        match self.find_by_token(token_value).await? {
            Some(token) => Ok(self.token_allows_streaming(&token, media_object_id)),
            None => Ok(false),
        }
    }

    /// Whether the token is active right now.
    pub fn is_currently_active(&self, token: &access_token::Model) -> bool {
        token.is_active_at(self.now())
    }

    /// All tokens matching the status filter, ordered by expiration.
    pub async fn list(&self, status: TokenStatus) -> Result<Vec<access_token::Model>, AccessError> {
        let now = self.now();
        let query = AccessToken::find().order_by_asc(access_token::Column::Expiration);

        let query = match status {
            TokenStatus::Active => query.filter(
                Condition::all()
                    .add(access_token::Column::Revoked.eq(false))
                    .add(access_token::Column::Expired.eq(false))
                    .add(access_token::Column::Expiration.gt(now)),
            ),
            TokenStatus::Expired => query.filter(
                Condition::any()
                    .add(access_token::Column::Expired.eq(true))
                    .add(access_token::Column::Expiration.lte(now)),
            ),
            TokenStatus::Revoked => query.filter(access_token::Column::Revoked.eq(true)),
            TokenStatus::All => query,
        };

        Ok(query.all(&self.db).await?)
    }

    /// Tokens the viewer may see: everything for administrators, otherwise
    /// only tokens for collections the viewer edits. The store cannot join
    /// tokens to collection roles, so the narrowing happens here in memory.
    pub async fn list_visible_to(
        &self,
        status: TokenStatus,
        viewer: &Creator,
    ) -> Result<Vec<access_token::Model>, AccessError> {
        let tokens = self.list(status).await?;
        if viewer.is_admin {
            return Ok(tokens);
        }

        let mut visible = Vec::new();
        for token in tokens {
            match self.editable_by(&token, viewer).await {
                Ok(true) => visible.push(token),
                Ok(false) => {}
                Err(e) => warn!(
                    token_id = %token.id,
                    error = %e,
                    "Skipping token whose collection roles could not be resolved"
                ),
            }
        }
        Ok(visible)
    }

    /// Whether the viewer is an editor (or manager) of the collection that
    /// owns the token's media object.
    pub async fn editable_by(
        &self,
        token: &access_token::Model,
        viewer: &Creator,
    ) -> Result<bool, StoreError> {
        if viewer.is_admin {
            return Ok(true);
        }
        let Some(resource) = self.resources.load(&token.media_object_id).await? else {
            return Ok(false);
        };
        Ok(self
            .collections
            .roles(&resource.collection_id)
            .await?
            .map(|roles| roles.is_editor(&viewer.username))
            .unwrap_or(false))
    }

    /// Bring the resource's read-group list in line with the token's state:
    /// the token value is present while the token is active and absent once
    /// it is not. Membership is re-checked against a fresh read immediately
    /// before persisting, so repeated calls and concurrent sweeps converge
    /// without duplicating or stomping unrelated entries.
    pub async fn sync_read_group(&self, token: &access_token::Model) -> Result<(), StoreError> {
        let Some(mut resource) = self.resources.load(&token.media_object_id).await? else {
            warn!(
                media_object_id = %token.media_object_id,
                "Media object missing during read-group sync"
            );
            return Ok(());
        };

        let changed = if token.is_active_at(self.now()) {
            resource.read_groups.insert(token.token.clone())
        } else {
            resource.read_groups.remove(&token.token)
        };

        if changed {
            self.resources.save(&resource).await?;
            debug!(
                media_object_id = %resource.id,
                token_id = %token.id,
                "Synchronized read group"
            );
        }

        Ok(())
    }

    async fn member_of_collection(
        &self,
        collection_id: &str,
        username: &str,
    ) -> Result<bool, AccessError> {
        Ok(self
            .collections
            .roles(collection_id)
            .await?
            .map(|roles| roles.is_member(username))
            .unwrap_or(false))
    }

    async fn unique_token_value(&self) -> Result<String, AccessError> {
        // collisions on 12 random bytes are vanishingly rare; the retry
        // bound keeps a broken RNG from looping forever
        for _ in 0..5 {
            let candidate = TokenGenerator::generate();
            if self.find_by_token(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Err(AccessError::Database(sea_orm::DbErr::Custom(
            "could not generate a unique token value".to_string(),
        )))
    }
}
