//! AccessToken entity: a scoped, time-bounded capability over one media object

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "access_tokens")]
pub struct Model {
    /// Access token UUID (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Opaque URL-safe token value; generated once at creation, never changed
    #[sea_orm(unique)]
    pub token: String,

    /// Identifier of the protected media object in the repository
    pub media_object_id: String,

    /// User who created and owns this token
    pub user_id: Uuid,

    /// Free-text note about who the token was issued for
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// When the token expires; immutable once the record is persisted
    pub expiration: ChronoDateTimeUtc,

    /// Whether the token grants streaming access
    pub allow_streaming: bool,

    /// Whether the token grants download access
    pub allow_download: bool,

    /// Whether the token has been revoked by an authorized actor
    pub revoked: bool,

    /// Cached expiry flag, recomputed at save time and by the cleanup sweep
    pub expired: bool,

    /// When the token was created
    pub created_at: ChronoDateTimeUtc,

    /// When the token was last updated
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Access token belongs to a user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the token counts as expired at `now`.
    ///
    /// True if the expiration timestamp has passed, or if the cached flag was
    /// already set by a previous save or sweep.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expired || self.expiration <= now
    }

    /// Whether the token is active at `now`: not expired and not revoked.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired_at(now) && !self.revoked
    }
}
