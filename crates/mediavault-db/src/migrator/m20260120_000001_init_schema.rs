//! Initial schema: users and access_tokens

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ============================================================
        // 1. Create users table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(uuid(User::Id).primary_key())
                    .col(string_len(User::Username, 255).not_null().unique_key())
                    .col(string_len(User::Email, 255).not_null().unique_key())
                    .col(string_len(User::PasswordHash, 255).not_null())
                    .col(boolean(User::IsAdmin).not_null().default(false))
                    .col(
                        timestamp_with_time_zone(User::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(User::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_username")
                    .table(User::Table)
                    .col(User::Username)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 2. Create access_tokens table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(AccessToken::Table)
                    .if_not_exists()
                    .col(uuid(AccessToken::Id).primary_key())
                    .col(
                        string_len(AccessToken::Token, 32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(string_len(AccessToken::MediaObjectId, 255).not_null())
                    .col(uuid(AccessToken::UserId).not_null())
                    .col(ColumnDef::new(AccessToken::Description).text())
                    .col(
                        timestamp_with_time_zone(AccessToken::Expiration)
                            .not_null(),
                    )
                    .col(
                        boolean(AccessToken::AllowStreaming)
                            .not_null()
                            .default(false),
                    )
                    .col(
                        boolean(AccessToken::AllowDownload)
                            .not_null()
                            .default(false),
                    )
                    .col(boolean(AccessToken::Revoked).not_null().default(false))
                    .col(boolean(AccessToken::Expired).not_null().default(false))
                    .col(
                        timestamp_with_time_zone(AccessToken::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(AccessToken::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_access_tokens_user_id")
                            .from(AccessToken::Table, AccessToken::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_access_tokens_token")
                    .table(AccessToken::Table)
                    .col(AccessToken::Token)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_access_tokens_media_object_id")
                    .table(AccessToken::Table)
                    .col(AccessToken::MediaObjectId)
                    .to_owned(),
            )
            .await?;

        // The sweep repeatedly queries "expired = false"
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_access_tokens_expired")
                    .table(AccessToken::Table)
                    .col(AccessToken::Expired)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AccessToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum User {
    #[sea_orm(iden = "users")]
    Table,
    Id,
    Username,
    Email,
    PasswordHash,
    IsAdmin,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AccessToken {
    #[sea_orm(iden = "access_tokens")]
    Table,
    Id,
    Token,
    MediaObjectId,
    UserId,
    Description,
    Expiration,
    AllowStreaming,
    AllowDownload,
    Revoked,
    Expired,
    CreatedAt,
    UpdatedAt,
}
