use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Notifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Notifications::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Notifications::Kind)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::RecipientId)
                            .string()
                            .not_null(),
                    )
                    .col(string_null(Notifications::RecipientEmail))
                    .col(string_null(Notifications::RecipientPhone))
                    .col(string_null(Notifications::RecipientDevice))
                    .col(ColumnDef::new(Notifications::Title).string().not_null())
                    .col(text_null(Notifications::Body))
                    .col(json_null(Notifications::Data))
                    .col(text_null(Notifications::Html))
                    .col(string_null(Notifications::Template))
                    .col(
                        ColumnDef::new(Notifications::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(text_null(Notifications::ProviderResponse))
                    .col(
                        ColumnDef::new(Notifications::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(timestamp_with_time_zone_null(Notifications::SentAt))
                    .col(
                        ColumnDef::new(Notifications::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Notifications::MaxRetries)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(Notifications::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .to_owned(),
            )
            .await?;

        // Backs the oldest-first pending scan.
        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_status_created_at")
                    .table(Notifications::Table)
                    .col(Notifications::Status)
                    .col(Notifications::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_recipient")
                    .table(Notifications::Table)
                    .col(Notifications::RecipientId)
                    .to_owned(),
            )
            .await?;

        // Partial index for the retry sweep; the schema builder has no
        // partial-index support, so raw SQL it is.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS idx_notifications_retry \
                 ON notifications (status, retry_count, created_at) \
                 WHERE status = 'FAILED'",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Notifications::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Notifications {
    Table,
    Id,
    Kind,
    RecipientId,
    RecipientEmail,
    RecipientPhone,
    RecipientDevice,
    Title,
    Body,
    Data,
    Html,
    Template,
    Status,
    ProviderResponse,
    CreatedAt,
    SentAt,
    RetryCount,
    MaxRetries,
    Version,
}
