//! SQLite-backed notification repository.
//!
//! All conditional writes share one shape: read the current version, write
//! with `WHERE version = ?`, and treat zero affected rows as a conflict.
//! That keeps multiple service instances safe against lost updates without
//! any in-process locking.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, ExprTrait, QueryFilter, QueryOrder, QuerySelect,
};
use tracing::debug;

use crate::entity;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{Notification, NotificationStatus};
use crate::repository::NotificationRepository;

pub struct SqliteNotificationRepository {
    db: DatabaseConnection,
}

impl SqliteNotificationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn current_version(&self, id: &str) -> NotificationResult<i32> {
        let model = entity::Entity::find_by_id(id.to_owned())
            .one(&self.db)
            .await?
            .ok_or_else(|| NotificationError::NotFound(id.to_string()))?;

        Ok(model.version)
    }
}

#[async_trait]
impl NotificationRepository for SqliteNotificationRepository {
    async fn save(&self, notification: &Notification) -> NotificationResult<()> {
        let active: entity::ActiveModel = notification.into();

        // Immutable fields (recipient, content, created_at) are left alone on
        // conflict; only delivery state moves. The version guard makes the
        // update vanish when another writer got there first.
        let on_conflict = OnConflict::column(entity::Column::Id)
            .update_columns([
                entity::Column::Status,
                entity::Column::ProviderResponse,
                entity::Column::SentAt,
                entity::Column::RetryCount,
                entity::Column::Version,
            ])
            .action_and_where(Expr::col(entity::Column::Version).eq(notification.version - 1))
            .to_owned();

        let rows = entity::Entity::insert(active)
            .on_conflict(on_conflict)
            .exec_without_returning(&self.db)
            .await?;

        if rows == 0 {
            return Err(NotificationError::Conflict(notification.id.clone()));
        }

        debug!(
            id = %notification.id,
            status = %notification.status,
            version = notification.version,
            "Saved notification"
        );
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> NotificationResult<Notification> {
        entity::Entity::find_by_id(id.to_owned())
            .one(&self.db)
            .await?
            .ok_or_else(|| NotificationError::NotFound(id.to_string()))?
            .try_into()
    }

    async fn find_pending(&self, limit: u64) -> NotificationResult<Vec<Notification>> {
        let models = entity::Entity::find()
            .filter(entity::Column::Status.is_in([
                NotificationStatus::Pending.to_string(),
                NotificationStatus::Failed.to_string(),
            ]))
            .filter(
                Expr::col(entity::Column::RetryCount).lt(Expr::col(entity::Column::MaxRetries)),
            )
            .order_by_asc(entity::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?;

        models.into_iter().map(Notification::try_from).collect()
    }

    async fn update_status(
        &self,
        id: &str,
        status: NotificationStatus,
        provider_response: &str,
    ) -> NotificationResult<()> {
        let current = self.current_version(id).await?;

        let mut update = entity::Entity::update_many()
            .col_expr(entity::Column::Status, Expr::value(status.to_string()))
            .col_expr(
                entity::Column::ProviderResponse,
                Expr::value(provider_response),
            )
            .col_expr(
                entity::Column::Version,
                Expr::col(entity::Column::Version).add(1),
            );

        if status == NotificationStatus::Sent {
            update = update.col_expr(entity::Column::SentAt, Expr::value(Utc::now()));
        }

        let result = update
            .filter(entity::Column::Id.eq(id))
            .filter(entity::Column::Version.eq(current))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(NotificationError::Conflict(id.to_string()));
        }

        Ok(())
    }

    async fn increment_retry_count(&self, id: &str) -> NotificationResult<()> {
        let current = self.current_version(id).await?;

        let result = entity::Entity::update_many()
            .col_expr(
                entity::Column::RetryCount,
                Expr::col(entity::Column::RetryCount).add(1),
            )
            .col_expr(
                entity::Column::Version,
                Expr::col(entity::Column::Version).add(1),
            )
            .filter(entity::Column::Id.eq(id))
            .filter(entity::Column::Version.eq(current))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(NotificationError::Conflict(id.to_string()));
        }

        Ok(())
    }
}
