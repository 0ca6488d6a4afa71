//! Repository port for notification persistence.

use async_trait::async_trait;

use crate::error::NotificationResult;
use crate::models::{Notification, NotificationStatus};

/// Durable store for notification aggregates.
///
/// Every mutator follows the same optimistic-concurrency protocol: the write
/// is conditioned on the stored version, and zero affected rows surfaces as
/// [`NotificationError::Conflict`](crate::NotificationError::Conflict). A
/// missing id is [`NotificationError::NotFound`](crate::NotificationError::NotFound);
/// callers must not treat the two alike, only a conflict warrants a reload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Upsert keyed by id. On an existing row, mutable fields are written
    /// only when the stored version is `notification.version - 1`.
    async fn save(&self, notification: &Notification) -> NotificationResult<()>;

    async fn find_by_id(&self, id: &str) -> NotificationResult<Notification>;

    /// Notifications still eligible for a send attempt: status Pending or
    /// Failed with retry budget left, oldest first, at most `limit` rows.
    async fn find_pending(&self, limit: u64) -> NotificationResult<Vec<Notification>>;

    /// Narrow mutator: status and provider response only. Stamps `sent_at`
    /// when the new status is `Sent`.
    async fn update_status(
        &self,
        id: &str,
        status: NotificationStatus,
        provider_response: &str,
    ) -> NotificationResult<()>;

    /// Narrow mutator: retry counter only.
    async fn increment_retry_count(&self, id: &str) -> NotificationResult<()>;
}
