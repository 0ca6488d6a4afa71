//! Notification service: create → persist → send → update-or-retry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{NotificationError, NotificationResult};
use crate::models::{Content, Notification, NotificationKind, Recipient};
use crate::providers::NotificationProvider;
use crate::repository::NotificationRepository;

/// Base delay of the retry backoff curve.
const BACKOFF_BASE: Duration = Duration::from_secs(5);

/// Orchestrates the notification lifecycle against one repository and an
/// ordered provider list.
///
/// The provider list is fixed at construction; there is no runtime
/// registration. Cloning is cheap (everything is behind `Arc`), which is how
/// the service travels into spawned send tasks.
pub struct NotificationService<R: NotificationRepository> {
    repo: Arc<R>,
    providers: Arc<Vec<Arc<dyn NotificationProvider>>>,
    backoff_base: Duration,
}

impl<R: NotificationRepository> Clone for NotificationService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            providers: Arc::clone(&self.providers),
            backoff_base: self.backoff_base,
        }
    }
}

impl<R: NotificationRepository + 'static> NotificationService<R> {
    pub fn new(repo: R, providers: Vec<Arc<dyn NotificationProvider>>) -> Self {
        Self {
            repo: Arc::new(repo),
            providers: Arc::new(providers),
            backoff_base: BACKOFF_BASE,
        }
    }

    /// Override the backoff base. Tests use this to shrink delays to
    /// milliseconds.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Record an inbound notification request and kick off delivery.
    ///
    /// Returns once the record is durable; the first send attempt runs as a
    /// detached task and its outcome does not affect this call. A version
    /// conflict on the initial save means this event id was already
    /// processed; the call is then a successful no-op, which is what makes
    /// redelivered events harmless.
    pub async fn process_notification(
        &self,
        id: impl Into<String>,
        kind: NotificationKind,
        recipient: Recipient,
        content: Content,
        max_retries: i32,
    ) -> NotificationResult<()> {
        let notification = Notification::new(id, kind, recipient, content, max_retries)?;

        match self.repo.save(&notification).await {
            Ok(()) => {}
            Err(NotificationError::Conflict(_)) => {
                debug!(id = %notification.id, "Notification already recorded, skipping");
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        info!(
            id = %notification.id,
            kind = %notification.kind,
            recipient = %notification.recipient.id,
            "Notification recorded"
        );

        let service = self.clone();
        let id = notification.id;
        tokio::spawn(async move {
            if let Err(err) = service.send_notification(&id).await {
                error!(id = %id, error = %err, "Initial send attempt failed");
            }
        });

        Ok(())
    }

    /// Attempt one delivery of the given notification.
    ///
    /// The aggregate is always reloaded first; the in-memory copy a caller
    /// might hold could be stale by the time the task runs.
    pub async fn send_notification(&self, id: &str) -> NotificationResult<()> {
        let mut notification = self.repo.find_by_id(id).await?;

        if !notification.can_be_sent() {
            return Err(NotificationError::NotEligible(notification.id));
        }

        let provider = self
            .provider_for(notification.kind)
            .ok_or(NotificationError::NoProvider(notification.kind))?;

        match provider.send(&notification).await {
            Ok(response) => {
                notification.mark_as_sent(response)?;
                // The channel send already happened; if this save fails the
                // caller has to know the audit trail may be stale.
                self.repo.save(&notification).await?;

                info!(
                    id = %notification.id,
                    provider = provider.name(),
                    "Notification sent"
                );
                Ok(())
            }
            Err(err) => {
                notification.mark_as_failed(err.to_string());
                // A failed save here is not escalated: the row is still
                // Failed (or Pending) in storage, so the next retry sweep
                // picks it up again regardless.
                if let Err(save_err) = self.repo.save(&notification).await {
                    warn!(
                        id = %notification.id,
                        error = %save_err,
                        "Failed to record delivery failure"
                    );
                }
                Err(err)
            }
        }
    }

    /// One retry sweep: schedule a delayed re-send for every eligible record.
    ///
    /// Each retry runs as its own task after its backoff delay; one failing
    /// does not affect its siblings, and the sweep itself returns without
    /// waiting for any of them.
    pub async fn retry_failed_notifications(&self, batch_size: u64) -> NotificationResult<()> {
        let pending = self.repo.find_pending(batch_size).await?;
        if pending.is_empty() {
            return Ok(());
        }

        info!(count = pending.len(), "Scheduling notification retries");

        for notification in pending {
            let delay = self.backoff_delay(notification.retry_count);
            let service = self.clone();

            debug!(
                id = %notification.id,
                retry_count = notification.retry_count,
                delay_secs = delay.as_secs_f64(),
                "Scheduling retry"
            );

            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(err) = service.send_notification(&notification.id).await {
                    warn!(id = %notification.id, error = %err, "Retry attempt failed");
                }
            });
        }

        Ok(())
    }

    /// Read a notification without touching its state. Used by the audit
    /// and facade read paths.
    pub async fn find_notification(&self, id: &str) -> NotificationResult<Notification> {
        self.repo.find_by_id(id).await
    }

    /// Direct access to the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Backoff before the next attempt: base * 2^retry_count.
    /// 5s, 10s, 20s, 40s, ... with no upper bound.
    pub fn backoff_delay(&self, retry_count: i32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(retry_count.max(0) as u32)
    }

    /// First registered provider claiming the kind; registration order is
    /// part of the contract.
    pub fn provider_for(&self, kind: NotificationKind) -> Option<&Arc<dyn NotificationProvider>> {
        self.providers.iter().find(|p| p.supports(kind))
    }
}
