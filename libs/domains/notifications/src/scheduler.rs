//! Retry scheduler: periodic sweep over retry-eligible notifications.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::error::NotificationResult;
use crate::repository::NotificationRepository;
use crate::service::NotificationService;

/// Configuration for the retry scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Seconds between sweeps.
    pub interval_secs: u64,
    /// Max records fetched per sweep.
    pub batch_size: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: std::env::var("RETRY_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            batch_size: std::env::var("RETRY_BATCH_SIZE")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
        }
    }
}

/// Periodic driver for `retry_failed_notifications`.
///
/// One sweep call is in flight at a time: the tick is awaited inline, so a
/// slow sweep delays the next tick instead of overlapping it. The delayed
/// sends a sweep spawns are independent of the tick loop and are not drained
/// on shutdown.
pub struct RetryScheduler<R: NotificationRepository> {
    service: NotificationService<R>,
    config: SchedulerConfig,
}

impl<R: NotificationRepository + 'static> RetryScheduler<R> {
    pub fn new(service: NotificationService<R>, config: SchedulerConfig) -> Self {
        Self { service, config }
    }

    /// Run until the shutdown signal fires. Sweep errors are logged and the
    /// loop keeps ticking; the next sweep naturally retries.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> NotificationResult<()> {
        info!(
            interval_secs = self.config.interval_secs,
            batch_size = self.config.batch_size,
            "Starting retry scheduler"
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(err) = self
                        .service
                        .retry_failed_notifications(self.config.batch_size)
                        .await
                    {
                        error!(error = %err, "Retry sweep failed");
                    }
                }
            }
        }

        info!("Retry scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockNotificationRepository;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.interval_secs, 30);
        assert_eq!(config.batch_size, 50);
    }

    #[tokio::test]
    async fn scheduler_sweeps_until_shutdown() {
        let sweeps = Arc::new(AtomicU32::new(0));
        let sweeps_in_mock = Arc::clone(&sweeps);

        let mut repo = MockNotificationRepository::new();
        repo.expect_find_pending().returning(move |_| {
            sweeps_in_mock.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        });

        let service = NotificationService::new(repo, vec![]);
        let scheduler = RetryScheduler::new(
            service,
            SchedulerConfig {
                interval_secs: 1,
                batch_size: 10,
            },
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert!(sweeps.load(Ordering::SeqCst) >= 1);
    }
}
