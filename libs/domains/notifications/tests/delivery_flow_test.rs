//! End-to-end delivery flows: service + real SQLite repository + stub
//! providers, covering the happy path, failure + retry, and eligibility.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use database::sqlite;
use domain_notifications::{
    Content, Notification, NotificationError, NotificationKind, NotificationProvider,
    NotificationRepository, NotificationResult, NotificationService, NotificationStatus,
    Recipient, SqliteNotificationRepository,
};
use migration::Migrator;

struct RecordingProvider {
    sends: AtomicU32,
    fail_first: AtomicBool,
}

impl RecordingProvider {
    fn reliable() -> Arc<Self> {
        Arc::new(Self {
            sends: AtomicU32::new(0),
            fail_first: AtomicBool::new(false),
        })
    }

    /// Fails the first send, succeeds afterwards.
    fn flaky() -> Arc<Self> {
        Arc::new(Self {
            sends: AtomicU32::new(0),
            fail_first: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl NotificationProvider for RecordingProvider {
    async fn send(&self, _notification: &Notification) -> NotificationResult<String> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail_first.swap(false, Ordering::SeqCst) {
            Err(NotificationError::Provider("relay unavailable".to_string()))
        } else {
            Ok("accepted".to_string())
        }
    }

    fn supports(&self, kind: NotificationKind) -> bool {
        kind == NotificationKind::Email
    }

    fn name(&self) -> &'static str {
        "recording-email"
    }
}

async fn repository() -> SqliteNotificationRepository {
    let db = sqlite::connect_in_memory().await.unwrap();
    sqlite::run_migrations::<Migrator>(&db).await.unwrap();
    SqliteNotificationRepository::new(db)
}

fn email_request() -> (Recipient, Content) {
    let recipient =
        Recipient::new("user-1", Some("user@example.com".to_string()), None, None).unwrap();
    let content = Content::new(
        "Your ticket",
        Some("See you there".to_string()),
        None,
        None,
        None,
    )
    .unwrap();
    (recipient, content)
}

/// Poll until the stored notification satisfies `predicate` or time runs out.
async fn wait_for_status(
    service: &NotificationService<SqliteNotificationRepository>,
    id: &str,
    predicate: impl Fn(&Notification) -> bool,
) -> Notification {
    for _ in 0..200 {
        if let Ok(n) = service.find_notification(id).await {
            if predicate(&n) {
                return n;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("notification {id} never reached the expected state");
}

#[tokio::test]
async fn email_request_is_recorded_then_sent() {
    let repo = repository().await;
    let provider = RecordingProvider::reliable();
    let service = NotificationService::new(repo, vec![provider.clone() as Arc<dyn NotificationProvider>]);

    let (recipient, content) = email_request();
    service
        .process_notification("evt-1", NotificationKind::Email, recipient, content, 3)
        .await
        .unwrap();

    // Durability before delivery: the row exists even before the detached
    // send lands.
    let recorded = service.find_notification("evt-1").await.unwrap();
    assert!(matches!(
        recorded.status,
        NotificationStatus::Pending | NotificationStatus::Sent
    ));

    let sent = wait_for_status(&service, "evt-1", |n| {
        n.status == NotificationStatus::Sent
    })
    .await;

    assert_eq!(sent.version, 2);
    assert_eq!(sent.retry_count, 0);
    assert!(sent.sent_at.is_some());
    assert_eq!(sent.provider_response.as_deref(), Some("accepted"));
    assert_eq!(provider.sends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_send_is_recorded_and_retried_to_success() {
    let repo = repository().await;
    let provider = RecordingProvider::flaky();
    let service = NotificationService::new(
        repo,
        vec![provider.clone() as Arc<dyn NotificationProvider>],
    )
    .with_backoff_base(Duration::from_millis(5));

    let (recipient, content) = email_request();
    service
        .process_notification("evt-1", NotificationKind::Email, recipient, content, 3)
        .await
        .unwrap();

    // First attempt fails against the flaky provider.
    let failed = wait_for_status(&service, "evt-1", |n| {
        n.status == NotificationStatus::Failed
    })
    .await;
    assert_eq!(failed.retry_count, 1);
    assert_eq!(failed.version, 2);
    assert_eq!(failed.provider_response.as_deref(), Some("provider error: relay unavailable"));

    // A retry sweep re-drives it with backoff; the second attempt succeeds.
    service.retry_failed_notifications(10).await.unwrap();

    let sent = wait_for_status(&service, "evt-1", |n| {
        n.status == NotificationStatus::Sent
    })
    .await;
    assert_eq!(sent.retry_count, 1, "retry count is never reset");
    assert_eq!(sent.version, 3);
    assert!(sent.sent_at.is_some());
    assert_eq!(provider.sends.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn duplicate_event_does_not_create_second_record_or_send() {
    let repo = repository().await;
    let provider = RecordingProvider::reliable();
    let service = NotificationService::new(
        repo,
        vec![provider.clone() as Arc<dyn NotificationProvider>],
    );

    let (recipient, content) = email_request();
    service
        .process_notification(
            "evt-1",
            NotificationKind::Email,
            recipient.clone(),
            content.clone(),
            3,
        )
        .await
        .unwrap();

    wait_for_status(&service, "evt-1", |n| n.status == NotificationStatus::Sent).await;

    // Redelivery of the same event id: no error, no new record, no second
    // delivery.
    service
        .process_notification("evt-1", NotificationKind::Email, recipient, content, 3)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let n = service.find_notification("evt-1").await.unwrap();
    assert_eq!(n.version, 2);
    assert_eq!(provider.sends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_notification_is_terminal_but_queryable() {
    let repo = repository().await;
    let provider = RecordingProvider::reliable();
    let service = NotificationService::new(
        repo,
        vec![provider as Arc<dyn NotificationProvider>],
    );

    let (recipient, content) = email_request();
    let mut n = Notification::new("evt-1", NotificationKind::Email, recipient, content, 2).unwrap();
    n.mark_as_failed("attempt 1");
    n.mark_as_failed("attempt 2");
    assert!(!n.can_be_sent());

    service_save(&service, &n).await;

    // The exhausted record never shows up in a sweep...
    service.retry_failed_notifications(10).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    // ...a direct send is refused...
    let err = service.send_notification("evt-1").await.unwrap_err();
    assert!(matches!(err, NotificationError::NotEligible(_)));

    // ...and it stays visible for audit.
    let loaded = service.find_notification("evt-1").await.unwrap();
    assert_eq!(loaded.status, NotificationStatus::Failed);
    assert_eq!(loaded.retry_count, 2);
}

async fn service_save(
    service: &NotificationService<SqliteNotificationRepository>,
    n: &Notification,
) {
    service.repository().save(n).await.unwrap();
}
