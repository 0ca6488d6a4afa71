//! Repository tests against an in-memory SQLite database with real
//! migrations, exercising the optimistic-concurrency protocol end to end.

use chrono::{Duration as ChronoDuration, Utc};
use database::sqlite;
use domain_notifications::{
    Content, Notification, NotificationError, NotificationKind, NotificationRepository,
    NotificationStatus, Recipient, SqliteNotificationRepository,
};
use migration::Migrator;

async fn repository() -> SqliteNotificationRepository {
    let db = sqlite::connect_in_memory().await.unwrap();
    sqlite::run_migrations::<Migrator>(&db).await.unwrap();
    SqliteNotificationRepository::new(db)
}

fn notification(id: &str) -> Notification {
    let recipient = Recipient::new(
        "user-1",
        Some("user@example.com".to_string()),
        Some("+15550100".to_string()),
        None,
    )
    .unwrap();
    let content = Content::new(
        "Order shipped",
        Some("Your order is on its way".to_string()),
        Some(serde_json::json!({"order_id": "o-7"})),
        None,
        None,
    )
    .unwrap();
    Notification::new(id, NotificationKind::Email, recipient, content, 3).unwrap()
}

#[tokio::test]
async fn save_and_find_round_trip() {
    let repo = repository().await;
    let n = notification("n-1");

    repo.save(&n).await.unwrap();
    let loaded = repo.find_by_id("n-1").await.unwrap();

    assert_eq!(loaded.id, n.id);
    assert_eq!(loaded.kind, NotificationKind::Email);
    assert_eq!(loaded.status, NotificationStatus::Pending);
    assert_eq!(loaded.version, 1);
    assert_eq!(loaded.recipient.email.as_deref(), Some("user@example.com"));
    assert_eq!(loaded.content.title, "Order shipped");
    assert_eq!(
        loaded.content.data,
        Some(serde_json::json!({"order_id": "o-7"}))
    );
    assert!(loaded.sent_at.is_none());
}

#[tokio::test]
async fn find_missing_id_is_not_found() {
    let repo = repository().await;

    let err = repo.find_by_id("ghost").await.unwrap_err();
    assert!(matches!(err, NotificationError::NotFound(_)));
}

#[tokio::test]
async fn duplicate_create_is_a_conflict_not_a_second_row() {
    let repo = repository().await;
    let n = notification("n-1");

    repo.save(&n).await.unwrap();

    // Same event processed again: a fresh version-1 aggregate with the same
    // id. The conditional update matches nothing, so the stored row wins.
    let duplicate = notification("n-1");
    let err = repo.save(&duplicate).await.unwrap_err();
    assert!(matches!(err, NotificationError::Conflict(_)));

    let loaded = repo.find_by_id("n-1").await.unwrap();
    assert_eq!(loaded.version, 1);
}

#[tokio::test]
async fn save_persists_state_machine_transitions() {
    let repo = repository().await;
    let mut n = notification("n-1");
    repo.save(&n).await.unwrap();

    n.mark_as_sent("accepted by relay").unwrap();
    repo.save(&n).await.unwrap();

    let loaded = repo.find_by_id("n-1").await.unwrap();
    assert_eq!(loaded.status, NotificationStatus::Sent);
    assert_eq!(loaded.version, 2);
    assert!(loaded.sent_at.is_some());
    assert_eq!(loaded.provider_response.as_deref(), Some("accepted by relay"));
}

#[tokio::test]
async fn concurrent_saves_from_same_version_let_exactly_one_win() {
    let repo = repository().await;
    let n = notification("n-1");
    repo.save(&n).await.unwrap();

    // Two workers load the same version...
    let mut first = repo.find_by_id("n-1").await.unwrap();
    let mut second = repo.find_by_id("n-1").await.unwrap();
    assert_eq!(first.version, second.version);

    // ...and both try to commit a mutation.
    first.mark_as_sent("winner").unwrap();
    second.mark_as_failed("loser");

    repo.save(&first).await.unwrap();
    let err = repo.save(&second).await.unwrap_err();
    assert!(matches!(err, NotificationError::Conflict(_)));

    // No silent overwrite: the winner's state is intact.
    let loaded = repo.find_by_id("n-1").await.unwrap();
    assert_eq!(loaded.status, NotificationStatus::Sent);
    assert_eq!(loaded.provider_response.as_deref(), Some("winner"));
    assert_eq!(loaded.version, 2);
}

#[tokio::test]
async fn find_pending_is_oldest_first_and_bounded() {
    let repo = repository().await;
    let now = Utc::now();

    // Three eligible records created out of order, plus one already sent,
    // one failed-and-exhausted.
    let mut newest = notification("n-newest");
    newest.created_at = now;
    repo.save(&newest).await.unwrap();

    let mut oldest = notification("n-oldest");
    oldest.created_at = now - ChronoDuration::seconds(30);
    repo.save(&oldest).await.unwrap();

    let mut middle = notification("n-middle");
    middle.created_at = now - ChronoDuration::seconds(10);
    middle.mark_as_failed("first attempt failed");
    repo.save(&middle).await.unwrap();

    let mut sent = notification("n-sent");
    sent.created_at = now - ChronoDuration::seconds(60);
    sent.mark_as_sent("done").unwrap();
    repo.save(&sent).await.unwrap();

    let mut exhausted = notification("n-exhausted");
    exhausted.created_at = now - ChronoDuration::seconds(90);
    exhausted.mark_as_failed("1");
    exhausted.mark_as_failed("2");
    exhausted.mark_as_failed("3");
    repo.save(&exhausted).await.unwrap();

    let pending = repo.find_pending(10).await.unwrap();
    let ids: Vec<&str> = pending.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["n-oldest", "n-middle", "n-newest"]);

    let limited = repo.find_pending(2).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].id, "n-oldest");
    assert_eq!(limited[1].id, "n-middle");
}

#[tokio::test]
async fn find_pending_excludes_only_exhausted_failures() {
    let repo = repository().await;

    let mut retryable = notification("n-retryable");
    retryable.mark_as_failed("once");
    repo.save(&retryable).await.unwrap();

    let mut spent = notification("n-spent");
    spent.max_retries = 1;
    spent.mark_as_failed("once");
    repo.save(&spent).await.unwrap();

    let pending = repo.find_pending(10).await.unwrap();
    let ids: Vec<&str> = pending.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["n-retryable"]);
}

#[tokio::test]
async fn update_status_stamps_sent_at_only_for_sent() {
    let repo = repository().await;
    let n = notification("n-1");
    repo.save(&n).await.unwrap();

    repo.update_status("n-1", NotificationStatus::Failed, "smtp timeout")
        .await
        .unwrap();
    let loaded = repo.find_by_id("n-1").await.unwrap();
    assert_eq!(loaded.status, NotificationStatus::Failed);
    assert_eq!(loaded.provider_response.as_deref(), Some("smtp timeout"));
    assert_eq!(loaded.version, 2);
    assert!(loaded.sent_at.is_none());

    repo.update_status("n-1", NotificationStatus::Sent, "second try worked")
        .await
        .unwrap();
    let loaded = repo.find_by_id("n-1").await.unwrap();
    assert_eq!(loaded.status, NotificationStatus::Sent);
    assert_eq!(loaded.version, 3);
    assert!(loaded.sent_at.is_some());
}

#[tokio::test]
async fn update_status_on_missing_id_is_not_found() {
    let repo = repository().await;

    let err = repo
        .update_status("ghost", NotificationStatus::Sent, "")
        .await
        .unwrap_err();
    assert!(matches!(err, NotificationError::NotFound(_)));
}

#[tokio::test]
async fn increment_retry_count_bumps_version() {
    let repo = repository().await;
    let n = notification("n-1");
    repo.save(&n).await.unwrap();

    repo.increment_retry_count("n-1").await.unwrap();
    repo.increment_retry_count("n-1").await.unwrap();

    let loaded = repo.find_by_id("n-1").await.unwrap();
    assert_eq!(loaded.retry_count, 2);
    assert_eq!(loaded.version, 3);

    let err = repo.increment_retry_count("ghost").await.unwrap_err();
    assert!(matches!(err, NotificationError::NotFound(_)));
}

#[tokio::test]
async fn stale_in_memory_copy_cannot_clobber_newer_row() {
    let repo = repository().await;
    let n = notification("n-1");
    repo.save(&n).await.unwrap();

    let mut stale = repo.find_by_id("n-1").await.unwrap();

    // Another path moves the row forward.
    repo.update_status("n-1", NotificationStatus::Failed, "relay 502")
        .await
        .unwrap();

    stale.mark_as_sent("from stale copy").unwrap();
    let err = repo.save(&stale).await.unwrap_err();
    assert!(matches!(err, NotificationError::Conflict(_)));

    let loaded = repo.find_by_id("n-1").await.unwrap();
    assert_eq!(loaded.status, NotificationStatus::Failed);
}
