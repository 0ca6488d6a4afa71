//! Event consumer: pulls `notification.requested` events off the stream and
//! feeds them through the notification service.
//!
//! Consumption is at-least-once: an entry is acked only after the handler
//! succeeds. Entries that fail on a transient error stay pending and are
//! redelivered after a restart; entries that can never succeed are logged
//! and acked. Processing the same event twice is safe because the event id
//! doubles as the notification id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::contacts::ContactInfoSource;
use crate::error::{NotificationError, NotificationResult};
use crate::events::EventEnvelope;
use crate::models::{Content, NotificationKind, Recipient, DEFAULT_MAX_RETRIES};
use crate::repository::NotificationRepository;
use crate::service::NotificationService;

/// Field under which the event JSON is stored in each stream entry.
const EVENT_FIELD: &str = "event";

/// Configuration for the event consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Stream carrying notification-request events.
    pub stream_name: String,
    /// Consumer group name.
    pub consumer_group: String,
    /// This instance's consumer id within the group.
    pub consumer_id: String,
    /// Max entries fetched per read.
    pub batch_size: usize,
    /// Delay between polls when the stream is quiet.
    pub poll_interval_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            stream_name: std::env::var("EVENT_STREAM_NAME")
                .unwrap_or_else(|_| "notifications:requested".to_string()),
            consumer_group: std::env::var("EVENT_CONSUMER_GROUP")
                .unwrap_or_else(|_| "notification-service".to_string()),
            consumer_id: std::env::var("EVENT_CONSUMER_ID")
                .unwrap_or_else(|_| format!("consumer-{}", Uuid::new_v4())),
            batch_size: 10,
            poll_interval_ms: std::env::var("EVENT_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
        }
    }
}

/// Turns a raw event into a `process_notification` call.
///
/// Separate from the stream plumbing so the translation logic is testable
/// without Redis.
pub struct EventHandler<R: NotificationRepository> {
    service: NotificationService<R>,
    contacts: Arc<dyn ContactInfoSource>,
}

impl<R: NotificationRepository + 'static> EventHandler<R> {
    pub fn new(service: NotificationService<R>, contacts: Arc<dyn ContactInfoSource>) -> Self {
        Self { service, contacts }
    }

    /// Validate, resolve the recipient, and hand the request to the service.
    ///
    /// Errors for which `is_rejection()` holds mean the event itself is bad;
    /// anything else is worth a redelivery.
    pub async fn handle(&self, raw: &str) -> NotificationResult<()> {
        let envelope: EventEnvelope = serde_json::from_str(raw).map_err(|e| {
            NotificationError::Validation(format!("malformed event envelope: {e}"))
        })?;
        envelope.validate()?;

        let payload = envelope.notification_request()?;

        debug!(
            event_id = %envelope.event_id,
            channel = %payload.channel,
            user_id = %payload.user_id,
            "Handling notification request"
        );

        let kind: NotificationKind = payload.channel.parse().map_err(|_| {
            NotificationError::Validation(format!("unknown channel: {}", payload.channel))
        })?;

        let contact = self.contacts.contact_info(&payload.user_id).await?;

        let recipient = Recipient::new(
            payload.user_id,
            Some(contact.email),
            contact.phone,
            contact.device_id,
        )?;
        let content = Content::new(
            payload.subject,
            payload.message,
            payload.data,
            payload.html,
            payload.template,
        )?;

        self.service
            .process_notification(envelope.event_id, kind, recipient, content, DEFAULT_MAX_RETRIES)
            .await
    }
}

/// Consumer-group pull loop against the event stream.
pub struct EventConsumer<R: NotificationRepository> {
    redis: Arc<ConnectionManager>,
    handler: EventHandler<R>,
    config: ConsumerConfig,
}

impl<R: NotificationRepository + 'static> EventConsumer<R> {
    pub fn new(redis: ConnectionManager, handler: EventHandler<R>, config: ConsumerConfig) -> Self {
        Self {
            redis: Arc::new(redis),
            handler,
            config,
        }
    }

    /// Run until the shutdown signal fires.
    ///
    /// Fetch errors back off exponentially (capped at 30s) and never kill
    /// the loop; a vanished consumer group is recreated on the fly.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> NotificationResult<()> {
        info!(
            stream = %self.config.stream_name,
            group = %self.config.consumer_group,
            consumer_id = %self.config.consumer_id,
            "Starting event consumer"
        );

        self.ensure_consumer_group().await?;

        // Unacked entries from any previous consumer instance (this one or a
        // crashed sibling with a different consumer id) are claimed first,
        // then drained as our own pending backlog.
        if let Err(e) = self.claim_abandoned_entries().await {
            warn!(error = %e, "Failed to claim abandoned entries");
        }
        if let Err(e) = self.process_backlog().await {
            warn!(error = %e, "Failed to drain pending backlog");
        }

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut consecutive_errors: u32 = 0;
        const MAX_BACKOFF_SECS: u64 = 30;

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping consumer");
                break;
            }

            match self.poll_new_entries().await {
                Ok(()) => {
                    if consecutive_errors > 0 {
                        info!(
                            errors = consecutive_errors,
                            "Event stream recovered after errors"
                        );
                        consecutive_errors = 0;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    let err_str = e.to_string();

                    if err_str.contains("NOGROUP") {
                        warn!("Consumer group missing, recreating");
                        if let Err(create_err) = self.ensure_consumer_group().await {
                            error!(error = %create_err, "Failed to recreate consumer group");
                        }
                    } else {
                        let backoff_secs =
                            2u64.pow(consecutive_errors.min(5)).min(MAX_BACKOFF_SECS);
                        warn!(
                            error = %e,
                            consecutive_errors = consecutive_errors,
                            backoff_secs = backoff_secs,
                            "Event fetch failed, backing off"
                        );
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    }
                    continue;
                }
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Received shutdown signal, stopping consumer");
                        break;
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!("Event consumer stopped");
        Ok(())
    }

    /// Create the consumer group if it does not exist yet.
    async fn ensure_consumer_group(&self) -> NotificationResult<()> {
        let mut conn = (*self.redis).clone();

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                info!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(NotificationError::Queue(e.to_string())),
        }
    }

    /// Take over every pending entry in the group, whoever it was delivered
    /// to. Runs once at startup, with min-idle-time 0, so nothing survives a
    /// fleet of crashed consumer ids.
    async fn claim_abandoned_entries(&self) -> NotificationResult<()> {
        let mut conn = (*self.redis).clone();
        let mut total_claimed = 0usize;
        let mut cursor = "0-0".to_string();

        loop {
            // XAUTOCLAIM reply: [next-cursor, [[entry-id, fields], ...], ...]
            let result: redis::Value = redis::cmd("XAUTOCLAIM")
                .arg(&self.config.stream_name)
                .arg(&self.config.consumer_group)
                .arg(&self.config.consumer_id)
                .arg(0)
                .arg(&cursor)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| NotificationError::Queue(e.to_string()))?;

            let redis::Value::Array(parts) = &result else {
                break;
            };
            let (Some(redis::Value::BulkString(next)), Some(redis::Value::Array(entries))) =
                (parts.first(), parts.get(1))
            else {
                break;
            };

            total_claimed += entries.len();
            cursor = String::from_utf8_lossy(next).to_string();
            if cursor == "0-0" || entries.is_empty() {
                break;
            }
        }

        if total_claimed > 0 {
            info!(
                count = total_claimed,
                consumer_id = %self.config.consumer_id,
                "Claimed abandoned entries"
            );
        }

        Ok(())
    }

    /// Re-read this consumer's pending entries (id `0` instead of `>`).
    async fn process_backlog(&self) -> NotificationResult<()> {
        let reply = self.read_stream("0").await?;

        for stream_key in reply.keys {
            if !stream_key.ids.is_empty() {
                info!(count = stream_key.ids.len(), "Re-processing pending entries");
                for entry in stream_key.ids {
                    self.process_entry(entry).await;
                }
            }
        }

        Ok(())
    }

    /// Fetch and process new entries.
    async fn poll_new_entries(&self) -> NotificationResult<()> {
        let reply = self.read_stream(">").await?;

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                self.process_entry(entry).await;
            }
        }

        Ok(())
    }

    async fn read_stream(&self, id: &str) -> NotificationResult<StreamReadReply> {
        let mut conn = (*self.redis).clone();

        let opts = StreamReadOptions::default()
            .group(&self.config.consumer_group, &self.config.consumer_id)
            .count(self.config.batch_size);

        conn.xread_options(&[&self.config.stream_name], &[id], &opts)
            .await
            .map_err(|e| NotificationError::Queue(e.to_string()))
    }

    /// Handle one stream entry end to end, including the ack decision.
    async fn process_entry(&self, entry: redis::streams::StreamId) {
        let entry_id = entry.id.clone();

        let raw = match Self::event_payload(&entry.map) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(entry_id = %entry_id, error = %e, "Dropping malformed stream entry");
                self.ack(&entry_id).await;
                return;
            }
        };

        match self.handler.handle(&raw).await {
            Ok(()) => {
                debug!(entry_id = %entry_id, "Event handled");
                self.ack(&entry_id).await;
            }
            Err(err) if err.is_rejection() => {
                // No dead-letter stream: a rejected event is gone once this
                // line is logged.
                warn!(entry_id = %entry_id, error = %err, "Rejecting event");
                self.ack(&entry_id).await;
            }
            Err(err) => {
                // Left unacked on purpose: the entry stays pending and is
                // redelivered to this consumer on restart.
                error!(entry_id = %entry_id, error = %err, "Failed to handle event");
            }
        }
    }

    /// Pull the raw event JSON out of a stream entry's field map.
    fn event_payload(map: &HashMap<String, redis::Value>) -> NotificationResult<String> {
        let value = map.get(EVENT_FIELD).ok_or_else(|| {
            NotificationError::Queue(format!("stream entry missing '{EVENT_FIELD}' field"))
        })?;

        match value {
            redis::Value::BulkString(bytes) => Ok(String::from_utf8_lossy(bytes).to_string()),
            redis::Value::SimpleString(s) => Ok(s.clone()),
            _ => Err(NotificationError::Queue(format!(
                "invalid '{EVENT_FIELD}' field type"
            ))),
        }
    }

    async fn ack(&self, entry_id: &str) {
        let mut conn = (*self.redis).clone();

        let result: Result<(), redis::RedisError> = conn
            .xack(
                &self.config.stream_name,
                &self.config.consumer_group,
                &[entry_id],
            )
            .await;

        if let Err(e) = result {
            error!(entry_id = %entry_id, error = %e, "Failed to ack entry");
        }
    }
}
