//! Data models for the notifications domain.
//!
//! The `Notification` aggregate owns every state transition; nothing outside
//! this module mutates status, retry counters or the version directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{NotificationError, NotificationResult};

/// Retry budget applied when the caller does not supply one.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Delivery channel of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Email,
    Sms,
    Push,
    InApp,
}

/// Delivery state of a notification.
///
/// `Pending → Sent → Delivered` is the happy path. `Failed` loops back
/// through `Sent` on a successful retry and becomes terminal once the retry
/// budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    Delivered,
}

/// Who a notification goes to.
///
/// Which contact field matters depends on the channel; each provider checks
/// the one it needs at send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub device_id: Option<String>,
}

impl Recipient {
    pub fn new(
        id: impl Into<String>,
        email: Option<String>,
        phone: Option<String>,
        device_id: Option<String>,
    ) -> NotificationResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(NotificationError::Validation(
                "recipient id cannot be empty".to_string(),
            ));
        }

        let recipient = Self {
            id,
            email,
            phone,
            device_id,
        };
        if !recipient.has_contact_channel() {
            return Err(NotificationError::Validation(
                "recipient needs at least one contact channel".to_string(),
            ));
        }

        Ok(recipient)
    }

    fn has_contact_channel(&self) -> bool {
        let filled = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.is_empty());
        filled(&self.email) || filled(&self.phone) || filled(&self.device_id)
    }
}

/// What a notification says.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub title: String,
    pub body: Option<String>,
    pub data: Option<serde_json::Value>,
    pub html: Option<String>,
    pub template: Option<String>,
}

impl Content {
    pub fn new(
        title: impl Into<String>,
        body: Option<String>,
        data: Option<serde_json::Value>,
        html: Option<String>,
        template: Option<String>,
    ) -> NotificationResult<Self> {
        let title = title.into();
        if title.is_empty() {
            return Err(NotificationError::Validation(
                "content title cannot be empty".to_string(),
            ));
        }
        if body.as_deref().is_none_or(str::is_empty) && data.is_none() {
            return Err(NotificationError::Validation(
                "content needs a body or structured data".to_string(),
            ));
        }

        Ok(Self {
            title,
            body,
            data,
            html,
            template,
        })
    }
}

/// The notification aggregate root.
///
/// Identity is the id of the event that requested it, assigned upstream and
/// never regenerated here, so re-processing a redelivered event lands on the
/// same row. `version` is the optimistic-concurrency token: the repository
/// only commits a mutation when the stored version is exactly one behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub recipient: Recipient,
    pub content: Content,
    pub status: NotificationStatus,
    pub provider_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub version: i32,
}

impl Notification {
    /// Create a new notification in `Pending` state, version 1.
    ///
    /// A negative `max_retries` falls back to [`DEFAULT_MAX_RETRIES`].
    pub fn new(
        id: impl Into<String>,
        kind: NotificationKind,
        recipient: Recipient,
        content: Content,
        max_retries: i32,
    ) -> NotificationResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(NotificationError::Validation(
                "notification id cannot be empty".to_string(),
            ));
        }

        let max_retries = if max_retries < 0 {
            DEFAULT_MAX_RETRIES
        } else {
            max_retries
        };

        Ok(Self {
            id,
            kind,
            recipient,
            content,
            status: NotificationStatus::Pending,
            provider_response: None,
            created_at: Utc::now(),
            sent_at: None,
            retry_count: 0,
            max_retries,
            version: 1,
        })
    }

    /// The single send-eligibility gate: `Pending`, or `Failed` with retry
    /// budget left. Every send path must pass through this check.
    pub fn can_be_sent(&self) -> bool {
        self.status == NotificationStatus::Pending
            || (self.status == NotificationStatus::Failed && self.retry_count < self.max_retries)
    }

    /// Record a successful delivery attempt.
    ///
    /// `sent_at` is stamped here and nowhere else, so it is set exactly once
    /// per notification lifetime.
    pub fn mark_as_sent(&mut self, provider_response: impl Into<String>) -> NotificationResult<()> {
        if matches!(
            self.status,
            NotificationStatus::Sent | NotificationStatus::Delivered
        ) {
            return Err(NotificationError::InvalidTransition(format!(
                "notification {} already sent or delivered",
                self.id
            )));
        }

        self.status = NotificationStatus::Sent;
        self.sent_at = Some(Utc::now());
        self.provider_response = Some(provider_response.into());
        self.version += 1;

        Ok(())
    }

    /// Record a failed delivery attempt. Never fails: recording a failure
    /// must not itself be able to fail.
    pub fn mark_as_failed(&mut self, provider_response: impl Into<String>) {
        self.status = NotificationStatus::Failed;
        self.retry_count += 1;
        self.provider_response = Some(provider_response.into());
        self.version += 1;
    }

    /// Record a delivery confirmation from the channel.
    pub fn mark_as_delivered(&mut self) -> NotificationResult<()> {
        if self.status != NotificationStatus::Sent {
            return Err(NotificationError::InvalidTransition(format!(
                "only sent notifications can be marked as delivered, {} is {}",
                self.id, self.status
            )));
        }

        self.status = NotificationStatus::Delivered;
        self.version += 1;

        Ok(())
    }
}
