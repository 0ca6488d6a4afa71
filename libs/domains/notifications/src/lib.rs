//! Notifications Domain
//!
//! Durable notification processing behind an event bus: consume
//! `notification.requested` events, persist an auditable delivery record,
//! dispatch to a channel provider, and retry failures with backoff.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   Event Stream   │  ← notifications:requested (consumer group)
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐     ┌──────────────────┐
//! │  EventConsumer   │────▶│ ContactInfoSource │
//! └────────┬─────────┘     └──────────────────┘
//!          │
//! ┌────────▼─────────┐     ┌──────────────────┐
//! │ NotificationSvc  │◀────│  RetryScheduler  │
//! └───┬──────────┬───┘     └──────────────────┘
//!     │          │
//! ┌───▼────┐ ┌───▼──────────┐
//! │ SQLite │ │  Providers   │  ← smtp / http relay / sms / push
//! └────────┘ └──────────────┘
//! ```
//!
//! Creation is durable before the first delivery attempt runs, every status
//! change goes through a version-guarded write, and the event id doubles as
//! the notification id so redelivered events collapse onto the same record.

pub mod consumer;
pub mod contacts;
pub mod entity;
pub mod error;
pub mod events;
pub mod models;
pub mod providers;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod sqlite;

// Re-export commonly used types
pub use consumer::{ConsumerConfig, EventConsumer, EventHandler};
pub use contacts::{ContactInfo, ContactInfoSource, HttpContactSource};
pub use error::{NotificationError, NotificationResult};
pub use events::{EventEnvelope, NotificationRequested};
pub use models::{
    Content, Notification, NotificationKind, NotificationStatus, Recipient, DEFAULT_MAX_RETRIES,
};
pub use providers::{
    HttpEmailProvider, NotificationProvider, PushProvider, SmsProvider, SmtpEmailProvider,
};
pub use repository::NotificationRepository;
pub use scheduler::{RetryScheduler, SchedulerConfig};
pub use service::NotificationService;
pub use sqlite::SqliteNotificationRepository;
