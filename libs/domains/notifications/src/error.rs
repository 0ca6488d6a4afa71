//! Error types for the notifications domain.

use thiserror::Error;

use crate::models::NotificationKind;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notifications domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Malformed input: event payloads, value objects, aggregate construction.
    #[error("validation error: {0}")]
    Validation(String),

    /// Event envelope carries a type or version this service does not handle.
    #[error("unsupported event: {0}")]
    UnsupportedEvent(String),

    /// Referenced notification id does not exist.
    #[error("notification not found: {0}")]
    NotFound(String),

    /// The stored version moved underneath a conditional write. The caller
    /// must reload and re-derive its intent; re-applying the stale write
    /// would overwrite a concurrent mutation.
    #[error("version conflict for notification {0}")]
    Conflict(String),

    /// Send attempted on a notification the state machine refuses to send.
    #[error("notification {0} cannot be sent in its current state")]
    NotEligible(String),

    /// Illegal state-machine transition.
    #[error("{0}")]
    InvalidTransition(String),

    /// No registered provider claims this notification kind.
    #[error("no provider supports notification kind {0}")]
    NoProvider(NotificationKind),

    /// The delivery channel rejected the send or was unreachable.
    #[error("provider error: {0}")]
    Provider(String),

    /// The contact-info collaborator failed or does not know the user.
    #[error("contact lookup failed: {0}")]
    ContactLookup(String),

    /// Event stream error.
    #[error("queue error: {0}")]
    Queue(String),

    /// Storage error.
    #[error("database error: {0}")]
    Database(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON encoding/decoding error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NotificationError {
    /// True for errors that redelivering the same message cannot fix.
    ///
    /// The consumer acks and drops such messages; everything else is left
    /// pending so the event log redelivers it.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            NotificationError::Validation(_) | NotificationError::UnsupportedEvent(_)
        )
    }
}

impl From<sea_orm::DbErr> for NotificationError {
    fn from(err: sea_orm::DbErr) -> Self {
        NotificationError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for NotificationError {
    fn from(err: redis::RedisError) -> Self {
        NotificationError::Queue(err.to_string())
    }
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        NotificationError::Provider(err.to_string())
    }
}
