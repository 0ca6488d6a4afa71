//! Inbound event envelope and notification-request payload.
//!
//! Everything here is validated before any side effect: a message that fails
//! these checks is rejected without touching storage.

use serde::{Deserialize, Serialize};

use crate::error::{NotificationError, NotificationResult};

/// The only event type this service consumes.
pub const NOTIFICATION_REQUESTED: &str = "notification.requested";

/// Envelope schema version this service understands.
pub const SUPPORTED_EVENT_VERSION: i32 = 1;

/// Generic event envelope as published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub version: i32,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Check that this envelope is something we can process at all.
    pub fn validate(&self) -> NotificationResult<()> {
        if self.event_type != NOTIFICATION_REQUESTED {
            return Err(NotificationError::UnsupportedEvent(format!(
                "unsupported event type: {}",
                self.event_type
            )));
        }
        if self.version != SUPPORTED_EVENT_VERSION {
            return Err(NotificationError::UnsupportedEvent(format!(
                "unsupported event version: {}, only version {} is supported",
                self.version, SUPPORTED_EVENT_VERSION
            )));
        }
        if self.event_id.is_empty() {
            return Err(NotificationError::Validation(
                "event_id is required".to_string(),
            ));
        }

        Ok(())
    }

    /// Decode and validate the notification-request payload.
    pub fn notification_request(&self) -> NotificationResult<NotificationRequested> {
        let payload: NotificationRequested = serde_json::from_value(self.payload.clone())
            .map_err(|e| {
                NotificationError::Validation(format!("invalid notification payload: {e}"))
            })?;
        payload.validate()?;

        Ok(payload)
    }
}

/// Payload of a `notification.requested` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequested {
    /// Originating domain event, e.g. "ticket.created".
    #[serde(rename = "type")]
    pub trigger: String,
    /// Requested delivery channel (EMAIL/SMS/PUSH/IN_APP).
    pub channel: String,
    /// The user being notified.
    pub user_id: String,
    pub subject: String,
    /// Plain text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Pre-rendered HTML body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Optional template id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Structured metadata payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl NotificationRequested {
    pub fn validate(&self) -> NotificationResult<()> {
        if self.subject.is_empty() {
            return Err(NotificationError::Validation(
                "subject is required".to_string(),
            ));
        }
        if self.message.as_deref().is_none_or(str::is_empty) && self.data.is_none() {
            return Err(NotificationError::Validation(
                "message and data cannot both be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_type: &str, version: i32, payload: serde_json::Value) -> EventEnvelope {
        EventEnvelope {
            event_id: "evt-1".to_string(),
            aggregate_id: "agg-1".to_string(),
            event_type: event_type.to_string(),
            version,
            payload,
        }
    }

    fn valid_payload() -> serde_json::Value {
        json!({
            "type": "ticket.created",
            "channel": "EMAIL",
            "user_id": "user-1",
            "subject": "Your ticket",
            "message": "See you there",
        })
    }

    #[test]
    fn valid_envelope_passes() {
        let env = envelope(NOTIFICATION_REQUESTED, 1, valid_payload());
        env.validate().unwrap();
        let payload = env.notification_request().unwrap();
        assert_eq!(payload.channel, "EMAIL");
        assert_eq!(payload.user_id, "user-1");
    }

    #[test]
    fn wrong_event_type_is_unsupported() {
        let env = envelope("user.created", 1, valid_payload());
        let err = env.validate().unwrap_err();
        assert!(matches!(err, NotificationError::UnsupportedEvent(_)));
        assert!(err.is_rejection());
    }

    #[test]
    fn wrong_version_is_unsupported() {
        let env = envelope(NOTIFICATION_REQUESTED, 2, valid_payload());
        let err = env.validate().unwrap_err();
        assert!(matches!(err, NotificationError::UnsupportedEvent(_)));
    }

    #[test]
    fn missing_event_id_is_invalid() {
        let mut env = envelope(NOTIFICATION_REQUESTED, 1, valid_payload());
        env.event_id = String::new();
        assert!(matches!(
            env.validate().unwrap_err(),
            NotificationError::Validation(_)
        ));
    }

    #[test]
    fn payload_missing_subject_is_rejected() {
        let env = envelope(
            NOTIFICATION_REQUESTED,
            1,
            json!({
                "type": "ticket.created",
                "channel": "EMAIL",
                "user_id": "user-1",
                "subject": "",
                "message": "hello",
            }),
        );
        let err = env.notification_request().unwrap_err();
        assert!(matches!(err, NotificationError::Validation(_)));
    }

    #[test]
    fn payload_missing_message_and_data_is_rejected() {
        let env = envelope(
            NOTIFICATION_REQUESTED,
            1,
            json!({
                "type": "ticket.created",
                "channel": "EMAIL",
                "user_id": "user-1",
                "subject": "Your ticket",
            }),
        );
        let err = env.notification_request().unwrap_err();
        assert!(matches!(err, NotificationError::Validation(_)));
        assert!(err.is_rejection());
    }

    #[test]
    fn payload_with_only_data_is_accepted() {
        let env = envelope(
            NOTIFICATION_REQUESTED,
            1,
            json!({
                "type": "ticket.created",
                "channel": "PUSH",
                "user_id": "user-1",
                "subject": "Your ticket",
                "data": {"ticket_id": "t-42"},
            }),
        );
        let payload = env.notification_request().unwrap();
        assert!(payload.message.is_none());
        assert!(payload.data.is_some());
    }

    #[test]
    fn malformed_payload_shape_is_rejected() {
        let env = envelope(NOTIFICATION_REQUESTED, 1, json!("not an object"));
        assert!(matches!(
            env.notification_request().unwrap_err(),
            NotificationError::Validation(_)
        ));
    }
}
