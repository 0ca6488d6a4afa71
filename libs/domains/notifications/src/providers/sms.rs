//! SMS provider stub.
//!
//! Validates the fields an SMS gateway would need, then fails explicitly:
//! there is no real gateway behind it yet. The contract matches the real
//! providers so one can be dropped in without touching the registry.

use async_trait::async_trait;
use tracing::info;

use super::NotificationProvider;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{Notification, NotificationKind};

#[derive(Debug, Default)]
pub struct SmsProvider;

impl SmsProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationProvider for SmsProvider {
    async fn send(&self, notification: &Notification) -> NotificationResult<String> {
        let phone = notification
            .recipient
            .phone
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                NotificationError::Provider("recipient phone missing for sms send".to_string())
            })?;

        if notification.content.body.as_deref().is_none_or(str::is_empty) {
            return Err(NotificationError::Provider(
                "sms needs a text body".to_string(),
            ));
        }

        info!(id = %notification.id, phone = %phone, "SMS dispatch requested");

        // TODO: wire up the actual gateway client once one is picked.
        Err(NotificationError::Provider(
            "sms gateway integration not implemented".to_string(),
        ))
    }

    fn supports(&self, kind: NotificationKind) -> bool {
        kind == NotificationKind::Sms
    }

    fn name(&self) -> &'static str {
        "sample-sms"
    }
}
