//! Push provider stub, same shape as the SMS one.

use async_trait::async_trait;
use tracing::info;

use super::NotificationProvider;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{Notification, NotificationKind};

#[derive(Debug, Default)]
pub struct PushProvider;

impl PushProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationProvider for PushProvider {
    async fn send(&self, notification: &Notification) -> NotificationResult<String> {
        let device_id = notification
            .recipient
            .device_id
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                NotificationError::Provider("recipient device id missing for push send".to_string())
            })?;

        if notification.content.body.as_deref().is_none_or(str::is_empty) {
            return Err(NotificationError::Provider(
                "push needs a text body".to_string(),
            ));
        }

        info!(id = %notification.id, device_id = %device_id, "Push dispatch requested");

        Err(NotificationError::Provider(
            "push gateway integration not implemented".to_string(),
        ))
    }

    fn supports(&self, kind: NotificationKind) -> bool {
        kind == NotificationKind::Push
    }

    fn name(&self) -> &'static str {
        "sample-push"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Content, Recipient};

    #[tokio::test]
    async fn requires_device_id() {
        let recipient = Recipient {
            id: "user-1".to_string(),
            email: Some("user@example.com".to_string()),
            phone: None,
            device_id: None,
        };
        let content = Content::new("Ping", Some("hello".to_string()), None, None, None).unwrap();
        let n = Notification::new("n-1", NotificationKind::Push, recipient, content, 3).unwrap();

        let err = PushProvider::new().send(&n).await.unwrap_err();
        assert!(err.to_string().contains("device id missing"));
    }

    #[test]
    fn supports_only_push() {
        let p = PushProvider::new();
        assert!(p.supports(NotificationKind::Push));
        assert!(!p.supports(NotificationKind::InApp));
    }
}
