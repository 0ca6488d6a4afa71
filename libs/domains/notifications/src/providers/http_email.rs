//! HTTP relay email provider.
//!
//! Posts the JSON-serialized notification to a remote relay that does the
//! actual SMTP work. Any non-2xx response counts as a failed delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info};

use super::NotificationProvider;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{Notification, NotificationKind};

/// HTTP email relay configuration.
#[derive(Debug, Clone)]
pub struct HttpEmailConfig {
    /// Relay endpoint URL.
    pub url: String,
    /// API key sent in the `X-API-Key` header.
    pub api_key: String,
}

impl HttpEmailConfig {
    pub fn new(url: String, api_key: String) -> Self {
        Self { url, api_key }
    }

    /// Read configuration from `EMAIL_RELAY_URL` / `EMAIL_RELAY_API_KEY`.
    pub fn from_env() -> NotificationResult<Self> {
        let url = std::env::var("EMAIL_RELAY_URL")
            .map_err(|_| NotificationError::Config("EMAIL_RELAY_URL not set".to_string()))?;
        let api_key = std::env::var("EMAIL_RELAY_API_KEY").unwrap_or_default();

        Ok(Self::new(url, api_key))
    }
}

/// Email delivery through a remote HTTP relay.
pub struct HttpEmailProvider {
    config: HttpEmailConfig,
    client: Client,
}

impl HttpEmailProvider {
    pub fn new(config: HttpEmailConfig) -> NotificationResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn from_env() -> NotificationResult<Self> {
        Self::new(HttpEmailConfig::from_env()?)
    }
}

#[async_trait]
impl NotificationProvider for HttpEmailProvider {
    async fn send(&self, notification: &Notification) -> NotificationResult<String> {
        if notification
            .recipient
            .email
            .as_deref()
            .is_none_or(str::is_empty)
        {
            return Err(NotificationError::Provider(
                "recipient email missing for email send".to_string(),
            ));
        }

        debug!(
            id = %notification.id,
            url = %self.config.url,
            "Posting notification to email relay"
        );

        let response = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .header("X-API-Key", &self.config.api_key)
            .json(notification)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                id = %notification.id,
                status = %status,
                body = %body,
                "Email relay rejected notification"
            );
            return Err(NotificationError::Provider(format!(
                "email relay returned status {status}"
            )));
        }

        let body: serde_json::Value = response.json().await.unwrap_or_default();

        info!(id = %notification.id, "Email accepted by relay");

        Ok(format!("email relayed: {body}"))
    }

    fn supports(&self, kind: NotificationKind) -> bool {
        kind == NotificationKind::Email
    }

    fn name(&self) -> &'static str {
        "http-email"
    }
}
