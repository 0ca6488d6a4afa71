//! Contact-info lookup port.
//!
//! Inbound events only carry a user id; the user service owns the actual
//! contact data. The worker resolves it per event through this port before
//! constructing the recipient.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{NotificationError, NotificationResult};

/// Contact data for a single user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: String,
    pub phone: Option<String>,
    pub device_id: Option<String>,
}

/// Source of recipient contact data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContactInfoSource: Send + Sync {
    /// Resolve contact info for a user. Fails when the user is unknown or
    /// the backing service is unreachable.
    async fn contact_info(&self, user_id: &str) -> NotificationResult<ContactInfo>;
}

/// Contact lookup against the user service's HTTP API.
pub struct HttpContactSource {
    base_url: String,
    api_key: String,
    client: Client,
}

impl HttpContactSource {
    pub fn new(base_url: String, api_key: String) -> NotificationResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// Read configuration from `CONTACT_SERVICE_URL` / `CONTACT_SERVICE_API_KEY`.
    pub fn from_env() -> NotificationResult<Self> {
        let base_url = std::env::var("CONTACT_SERVICE_URL")
            .map_err(|_| NotificationError::Config("CONTACT_SERVICE_URL not set".to_string()))?;
        let api_key = std::env::var("CONTACT_SERVICE_API_KEY").unwrap_or_default();

        Self::new(base_url, api_key)
    }
}

#[async_trait]
impl ContactInfoSource for HttpContactSource {
    async fn contact_info(&self, user_id: &str) -> NotificationResult<ContactInfo> {
        let url = format!("{}/users/{}/contact", self.base_url, user_id);

        debug!(user_id = %user_id, "Resolving contact info");

        let response = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| NotificationError::ContactLookup(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(NotificationError::ContactLookup(format!(
                "unknown user {user_id}"
            ))),
            status if !status.is_success() => Err(NotificationError::ContactLookup(format!(
                "contact service returned status {status}"
            ))),
            _ => response
                .json::<ContactInfo>()
                .await
                .map_err(|e| NotificationError::ContactLookup(e.to_string())),
        }
    }
}
