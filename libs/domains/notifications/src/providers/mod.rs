//! Delivery providers, one per channel.
//!
//! Providers are polymorphic over [`NotificationProvider`] and registered as
//! an ordered list on the service; the first provider whose `supports`
//! returns true for a notification's kind handles the send. Order is part of
//! the contract, not an accident.

mod http_email;
mod push;
mod sms;
mod smtp;

pub use http_email::{HttpEmailConfig, HttpEmailProvider};
pub use push::PushProvider;
pub use sms::SmsProvider;
pub use smtp::{SmtpConfig, SmtpEmailProvider};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::NotificationResult;
use crate::models::{Notification, NotificationKind};

/// A channel-specific delivery strategy.
///
/// `send` returns the provider's response string for the audit trail. Each
/// implementation validates that the recipient carries the contact field its
/// channel needs and fails explicitly instead of silently doing nothing.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    async fn send(&self, notification: &Notification) -> NotificationResult<String>;

    fn supports(&self, kind: NotificationKind) -> bool;

    /// Provider name for logging and the audit trail.
    fn name(&self) -> &'static str;
}

/// Assemble the default provider registry from the environment.
///
/// Email goes through the HTTP relay when `EMAIL_RELAY_URL` is set and plain
/// SMTP otherwise, followed by the SMS and push stubs. The vec order is the
/// dispatch order.
pub fn registry_from_env() -> NotificationResult<Vec<Arc<dyn NotificationProvider>>> {
    let email: Arc<dyn NotificationProvider> = if std::env::var("EMAIL_RELAY_URL").is_ok() {
        Arc::new(HttpEmailProvider::from_env()?)
    } else {
        Arc::new(SmtpEmailProvider::from_env()?)
    };

    Ok(vec![
        email,
        Arc::new(SmsProvider::new()),
        Arc::new(PushProvider::new()),
    ])
}
