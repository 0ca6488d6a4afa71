//! SMTP email provider built on lettre.
//!
//! Message framing (MIME, multipart) is lettre's job; this provider only
//! decides which of the notification's body variants to send.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, error, info};

use super::NotificationProvider;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{Notification, NotificationKind};

/// SMTP configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Sender address.
    pub from_email: String,
    /// Sender display name.
    pub from_name: String,
    /// SMTP username (optional for dev relays like Mailpit).
    pub username: Option<String>,
    /// SMTP password (optional for dev relays like Mailpit).
    pub password: Option<String>,
    /// Whether to use a TLS relay (off for local dev servers).
    pub use_tls: bool,
}

impl SmtpConfig {
    pub fn new(host: String, port: u16, from_email: String, from_name: String) -> Self {
        Self {
            host,
            port,
            from_email,
            from_name,
            username: None,
            password: None,
            use_tls: false,
        }
    }

    /// Read configuration from `SMTP_*` environment variables, defaulting to
    /// a local development relay on port 1025.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("SMTP_PORT")
                .unwrap_or_else(|_| "1025".to_string())
                .parse()
                .unwrap_or(1025),
            from_email: std::env::var("SMTP_FROM_EMAIL")
                .unwrap_or_else(|_| "noreply@localhost".to_string()),
            from_name: std::env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Courier".to_string()),
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            use_tls: std::env::var("SMTP_USE_TLS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }
}

/// Email delivery over SMTP.
pub struct SmtpEmailProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: SmtpConfig,
}

impl SmtpEmailProvider {
    pub fn new(config: SmtpConfig) -> NotificationResult<Self> {
        let transport = Self::build_transport(&config)?;
        Ok(Self { transport, config })
    }

    pub fn from_env() -> NotificationResult<Self> {
        Self::new(SmtpConfig::from_env())
    }

    fn build_transport(
        config: &SmtpConfig,
    ) -> NotificationResult<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| {
                    NotificationError::Provider(format!("failed to create SMTP relay: {e}"))
                })?
                .port(config.port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port)
        };

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }

    fn build_message(&self, notification: &Notification, to_email: &str) -> NotificationResult<Message> {
        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| NotificationError::Provider(format!("invalid from address: {e}")))?;

        let to: Mailbox = to_email
            .parse()
            .map_err(|e| NotificationError::Provider(format!("invalid recipient address: {e}")))?;

        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(&notification.content.title);

        let body = notification.content.body.as_deref().unwrap_or_default();
        let html = notification.content.html.as_deref().unwrap_or_default();

        let message = if !html.is_empty() {
            builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
        } else if !body.is_empty() {
            builder.singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(body.to_string()),
            )
        } else {
            return Err(NotificationError::Provider(
                "notification has neither body nor html to send".to_string(),
            ));
        };

        message.map_err(|e| NotificationError::Provider(format!("failed to build email: {e}")))
    }
}

#[async_trait]
impl NotificationProvider for SmtpEmailProvider {
    async fn send(&self, notification: &Notification) -> NotificationResult<String> {
        let to_email = notification
            .recipient
            .email
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                NotificationError::Provider("recipient email missing for email send".to_string())
            })?;

        debug!(
            id = %notification.id,
            to = %to_email,
            subject = %notification.content.title,
            host = %self.config.host,
            port = self.config.port,
            "Sending email via SMTP"
        );

        let message = self.build_message(notification, to_email)?;

        let response = self.transport.send(message).await.map_err(|e| {
            error!(id = %notification.id, to = %to_email, error = %e, "SMTP send failed");
            NotificationError::Provider(format!("smtp send failed: {e}"))
        })?;

        info!(id = %notification.id, to = %to_email, "Email sent via SMTP");

        let detail = response
            .message()
            .next()
            .map(|line| format!(" ({line})"))
            .unwrap_or_default();
        Ok(format!("email sent to {to_email}{detail}"))
    }

    fn supports(&self, kind: NotificationKind) -> bool {
        kind == NotificationKind::Email
    }

    fn name(&self) -> &'static str {
        "smtp-email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Content, Recipient};

    fn provider() -> SmtpEmailProvider {
        SmtpEmailProvider::new(SmtpConfig::new(
            "localhost".to_string(),
            1025,
            "noreply@example.com".to_string(),
            "Courier".to_string(),
        ))
        .unwrap()
    }

    fn email_notification(
        email: Option<&str>,
        body: Option<&str>,
        html: Option<&str>,
    ) -> Notification {
        let recipient = Recipient {
            id: "user-1".to_string(),
            email: email.map(String::from),
            phone: Some("+15550100".to_string()),
            device_id: None,
        };
        let content = Content {
            title: "Subject".to_string(),
            body: body.map(String::from),
            data: None,
            html: html.map(String::from),
            template: None,
        };
        Notification::new("n-1", NotificationKind::Email, recipient, content, 3).unwrap()
    }

    #[test]
    fn supports_only_email() {
        let p = provider();
        assert!(p.supports(NotificationKind::Email));
        assert!(!p.supports(NotificationKind::Sms));
        assert!(!p.supports(NotificationKind::Push));
        assert!(!p.supports(NotificationKind::InApp));
    }

    #[tokio::test]
    async fn send_requires_recipient_email() {
        let p = provider();
        let n = email_notification(None, Some("hello"), None);
        let err = p.send(&n).await.unwrap_err();
        assert!(matches!(err, NotificationError::Provider(_)));
        assert!(err.to_string().contains("email missing"));
    }

    #[test]
    fn message_requires_some_body() {
        let p = provider();
        let n = email_notification(Some("user@example.com"), None, None);
        assert!(p.build_message(&n, "user@example.com").is_err());
    }

    #[test]
    fn message_builds_with_plain_body() {
        let p = provider();
        let n = email_notification(Some("user@example.com"), Some("hello"), None);
        assert!(p.build_message(&n, "user@example.com").is_ok());
    }

    #[test]
    fn message_builds_with_html_and_body() {
        let p = provider();
        let n = email_notification(
            Some("user@example.com"),
            Some("hello"),
            Some("<p>hello</p>"),
        );
        assert!(p.build_message(&n, "user@example.com").is_ok());
    }

    #[test]
    fn config_builder_methods() {
        let config = SmtpConfig::new(
            "mail.example.com".to_string(),
            587,
            "x@example.com".to_string(),
            "X".to_string(),
        )
        .with_tls(true)
        .with_credentials("user".to_string(), "pass".to_string());

        assert!(config.use_tls);
        assert_eq!(config.username.as_deref(), Some("user"));
    }
}
