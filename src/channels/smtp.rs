//! SMTP email transport via lettre.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::channels::EmailTransport;
use crate::error::ChannelError;

/// SMTP configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMTP_HOST` is not set (transport disabled).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok()?;

        let port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = std::env::var("SMTP_PASSWORD").unwrap_or_default();
        let from_address = std::env::var("SMTP_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        })
    }
}

/// Outbound email sender over SMTP.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

/// Blocking SMTP delivery — run in spawn_blocking.
fn send_blocking(config: &SmtpConfig, to: &str, subject: &str, body: &str) -> Result<(), ChannelError> {
    let creds = Credentials::new(config.username.clone(), config.password.clone());

    let transport = SmtpTransport::relay(&config.host)
        .map_err(|e| ChannelError::SendFailed {
            channel: "email".into(),
            reason: format!("SMTP relay error: {e}"),
        })?
        .port(config.port)
        .credentials(creds)
        .build();

    let email = Message::builder()
        .from(config.from_address.parse().map_err(|e| {
            ChannelError::SendFailed {
                channel: "email".into(),
                reason: format!("Invalid from address: {e}"),
            }
        })?)
        .to(to.parse().map_err(|e| ChannelError::SendFailed {
            channel: "email".into(),
            reason: format!("Invalid to address: {e}"),
        })?)
        .subject(subject)
        .body(body.to_string())
        .map_err(|e| ChannelError::SendFailed {
            channel: "email".into(),
            reason: format!("Failed to build email: {e}"),
        })?;

    transport.send(&email).map_err(|e| ChannelError::SendFailed {
        channel: "email".into(),
        reason: format!("SMTP send failed: {e}"),
    })?;

    tracing::info!("Email sent to {to}");
    Ok(())
}

#[async_trait]
impl EmailTransport for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ChannelError> {
        let config = self.config.clone();
        let to = to.to_string();
        let subject = subject.to_string();
        let body = body.to_string();
        tokio::task::spawn_blocking(move || send_blocking(&config, &to, &subject, &body))
            .await
            .map_err(|e| ChannelError::SendFailed {
                channel: "email".into(),
                reason: format!("SMTP task join error: {e}"),
            })?
    }
}
